use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of every embedding stored in, and queried against, the similarity store.
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// A product description that has passed boundary validation.
///
/// The estimators only ever see a `PriceQuery`, so they never have to deal with
/// empty input themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuery(String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("product description must not be empty")]
pub struct EmptyQueryError;

impl PriceQuery {
    pub fn new(description: impl Into<String>) -> Result<Self, EmptyQueryError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(EmptyQueryError);
        }
        Ok(PriceQuery(description))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A reference product returned by a nearest-neighbour query, closest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SimilarProduct {
    pub title: String,
    pub description: String,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateOrigin {
    Generative,
    Contextual,
}

impl EstimateOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimateOrigin::Generative => "generative",
            EstimateOrigin::Contextual => "contextual",
        }
    }
}

impl Display for EstimateOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of a single estimator.
///
/// Backends report prices as plain numbers where zero (or anything non-positive)
/// means "no answer". Inside the service that convention is lifted into this type
/// so the combination policy branches on availability rather than on a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Estimate {
    Available(f64),
    Unavailable,
}

impl Estimate {
    pub fn from_price(price: f64) -> Self {
        if price.is_finite() && price > 0.0 {
            Estimate::Available(price)
        } else {
            Estimate::Unavailable
        }
    }

    /// The numeric form used on the wire, where `0` stands for unavailable.
    pub fn price(&self) -> f64 {
        match self {
            Estimate::Available(price) => *price,
            Estimate::Unavailable => 0.0,
        }
    }

    pub fn available(&self) -> Option<f64> {
        match self {
            Estimate::Available(price) => Some(*price),
            Estimate::Unavailable => None,
        }
    }
}

impl From<Option<f64>> for Estimate {
    fn from(price: Option<f64>) -> Self {
        price.map(Estimate::from_price).unwrap_or(Estimate::Unavailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendEstimate {
    pub value: Estimate,
    pub origin: EstimateOrigin,
}

impl BackendEstimate {
    pub fn generative(value: Estimate) -> Self {
        Self {
            value,
            origin: EstimateOrigin::Generative,
        }
    }

    pub fn contextual(value: Estimate) -> Self {
        Self {
            value,
            origin: EstimateOrigin::Contextual,
        }
    }
}

/// Which branch of the combination policy produced the final price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationMethod {
    Weighted,
    GenerativeOnly,
    ContextualOnly,
    Unavailable,
}

impl CombinationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CombinationMethod::Weighted => "weighted",
            CombinationMethod::GenerativeOnly => "generative_only",
            CombinationMethod::ContextualOnly => "contextual_only",
            CombinationMethod::Unavailable => "unavailable",
        }
    }
}

impl Display for CombinationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result handed back to callers. A `final_price` of zero means no backend
/// produced a usable estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePrediction {
    pub generative_price: f64,
    pub contextual_price: f64,
    pub final_price: f64,
}

impl PricePrediction {
    pub fn new(generative: Estimate, contextual: Estimate, final_price: f64) -> Self {
        Self {
            generative_price: generative.price(),
            contextual_price: contextual.price(),
            final_price: round_to_cents(final_price),
        }
    }
}

/// Above this magnitude an f64 carries no fractional cents, and scaling by 100 can overflow.
const MAX_CENT_PRECISION: f64 = 4_503_599_627_370_496.0 / 100.0; // 2^52 / 100

/// Round to two fractional digits, halves away from zero.
pub fn round_to_cents(value: f64) -> f64 {
    if !value.is_finite() || value.abs() >= MAX_CENT_PRECISION {
        return value;
    }
    (value * 100.0).round() / 100.0
}
