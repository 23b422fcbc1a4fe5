use std::sync::Arc;

use async_trait::async_trait;
use common_types::{
    BackendEstimate, CombinationMethod, Estimate, EstimateOrigin, PricePrediction, PriceQuery,
};
use tracing::{error, info, instrument, warn};

use crate::metrics_utils::{timing_guard, PREDICTIONS, PREDICTION_TIME};
use crate::truncate_chars;

pub const GENERATIVE_WEIGHT: f64 = 0.7;
pub const CONTEXTUAL_WEIGHT: f64 = 0.3;

const LOGGED_DESCRIPTION_CHARS: usize = 60;

/// A single price backend. Implementations handle their own failures: whatever goes
/// wrong inside, the caller gets an `Estimate`, never an error.
#[async_trait]
pub trait PriceEstimator: Send + Sync {
    fn origin(&self) -> EstimateOrigin;

    async fn estimate(&self, query: &PriceQuery) -> Estimate;
}

/// Runs the generative and contextual estimators side by side and folds their
/// answers into one prediction.
#[derive(Clone)]
pub struct EnsemblePredictor {
    generative: Arc<dyn PriceEstimator>,
    contextual: Arc<dyn PriceEstimator>,
}

impl EnsemblePredictor {
    pub fn new(generative: Arc<dyn PriceEstimator>, contextual: Arc<dyn PriceEstimator>) -> Self {
        Self {
            generative,
            contextual,
        }
    }

    /// Never fails. When neither backend produced a price the prediction's
    /// `final_price` is zero.
    #[instrument(skip_all)]
    pub async fn predict(&self, query: &PriceQuery) -> PricePrediction {
        info!(
            "pricing: {:?}",
            truncate_chars(query.as_str(), LOGGED_DESCRIPTION_CHARS)
        );
        let timer = timing_guard::<&str, &str>(PREDICTION_TIME, &[]);

        // No deadline here, each estimator enforces its own.
        let (generative, contextual) = tokio::join!(
            self.generative.estimate(query),
            self.contextual.estimate(query)
        );
        let generative = BackendEstimate::generative(generative);
        let contextual = BackendEstimate::contextual(contextual);

        let (final_price, method) = combine(generative.value, contextual.value);
        log_combination(&generative, &contextual, final_price, method);

        let prediction = PricePrediction::new(generative.value, contextual.value, final_price);

        info!(
            "pricing complete: ${:.2} ({:.2}s)",
            prediction.final_price,
            timer.elapsed_secs()
        );
        metrics::counter!(PREDICTIONS, &[("method", method.as_str())]).increment(1);
        timer.label("method", method.as_str()).fin();

        prediction
    }
}

/// The combination policy, in priority order: a fixed 70/30 weighting when both
/// backends answered, otherwise whichever one did, otherwise zero.
pub fn combine(generative: Estimate, contextual: Estimate) -> (f64, CombinationMethod) {
    match (generative.available(), contextual.available()) {
        (Some(g), Some(c)) => (
            GENERATIVE_WEIGHT * g + CONTEXTUAL_WEIGHT * c,
            CombinationMethod::Weighted,
        ),
        (Some(g), None) => (g, CombinationMethod::GenerativeOnly),
        (None, Some(c)) => (c, CombinationMethod::ContextualOnly),
        (None, None) => (0.0, CombinationMethod::Unavailable),
    }
}

fn log_combination(
    generative: &BackendEstimate,
    contextual: &BackendEstimate,
    final_price: f64,
    method: CombinationMethod,
) {
    match method {
        CombinationMethod::Weighted => {
            for (backend, weight) in [
                (generative, GENERATIVE_WEIGHT),
                (contextual, CONTEXTUAL_WEIGHT),
            ] {
                info!(
                    "  {}: ${:.2} x {:.2} = ${:.2}",
                    backend.origin,
                    backend.value.price(),
                    weight,
                    backend.value.price() * weight
                );
            }
            info!("  final: ${:.2} ({})", final_price, method);
        }
        CombinationMethod::GenerativeOnly | CombinationMethod::ContextualOnly => {
            let (used, missing) = if method == CombinationMethod::GenerativeOnly {
                (generative, contextual)
            } else {
                (contextual, generative)
            };
            warn!(
                "{} estimate unavailable, using {}: ${:.2}",
                missing.origin, used.origin, final_price
            );
        }
        CombinationMethod::Unavailable => error!("both estimators are unavailable"),
    }
}
