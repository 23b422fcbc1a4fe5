//! Retrieval-augmented price estimation.
//!
//! The description is embedded, the closest catalogue products are pulled from the
//! similarity store, and a general-purpose chat model is asked for a price with those
//! products (and their known prices) as reference. Each stage that fails ends the
//! pipeline with an unavailable estimate.
use std::sync::Arc;
use std::time;

use async_trait::async_trait;
use common_types::{Estimate, EstimateOrigin, PriceQuery, SimilarProduct, EMBEDDING_DIMENSIONS};
use tracing::{error, info, warn};

use crate::completion::{ChatMessage, CompletionModel};
use crate::embedding::EmbeddingProvider;
use crate::ensemble::PriceEstimator;
use crate::error::ContextualError;
use crate::metrics_utils::{
    timing_guard, COMPLETION_TOKENS, DIMENSION_MISMATCHES, EMPTY_RETRIEVALS, ESTIMATES,
    ESTIMATE_TIME, STAGE_TIME,
};
use crate::similarity::SimilarityStore;
use crate::truncate_chars;

/// How many reference products are retrieved for each query.
pub const NEIGHBOUR_COUNT: usize = 5;

pub const CONTEXTUAL_SYSTEM_PROMPT: &str =
    "You estimate product prices. Respond with ONLY a number (no currency symbol or text).";
pub const SIMPLE_SYSTEM_PROMPT: &str =
    "You estimate product prices based on descriptions. Respond with ONLY a number.";
/// Assistant prefix that nudges the model into continuing with digits.
pub const PRICE_PRIMER: &str = "Price is $";

const LOGGED_TITLE_CHARS: usize = 50;

struct Collaborators {
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn SimilarityStore>,
    model: Arc<dyn CompletionModel>,
}

pub struct ContextualEstimator {
    collaborators: Option<Collaborators>,
    store_timeout: time::Duration,
}

impl ContextualEstimator {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn SimilarityStore>,
        model: Arc<dyn CompletionModel>,
        store_timeout: time::Duration,
    ) -> Self {
        Self {
            collaborators: Some(Collaborators {
                embeddings,
                store,
                model,
            }),
            store_timeout,
        }
    }

    /// An estimator for deployments without model credentials. Every call reports
    /// `ContextualError::MissingCredentials`.
    pub fn without_credentials() -> Self {
        Self {
            collaborators: None,
            store_timeout: time::Duration::ZERO,
        }
    }

    pub async fn run(&self, query: &PriceQuery) -> Result<Estimate, ContextualError> {
        let Some(collaborators) = &self.collaborators else {
            return Err(ContextualError::MissingCredentials);
        };

        let stage = timing_guard(STAGE_TIME, &[("stage", "embed")]);
        let embedding = collaborators.embeddings.embed(query.as_str()).await?;
        info!(
            "embedding: {}D ({:.2}s)",
            embedding.len(),
            stage.elapsed_secs()
        );
        stage.fin();

        if embedding.len() != EMBEDDING_DIMENSIONS {
            metrics::counter!(DIMENSION_MISMATCHES).increment(1);
            warn!(
                "embedding size mismatch, expected {} got {}",
                EMBEDDING_DIMENSIONS,
                embedding.len()
            );
        }

        let stage = timing_guard(STAGE_TIME, &[("stage", "retrieve")]);
        let products = tokio::time::timeout(
            self.store_timeout,
            collaborators.store.nearest(&embedding, NEIGHBOUR_COUNT),
        )
        .await
        .map_err(|_| ContextualError::StoreTimeout(self.store_timeout))??;
        let retrieve_secs = stage.elapsed_secs();
        stage.fin();

        let messages = if products.is_empty() {
            metrics::counter!(EMPTY_RETRIEVALS).increment(1);
            warn!(
                "no similar products found ({:.2}s), estimating without context",
                retrieve_secs
            );
            simple_prompt(query)
        } else {
            info!(
                "found {} similar products ({:.2}s)",
                products.len(),
                retrieve_secs
            );
            for (i, product) in products.iter().enumerate() {
                info!(
                    "  {}. {} - ${}",
                    i + 1,
                    truncate_chars(&product.title, LOGGED_TITLE_CHARS),
                    product.price
                );
            }
            let context = compose_context(&products);
            info!("context: {} chars", context.len());
            contextual_prompt(&context, query)
        };

        let stage = timing_guard(STAGE_TIME, &[("stage", "complete")]);
        let completion = collaborators.model.complete(&messages).await?;
        let complete_secs = stage.elapsed_secs();
        stage.fin();

        match completion.usage {
            Some(usage) => {
                metrics::counter!(COMPLETION_TOKENS).increment(usage.total_tokens);
                info!(
                    "completion: {:?} ({:.2}s, {} tokens: prompt {}, completion {})",
                    completion.text,
                    complete_secs,
                    usage.total_tokens,
                    usage.prompt_tokens,
                    usage.completion_tokens
                );
            }
            None => info!("completion: {:?} ({:.2}s)", completion.text, complete_secs),
        }

        Ok(parse_price(&completion.text))
    }
}

#[async_trait]
impl PriceEstimator for ContextualEstimator {
    fn origin(&self) -> EstimateOrigin {
        EstimateOrigin::Contextual
    }

    async fn estimate(&self, query: &PriceQuery) -> Estimate {
        let origin = self.origin().as_str();
        let timer = timing_guard(ESTIMATE_TIME, &[("origin", origin)]);

        let (estimate, outcome) = match self.run(query).await {
            Ok(Estimate::Available(price)) => {
                info!(
                    "contextual estimate complete: ${:.2} ({:.2}s)",
                    price,
                    timer.elapsed_secs()
                );
                (Estimate::Available(price), "success")
            }
            Ok(Estimate::Unavailable) => {
                warn!(
                    "contextual estimate produced no usable price ({:.2}s)",
                    timer.elapsed_secs()
                );
                (Estimate::Unavailable, "no_price")
            }
            Err(e) => {
                error!(
                    "contextual estimate failed ({:.2}s): {}",
                    timer.elapsed_secs(),
                    e
                );
                (Estimate::Unavailable, failure_label(&e))
            }
        };

        metrics::counter!(ESTIMATES, &[("origin", origin), ("outcome", outcome)]).increment(1);
        timer.label("outcome", outcome).fin();

        estimate
    }
}

fn failure_label(error: &ContextualError) -> &'static str {
    match error {
        ContextualError::MissingCredentials => "missing_credentials",
        ContextualError::Embedding(_) => "embedding_failed",
        ContextualError::Store(_) => "store_failed",
        ContextualError::StoreTimeout(_) => "timeout",
        ContextualError::Completion(_) => "completion_failed",
    }
}

/// One block per reference product, in retrieval order, separated by a blank line.
pub fn compose_context(products: &[SimilarProduct]) -> String {
    products
        .iter()
        .map(|p| format!("{}\nPrice: ${}", p.description, p.price))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn contextual_prompt(context: &str, query: &PriceQuery) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CONTEXTUAL_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Here are some reference products with their prices:\n\n{}\n\nNow estimate the price for this product:\n{}",
            context,
            query.as_str()
        )),
        ChatMessage::assistant(PRICE_PRIMER),
    ]
}

pub fn simple_prompt(query: &PriceQuery) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SIMPLE_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Estimate the price for this product:\n{}",
            query.as_str()
        )),
        ChatMessage::assistant(PRICE_PRIMER),
    ]
}

/// Pull a price out of a model completion.
///
/// Everything but ASCII digits and `.` is dropped, then the longest leading decimal
/// literal is read, so `"$1,299.99"` gives `1299.99` and `"1.2.3"` gives `1.2`.
/// Text with no digits is unavailable.
pub fn parse_price(text: &str) -> Estimate {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in cleaned.char_indices() {
        if c.is_ascii_digit() {
            end = i + 1;
        } else if !seen_dot {
            seen_dot = true;
        } else {
            break;
        }
    }

    cleaned[..end]
        .parse::<f64>()
        .map(Estimate::from_price)
        .unwrap_or(Estimate::Unavailable)
}
