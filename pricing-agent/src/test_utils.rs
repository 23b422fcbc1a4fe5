//! In-memory stand-ins for the external collaborators, shared by unit and integration tests.
use std::sync::{Arc, Mutex};
use std::time;

use async_trait::async_trait;
use common_types::{Estimate, EstimateOrigin, PriceQuery, SimilarProduct};

use crate::completion::{ChatMessage, Completion, CompletionModel, TokenUsage};
use crate::embedding::EmbeddingProvider;
use crate::ensemble::PriceEstimator;
use crate::error::{CompletionError, EmbeddingError};
use crate::similarity::SimilarityStore;

pub fn product(title: &str, description: &str, price: f64) -> SimilarProduct {
    SimilarProduct {
        title: title.to_string(),
        description: description.to_string(),
        price,
    }
}

/// Always answers with the same estimate, optionally after a delay.
pub struct FixedEstimator {
    origin: EstimateOrigin,
    estimate: Estimate,
    delay: Option<time::Duration>,
}

impl FixedEstimator {
    pub fn generative(estimate: Estimate) -> Self {
        Self {
            origin: EstimateOrigin::Generative,
            estimate,
            delay: None,
        }
    }

    pub fn contextual(estimate: Estimate) -> Self {
        Self {
            origin: EstimateOrigin::Contextual,
            estimate,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl PriceEstimator for FixedEstimator {
    fn origin(&self) -> EstimateOrigin {
        self.origin
    }

    async fn estimate(&self, _query: &PriceQuery) -> Estimate {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.estimate
    }
}

pub struct MockEmbeddings {
    dimensions: Option<usize>,
}

impl MockEmbeddings {
    pub fn of_dimension(dimensions: usize) -> Self {
        Self {
            dimensions: Some(dimensions),
        }
    }

    pub fn failing() -> Self {
        Self { dimensions: None }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self.dimensions {
            Some(dimensions) => Ok(vec![0.1; dimensions]),
            None => Err(EmbeddingError::MissingEmbedding),
        }
    }
}

/// Clones share the recorded calls, so a test can keep a handle after moving one into
/// the estimator.
#[derive(Clone)]
pub struct MockSimilarityStore {
    products: Option<Vec<SimilarProduct>>,
    delay: Option<time::Duration>,
    requested_limits: Arc<Mutex<Vec<usize>>>,
}

impl MockSimilarityStore {
    pub fn returning(products: Vec<SimilarProduct>) -> Self {
        Self {
            products: Some(products),
            delay: None,
            requested_limits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            products: None,
            delay: None,
            requested_limits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requested_limits(&self) -> Vec<usize> {
        self.requested_limits
            .lock()
            .expect("poisoned mock store")
            .clone()
    }
}

#[async_trait]
impl SimilarityStore for MockSimilarityStore {
    async fn nearest(
        &self,
        _embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SimilarProduct>, sqlx::Error> {
        self.requested_limits
            .lock()
            .expect("poisoned mock store")
            .push(limit);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.products {
            Some(products) => Ok(products.iter().take(limit).cloned().collect()),
            None => Err(sqlx::Error::PoolTimedOut),
        }
    }
}

pub struct MockCompletionModel {
    answer: Option<String>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockCompletionModel {
    pub fn answering(text: &str) -> Self {
        Self {
            answer: Some(text.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().expect("poisoned mock model").clone()
    }
}

#[async_trait]
impl CompletionModel for MockCompletionModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, CompletionError> {
        self.calls
            .lock()
            .expect("poisoned mock model")
            .push(messages.to_vec());

        match &self.answer {
            Some(text) => Ok(Completion {
                text: text.clone(),
                usage: Some(TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 3,
                    total_tokens: 103,
                }),
            }),
            None => Err(CompletionError::MissingChoice),
        }
    }
}
