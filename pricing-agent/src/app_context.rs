use std::sync::Arc;

use common_types::EMBEDDING_DIMENSIONS;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::{
    completion::OpenAiChat,
    config::Config,
    contextual::ContextualEstimator,
    embedding::OpenAiEmbeddings,
    ensemble::EnsemblePredictor,
    error::StartupError,
    generative::GenerativeGateway,
    similarity::PgSimilarityStore,
};

pub struct AppContext {
    pub config: Config,
    pub gateway: Arc<GenerativeGateway>,
    pub predictor: Arc<EnsemblePredictor>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self, StartupError> {
        let endpoint = config.generative_endpoint();
        info!(
            "generative bridge: {} ({})",
            endpoint,
            config.deployment_mode.as_str()
        );

        let gateway = Arc::new(GenerativeGateway::new(
            endpoint,
            config
                .generative_api_token
                .as_ref()
                .map(|t| t.as_str().to_owned()),
            config.generative_timeout_ms.0,
        )?);

        let contextual = match &config.openai_api_key {
            Some(api_key) => contextual_estimator(&config, api_key.as_str())?,
            None => {
                warn!("OPENAI_API_KEY is not set, contextual estimates are unavailable");
                ContextualEstimator::without_credentials()
            }
        };

        let predictor = Arc::new(EnsemblePredictor::new(
            gateway.clone(),
            Arc::new(contextual),
        ));

        Ok(Self {
            config,
            gateway,
            predictor,
        })
    }
}

fn contextual_estimator(
    config: &Config,
    api_key: &str,
) -> Result<ContextualEstimator, StartupError> {
    let base_url = config.openai_base_url.as_str();
    let timeout = config.openai_timeout_ms.0;

    let embeddings = OpenAiEmbeddings::new(
        base_url,
        api_key,
        config.embedding_model.as_str(),
        EMBEDDING_DIMENSIONS,
        timeout,
    )?;
    let model = OpenAiChat::new(base_url, api_key, config.completion_model.as_str(), timeout)?;

    // Lazy, so an unreachable store only takes down the contextual estimate, not the service
    let pool = PgPoolOptions::new()
        .max_connections(config.max_pg_connections)
        .acquire_timeout(config.store_timeout_ms.0)
        .connect_lazy(&config.database_url)?;
    let store = PgSimilarityStore::new(
        pool,
        config.product_table.as_str(),
        config.distance_metric,
    );

    Ok(ContextualEstimator::new(
        Arc::new(embeddings),
        Arc::new(store),
        Arc::new(model),
        config.store_timeout_ms.0,
    ))
}
