//! Serve ensemble price predictions over HTTP.
use std::time::Duration;

use axum::Router;
use envconfig::Envconfig;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use pricing_agent::{
    api::add_routes,
    app_context::AppContext,
    config::Config,
    error::StartupError,
    metrics_utils::{serve, setup_metrics_routes},
};

const BRIDGE_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_from_env()?;
    let context = AppContext::new(config)?;

    // Only informative, the bridge may well come up after we do
    match context.gateway.probe(BRIDGE_PROBE_TIMEOUT).await {
        Ok(status) if status.is_ok() => info!("generative bridge is up: {}", status.service),
        Ok(status) => warn!(
            "generative bridge answered with status {}: {}",
            status.status, status.service
        ),
        Err(e) => warn!("generative bridge is not reachable yet: {}", e),
    }

    let router = add_routes(Router::new(), context.predictor.clone());
    let router = setup_metrics_routes(router)?;

    let bind = context.config.bind();
    info!("listening on {}", bind);
    serve(router, &bind).await?;

    Ok(())
}
