use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing, Json, Router};
use common_types::{PricePrediction, PriceQuery};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ensemble::EnsemblePredictor;

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictRequestBody {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn add_routes(router: Router, predictor: Arc<EnsemblePredictor>) -> Router {
    router.route("/", routing::get(index)).route(
        "/predict",
        routing::post(predict).with_state(predictor),
    )
}

pub async fn index() -> &'static str {
    "pricing agent"
}

/// Backend failures never surface here: they show up as a zero `finalPrice`.
pub async fn predict(
    State(predictor): State<Arc<EnsemblePredictor>>,
    Json(payload): Json<PredictRequestBody>,
) -> Result<Json<PricePrediction>, (StatusCode, Json<ErrorResponse>)> {
    debug!("received payload: {:?}", payload);

    let query = payload
        .description
        .ok_or_else(|| bad_request("description is required"))
        .and_then(|description| {
            PriceQuery::new(description).map_err(|e| bad_request(&e.to_string()))
        })?;

    Ok(Json(predictor.predict(&query).await))
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_owned(),
        }),
    )
}
