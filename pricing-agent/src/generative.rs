//! Client for the fine-tuned pricing model, reached through an HTTP bridge.
//!
//! The model itself runs behind a process boundary we don't own (a local relay in
//! development, a serverless function in production). All this module knows is the
//! resolved endpoint and the JSON contract of the bridge.
use std::time;

use async_trait::async_trait;
use common_types::{
    BridgeRequest, BridgeResponse, BridgeStatus, Estimate, EstimateOrigin, PriceQuery,
};
use reqwest::header;
use tracing::{error, info, warn};

use crate::ensemble::PriceEstimator;
use crate::error::GenerativeError;
use crate::metrics_utils::{timing_guard, ESTIMATES, ESTIMATE_TIME};
use crate::truncate_chars;

// Bridge error pages can be whole HTML documents, we only need the start for diagnostics
const MAX_LOGGED_BODY_CHARS: usize = 512;

pub struct GenerativeGateway {
    endpoint: String,
    client: reqwest::Client,
    api_token: Option<String>,
    timeout: time::Duration,
}

impl GenerativeGateway {
    pub fn new(
        endpoint: impl Into<String>,
        api_token: Option<String>,
        timeout: time::Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("pricing-agent")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            api_token,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Ask the bridge for a price. A missing or non-positive price is not an error,
    /// it is reported as `Estimate::Unavailable`.
    pub async fn request_price(&self, query: &PriceQuery) -> Result<Estimate, GenerativeError> {
        let body = BridgeRequest {
            description: query.as_str().to_owned(),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerativeError::StatusError {
                status,
                body: truncate_chars(&body, MAX_LOGGED_BODY_CHARS),
            });
        }

        let payload: BridgeResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerativeError::Timeout(self.timeout)
            } else {
                GenerativeError::MalformedBody(e)
            }
        })?;

        if let Some(message) = payload.error {
            return Err(GenerativeError::BackendError(message));
        }

        Ok(Estimate::from(payload.price))
    }

    /// Hit the bridge's GET handler, giving up after `timeout` instead of the client
    /// timeout. Only used for operational checks, never on the estimation path.
    pub async fn probe(&self, timeout: time::Duration) -> Result<BridgeStatus, GenerativeError> {
        let response = self
            .client
            .get(&self.endpoint)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerativeError::Timeout(timeout)
                } else {
                    GenerativeError::RequestError(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerativeError::StatusError {
                status,
                body: truncate_chars(&body, MAX_LOGGED_BODY_CHARS),
            });
        }

        response
            .json::<BridgeStatus>()
            .await
            .map_err(GenerativeError::MalformedBody)
    }

    fn map_send_error(&self, error: reqwest::Error) -> GenerativeError {
        if error.is_timeout() {
            GenerativeError::Timeout(self.timeout)
        } else {
            GenerativeError::RequestError(error)
        }
    }
}

#[async_trait]
impl PriceEstimator for GenerativeGateway {
    fn origin(&self) -> EstimateOrigin {
        EstimateOrigin::Generative
    }

    async fn estimate(&self, query: &PriceQuery) -> Estimate {
        let origin = self.origin().as_str();
        let timer = timing_guard(ESTIMATE_TIME, &[("origin", origin)]);

        let (estimate, outcome) = match self.request_price(query).await {
            Ok(Estimate::Available(price)) => {
                info!(
                    "generative estimate complete: ${:.2} ({:.2}s)",
                    price,
                    timer.elapsed_secs()
                );
                (Estimate::Available(price), "success")
            }
            Ok(Estimate::Unavailable) => {
                warn!(
                    "generative bridge answered without a usable price ({:.2}s)",
                    timer.elapsed_secs()
                );
                (Estimate::Unavailable, "no_price")
            }
            Err(e) => {
                error!(
                    "generative estimate failed ({:.2}s): {}",
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

fn failure_label(error: &GenerativeError) -> &'static str {
    match error {
        GenerativeError::RequestError(_) => "unreachable",
        GenerativeError::Timeout(_) => "timeout",
        GenerativeError::StatusError { .. } => "bad_status",
        GenerativeError::BackendError(_) => "backend_error",
        GenerativeError::MalformedBody(_) => "malformed_body",
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn gateway(endpoint: String) -> GenerativeGateway {
        GenerativeGateway::new(endpoint, None, time::Duration::from_secs(5))
            .expect("failed to build gateway")
    }

    fn query() -> PriceQuery {
        PriceQuery::new("Stainless steel espresso machine with milk frother").unwrap()
    }

    #[tokio::test]
    async fn test_returns_price_from_bridge() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/modal-llama")
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "description": "Stainless steel espresso machine with milk frother"
                    }));
                then.status(200)
                    .json_body(json!({"price": 249.99, "source": "modal-llama"}));
            })
            .await;

        let gateway = gateway(server.url("/api/modal-llama"));

        assert_eq!(gateway.estimate(&query()).await, Estimate::Available(249.99));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_attaches_bearer_token_when_configured() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).header("authorization", "Bearer bridge-token");
                then.status(200).json_body(json!({"price": 10.0}));
            })
            .await;

        let gateway = GenerativeGateway::new(
            server.url("/"),
            Some("bridge-token".to_owned()),
            time::Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(gateway.estimate(&query()).await, Estimate::Available(10.0));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(500)
                    .json_body(json!({"error": "MODAL_TOKEN_ID and MODAL_TOKEN_SECRET environment variables required", "price": 0}));
            })
            .await;

        let gateway = gateway(server.url("/"));

        match gateway.request_price(&query()).await {
            Err(GenerativeError::StatusError { status, body }) => {
                assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
                assert!(body.contains("MODAL_TOKEN_ID"));
            }
            other => panic!("expected StatusError, got {:?}", other),
        }
        assert_eq!(gateway.estimate(&query()).await, Estimate::Unavailable);
    }

    #[tokio::test]
    async fn test_error_field_is_unavailable_even_on_success_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .json_body(json!({"error": "model not deployed", "price": 12.0}));
            })
            .await;

        let gateway = gateway(server.url("/"));

        match gateway.request_price(&query()).await {
            Err(GenerativeError::BackendError(message)) => {
                assert_eq!(message, "model not deployed")
            }
            other => panic!("expected BackendError, got {:?}", other),
        }
        assert_eq!(gateway.estimate(&query()).await, Estimate::Unavailable);
    }

    #[tokio::test]
    async fn test_malformed_body_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let gateway = gateway(server.url("/"));

        assert!(matches!(
            gateway.request_price(&query()).await,
            Err(GenerativeError::MalformedBody(_))
        ));
        assert_eq!(gateway.estimate(&query()).await, Estimate::Unavailable);
    }

    #[tokio::test]
    async fn test_missing_or_zero_price_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/zero");
                then.status(200).json_body(json!({"price": 0, "source": "modal-llama"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/missing");
                then.status(200).json_body(json!({"source": "modal-llama"}));
            })
            .await;

        assert_eq!(
            gateway(server.url("/zero")).estimate(&query()).await,
            Estimate::Unavailable
        );
        assert_eq!(
            gateway(server.url("/missing")).estimate(&query()).await,
            Estimate::Unavailable
        );
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_unavailable() {
        let gateway = gateway("http://127.0.0.1:1/".to_owned());

        assert!(matches!(
            gateway.request_price(&query()).await,
            Err(GenerativeError::RequestError(_))
        ));
        assert_eq!(gateway.estimate(&query()).await, Estimate::Unavailable);
    }

    #[tokio::test]
    async fn test_slow_bridge_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .delay(time::Duration::from_millis(500))
                    .json_body(json!({"price": 99.0}));
            })
            .await;

        let gateway = GenerativeGateway::new(
            server.url("/"),
            None,
            time::Duration::from_millis(50),
        )
        .unwrap();

        assert!(matches!(
            gateway.request_price(&query()).await,
            Err(GenerativeError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_reads_liveness_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200)
                    .json_body(json!({"status": "ok", "service": "modal-llama-bridge (dev)", "port": 3001}));
            })
            .await;

        let status = gateway(server.url("/"))
            .probe(time::Duration::from_secs(1))
            .await
            .unwrap();
        assert!(status.is_ok());
        assert_eq!(status.service, "modal-llama-bridge (dev)");
    }

    #[tokio::test]
    async fn test_probe_gives_up_before_the_client_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200)
                    .delay(time::Duration::from_secs(2))
                    .json_body(json!({"status": "ok", "service": "modal-llama-bridge"}));
            })
            .await;

        // The client would wait 5s, the probe only 50ms
        let gateway = gateway(server.url("/"));
        let start = time::Instant::now();

        match gateway.probe(time::Duration::from_millis(50)).await {
            Err(GenerativeError::Timeout(waited)) => {
                assert_eq!(waited, time::Duration::from_millis(50))
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert!(start.elapsed() < time::Duration::from_secs(1));
    }
}
