use serde::{Deserialize, Serialize};

/// Body POSTed to the generative model bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub description: String,
}

/// What the bridge answers with. Success carries `price` and `source`; failures
/// carry `error` and a zero price, usually alongside a non-2xx status.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BridgeResponse {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness payload returned by the bridge's GET handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub status: String,
    pub service: String,
}

impl BridgeStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
