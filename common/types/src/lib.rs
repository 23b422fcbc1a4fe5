mod bridge;
mod pricing;

// Pricing
pub use pricing::round_to_cents;
pub use pricing::BackendEstimate;
pub use pricing::CombinationMethod;
pub use pricing::EmptyQueryError;
pub use pricing::Estimate;
pub use pricing::EstimateOrigin;
pub use pricing::PricePrediction;
pub use pricing::PriceQuery;
pub use pricing::SimilarProduct;
pub use pricing::EMBEDDING_DIMENSIONS;

// Generative bridge wire format
pub use bridge::BridgeRequest;
pub use bridge::BridgeResponse;
pub use bridge::BridgeStatus;
