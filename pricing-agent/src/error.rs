use std::time;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors calling the generative model bridge. All of them end as an unavailable estimate.
#[derive(Error, Debug)]
pub enum GenerativeError {
    #[error("generative bridge could not be reached: {0}")]
    RequestError(reqwest::Error),
    #[error("generative bridge timed out after {0:?}")]
    Timeout(time::Duration),
    #[error("generative bridge responded with {status}: {body}")]
    StatusError { status: StatusCode, body: String },
    #[error("generative bridge reported an error: {0}")]
    BackendError(String),
    #[error("generative bridge returned a malformed body: {0}")]
    MalformedBody(reqwest::Error),
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("embedding provider responded with {status}: {body}")]
    StatusError { status: StatusCode, body: String },
    #[error("embedding response contained no vector")]
    MissingEmbedding,
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("completion model responded with {status}: {body}")]
    StatusError { status: StatusCode, body: String },
    #[error("completion response contained no choices")]
    MissingChoice,
}

/// Any stage of the retrieval-augmented pipeline failing.
#[derive(Error, Debug)]
pub enum ContextualError {
    #[error("no OpenAI credentials configured")]
    MissingCredentials,
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("similarity query failed: {0}")]
    Store(#[from] sqlx::Error),
    #[error("similarity query timed out after {0:?}")]
    StoreTimeout(time::Duration),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Errors that stop the service from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] envconfig::Error),
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to connect to the similarity store: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
    #[error("failed to serve: {0}")]
    Serve(#[from] std::io::Error),
}
