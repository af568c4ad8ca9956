use mito_broker::protocol::ErrorDescriptor;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no backend command; pass --backend or set MITO_BACKEND")]
    MissingBackend,
    #[error("failed to start backend '{program}': {source}")]
    Spawn { program: String, source: io::Error },
    #[error("backend {0} pipe unavailable")]
    MissingPipe(&'static str),
    #[error("backend did not answer '{0}' within its retry budget")]
    NoReply(String),
    #[error("{}: {}", .0.header, .0.to_fix)]
    Backend(ErrorDescriptor),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging initialization failed: {0}")]
    Logging(String),
}
