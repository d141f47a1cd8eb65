use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors answered by the cache service. These cross the RPC boundary as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum CacheError {
    #[error("unknown context {0}")]
    UnknownContext(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown method {0}")]
    UnknownMethod(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("connection refused by {0}")]
    ConnectionRefused(String),

    #[error("service {0} is not registered on the server")]
    UnknownService(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error(transparent)]
    Remote(#[from] CacheError),
}

impl RpcError {
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, RpcError::ConnectionRefused(_))
    }
}

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("failed to launch the watch service: {0}")]
    SpawnFailure(#[source] std::io::Error),

    #[error("watch service was not ready after {elapsed:?}: {last_error}")]
    Timeout {
        elapsed: Duration,
        last_error: String,
    },
}
