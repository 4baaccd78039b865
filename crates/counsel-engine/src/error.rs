use thiserror::Error;

/// Failure taxonomy shared by every engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Expired(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("{0}")]
    Misconfigured(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Upstream(format!("datastore: {:#}", err))
    }
}
