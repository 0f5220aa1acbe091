use uuid::Uuid;

/// Errors surfaced by the scoring engine and its claim stores.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("provider not found: {provider_id}")]
    NotFound { provider_id: Uuid },

    #[error("malformed claim: {reason}")]
    MalformedClaim { reason: String },

    #[error("claim store error: {reason}")]
    Store { reason: String },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Store {
            reason: err.to_string(),
        }
    }
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        EngineError::Store {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Config {
            reason: err.to_string(),
        }
    }
}
