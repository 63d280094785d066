use serde_json::Value;
use thiserror::Error;

/// Errors returned by cloud client operations.
#[derive(Error, Debug)]
pub enum CloudError {
    /// The credential was missing or rejected by the service.
    #[error("{0}")]
    Unauthorized(String),

    /// Interactive sign-in was not confirmed within the allowed wait.
    #[error("Sign-in attempt timed out after {0} seconds")]
    Timeout(u64),

    /// The service answered the sign-in confirmation with a failure status.
    #[error("Authorization could not be confirmed: {0}")]
    AuthorizationFailed(String),

    /// The service returned a non-success HTTP status.
    ///
    /// `data` carries the structured response body when there was one;
    /// a 402 body holds the `credits`/`cost` fields used for quota handling.
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        data: Option<Value>,
    },

    /// Connection-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// The account does not have enough credits for the job (HTTP 402).
    #[error("Insufficient funds - generation would cost {cost} tokens. Remaining tokens: {credits}")]
    QuotaExceeded { cost: i64, credits: i64 },

    /// A request or result payload was missing required structure.
    #[error("{0}")]
    MalformedPayload(String),

    /// The service reported the job as FAILED.
    #[error("{message}")]
    RemoteJobFailure { message: String, traceback: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CloudError>;
