use thiserror::Error;

/// An inbound message could not be turned into a reading.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("payload is not a valid reading: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload has an empty location name")]
    EmptyLocation,
}

/// A store or broker call failed. Never fatal on its own.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("store {operation} failed on key '{key}': {message}")]
    Store {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("stored value '{value}' under key '{key}' is not a temperature")]
    Corrupt { key: String, value: String },

    #[error("broker poll failed: {0}")]
    Broker(String),
}

impl BackendError {
    pub fn store(operation: &'static str, key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        BackendError::Store {
            operation,
            key: key.into(),
            message: err.to_string(),
        }
    }
}

/// Subscription lifecycle failures, reported to the caller of start/stop.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to subscribe to topic '{topic}': {message}")]
    Subscribe { topic: String, message: String },

    #[error("failed to close subscription: {0}")]
    Close(String),

    #[error("failed to connect to backend at '{endpoint}': {message}")]
    Connect { endpoint: String, message: String },

    #[error("consumer is already running")]
    AlreadyRunning,

    #[error("consumer worker terminated abnormally: {0}")]
    WorkerPanicked(String),
}
