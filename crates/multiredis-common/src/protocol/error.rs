use thiserror::Error;

#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Timeout on running command after {0}ms")]
    Timeout(u64),

    #[error("Child connection panicked while sending command: {0}")]
    ChildPanicked(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Redis connections/endpoints not provided")]
    NoTargets,

    #[error("Unsupported command: {0}")]
    UnknownCommand(String),

    #[error("Fan-out client must be constructed inside a tokio runtime")]
    NoRuntime,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl FanoutError {
    /// Returns true for errors synthesized locally because a child did not answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FanoutError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, FanoutError>;
