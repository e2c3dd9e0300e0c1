/// Result alias that carries the custom [`AnchorError`] type.
pub type Result<T> = std::result::Result<T, AnchorError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    /// A session parameter was zero, negative or not a finite number.
    #[error("invalid {name}: {value} (must be a finite number greater than zero)")]
    InvalidParameter { name: &'static str, value: f32 },
    /// Sessions must last at least one second.
    #[error("session duration must be at least one second")]
    InvalidDuration,
    /// The audio output device could not be acquired. The engine stays idle
    /// and the caller may retry, typically after a user gesture.
    #[error("audio output unavailable: {0}")]
    OutputUnavailable(String),
    /// Engine constants that cannot produce a valid session.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
}

impl AnchorError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Whether the caller can reasonably retry the failed operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutputUnavailable(_))
    }
}

impl From<&str> for AnchorError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for AnchorError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
