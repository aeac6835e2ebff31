/// Errors raised while building a [`crate::Client`] from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Collector endpoint must not be empty")]
    MissingEndpoint,

    #[error("Queue capacity must be greater than 0, got {0}")]
    InvalidQueueCapacity(usize),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidEnvVar { name: &'static str, value: String },

    #[error("Failed to build HTTP transport: {0}")]
    HttpTransport(#[source] TransportError),
}

/// Failures of the send primitive.
///
/// Any of these makes a delivery attempt count as failed: an immediate
/// attempt gets queued, a queued attempt is rotated and retried later.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Collector responded with retryable status {0}")]
    Status(u16),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error("Delivery attempt was cancelled before completing")]
    Cancelled,
}

/// Errors handed to the `on_error` notification channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("Queue full, dropping oldest log")]
    QueueFull,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
