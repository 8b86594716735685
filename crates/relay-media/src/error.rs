//! Error types for the engine boundary.

use thiserror::Error;

use relay_protocol::SignalError;

/// Errors that can occur while driving the media engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Spawning the worker process failed.
    #[error("worker spawn failed: {0}")]
    Spawn(String),

    /// The worker's stdio channel is gone.
    #[error("worker channel closed")]
    ChannelClosed,

    /// The worker rejected a request.
    #[error("worker request failed: {0}")]
    Request(String),

    /// The worker replied with something we cannot interpret.
    #[error("unexpected worker reply: {0}")]
    Protocol(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for SignalError {
    fn from(error: EngineError) -> Self {
        SignalError::Engine(error.to_string())
    }
}
