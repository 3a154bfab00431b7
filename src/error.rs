use std::time::Duration;
use thiserror::Error;

/// Reasons `init` can fail
#[derive(Error, Debug)]
pub enum InitError {
    #[error("status overlay is not supported on this platform")]
    Unsupported,
    #[error("failed to spawn UI thread: {0}")]
    Thread(#[from] std::io::Error),
    #[error("UI context did not become ready within {0:?}")]
    Timeout(Duration),
    #[error("failed to create overlay window: {0}")]
    Window(String),
    #[error("UI context went away before it was ready")]
    Disconnected,
}

impl InitError {
    /// Status code reported through the C interface
    pub fn code(&self) -> i32 {
        -1
    }
}
