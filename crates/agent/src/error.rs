//! Agent error types.

use std::time::Duration;

use thermogate_core::error::CoreError;

/// A failed register read. The Modbus connection is dropped on any of
/// these and re-established on the next cycle.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Could not connect to the device: {0}")]
    Connect(#[source] std::io::Error),

    #[error("Device did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Modbus transport error: {0}")]
    Transport(String),

    #[error("Device returned exception: {0}")]
    Exception(String),

    #[error("Expected {expected} registers, device returned {got}")]
    ShortRead { expected: usize, got: usize },
}

/// Failure to assemble the file bundle for a retrieval request.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("No bundle source configured (set FTP_HOST or BUNDLE_SOURCE_DIR)")]
    NotConfigured,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Bundle task panicked")]
    Join,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("Bundle upload failed: {0}")]
    Upload(#[from] reqwest::Error),

    #[error("Backend rejected bundle upload with status {0}")]
    UploadRejected(u16),
}
