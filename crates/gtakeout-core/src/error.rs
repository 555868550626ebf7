use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the gtakeout library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive could not be read
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// EXIF block missing or malformed
    #[error("EXIF error: {0}")]
    Exif(#[from] exif::Error),

    /// JSON (sidecar, progress record or config) could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebDriver session or page interaction failed
    #[error("Browser error: {0}")]
    Browser(String),

    /// The browser page or session went away
    #[error("Browser page closed: {0}")]
    PageClosed(String),

    /// Timed out waiting for something in the browser or on disk
    #[error("Timed out: {0}")]
    Timeout(String),

    /// HTTP request failed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Report export failed
    #[error("Report error: {0}")]
    Report(String),

    /// Not enough free space to continue
    #[error(
        "Insufficient disk space at {path}: need {needed} bytes, {available} available"
    )]
    InsufficientSpace {
        path: PathBuf,
        needed: u64,
        available: u64,
    },

    /// File not found error
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Cancelled by the user
    #[error("Operation interrupted")]
    Interrupted,
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Report(err.to_string())
    }
}

impl From<upon::Error> for Error {
    fn from(err: upon::Error) -> Self {
        Error::Report(err.to_string())
    }
}

impl From<fantoccini::error::CmdError> for Error {
    fn from(err: fantoccini::error::CmdError) -> Self {
        let msg = err.to_string();
        let lower = msg.to_lowercase();
        if lower.contains("no such window")
            || lower.contains("invalid session id")
            || lower.contains("connection")
        {
            Error::PageClosed(msg)
        } else {
            Error::Browser(msg)
        }
    }
}

impl From<fantoccini::error::NewSessionError> for Error {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        Error::Browser(format!("Failed to start WebDriver session: {}", err))
    }
}
