//! Error types for hlsload core

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single network fetch.
///
/// All four kinds are treated the same by the session: the fetch failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("HTTP error: status {0}")]
    Http(u16),

    #[error("request timed out")]
    Timeout,

    #[error("too many redirects")]
    TooManyRedirects,
}

impl FetchError {
    /// Returns the error code used in request statistics
    pub fn error_code(&self) -> &'static str {
        match self {
            FetchError::Connection(_) => "CONNECTION",
            FetchError::Http(_) => "HTTP",
            FetchError::Timeout => "TIMEOUT",
            FetchError::TooManyRedirects => "TOO_MANY_REDIRECTS",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_redirect() {
            FetchError::TooManyRedirects
        } else if let Some(status) = err.status() {
            FetchError::Http(status.as_u16())
        } else {
            FetchError::Connection(err.to_string())
        }
    }
}

/// Session error types
#[derive(Error, Debug)]
pub enum Error {
    // Startup errors
    #[error("Failed to fetch master manifest {url}: {source}")]
    MasterFetch { url: String, source: FetchError },

    #[error("Failed to fetch media playlist {url}: {source}")]
    PlaylistFetch { url: String, source: FetchError },

    #[error("Master manifest {url} declares no variant streams")]
    NoVariants { url: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // Playback errors
    #[error("Buffer underrun: played {elapsed_play_time:.1}s of {buffered_seconds:.1}s buffered with fragments outstanding")]
    Underrun {
        buffered_seconds: f64,
        elapsed_play_time: f64,
    },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for failures that end a session before playback could begin
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Error::MasterFetch { .. }
                | Error::PlaylistFetch { .. }
                | Error::NoVariants { .. }
                | Error::InvalidUrl { .. }
        )
    }

    /// Returns the error code for reports
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::MasterFetch { .. } => "MASTER_FETCH",
            Error::PlaylistFetch { .. } => "PLAYLIST_FETCH",
            Error::NoVariants { .. } => "NO_VARIANTS",
            Error::InvalidUrl { .. } => "INVALID_URL",
            Error::Underrun { .. } => "BUFFER_UNDERRUN",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}
