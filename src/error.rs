//! Unified error handling for the epgrab crate
//!
//! Domain-specific errors ([`FetchError`], [`ScrapeError`], [`XmltvError`])
//! are consolidated into a single [`Error`] enum for use across module
//! boundaries. Scraper failures are recovered inside the fallback
//! dispatcher and never escape a per-day update; the unified type exists
//! for the surfaces that do propagate (configuration, serialization, I/O).

use std::io;
use thiserror::Error;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded")]
    MaxRetriesExceeded,

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether retrying the request may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::ServerError(status) => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Timeout | Self::MaxRetriesExceeded => true,
            Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Errors produced by a source scraper for one channel/date fetch
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Transport-level failure
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Response arrived but did not match the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// A timestamp field could not be interpreted
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The source cannot serve the requested date
    #[error("Date out of range for this source")]
    DateOutOfRange,

    /// JSON deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reading or writing the XMLTV interchange document
#[derive(Error, Debug)]
pub enum XmltvError {
    /// Underlying XML error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed attribute
    #[error("XML attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    /// A required attribute was missing from an element
    #[error("Missing attribute `{0}`")]
    MissingAttribute(&'static str),

    /// A `start`/`stop`/`date` stamp could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Unified error type for the epgrab crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch-specific errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Scraper errors
    #[error("Scrape error: {0}")]
    Scrape(#[from] ScrapeError),

    /// XMLTV document errors
    #[error("XMLTV error: {0}")]
    Xmltv(#[from] XmltvError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
