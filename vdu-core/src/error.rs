//! Domain-specific error types for the VDU client.
//!
//! All fallible operations return `Result<T, VduError>`.
//! No panics on invalid input — every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the VDU client library.
#[derive(Debug, Error)]
pub enum VduError {
    // ── Config Service Errors ────────────────────────────────────
    /// The config service transport layer reported an error.
    #[error("config service transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The config service returned a non-success status.
    #[error("config service rejected request: {0}")]
    Api(String),

    /// A payload could not be parsed as JSON.
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),

    // ── Renderer Errors ──────────────────────────────────────────
    /// A renderer variant failed to load.
    #[error("renderer load failed: {0}")]
    RendererLoad(String),

    /// The requested renderer differs from the one already active.
    /// The active variant cannot be swapped in place.
    #[error("renderer variant changed, session restart required")]
    SessionRestartRequired,

    // ── Decode Errors ────────────────────────────────────────────
    /// A decode backend rejected a coded unit.
    #[error("decode error: {0}")]
    Decode(String),

    /// A decode backend could not be (re)configured.
    #[error("decoder configuration failed: {0}")]
    DecoderConfig(String),

    // ── Stream Errors ────────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("stream error: {0}")]
    Stream(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Preference Errors ────────────────────────────────────────
    /// The preference store could not be read or persisted.
    #[error("preference store error: {0}")]
    Preference(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for VduError {
    fn from(s: String) -> Self {
        VduError::Other(s)
    }
}

impl From<&str> for VduError {
    fn from(s: &str) -> Self {
        VduError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for VduError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        VduError::ChannelClosed
    }
}
