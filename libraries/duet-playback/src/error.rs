//! Error types for playback management

use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// A preload did not produce a playable resource
    #[error("Preload failed: {0}")]
    Preload(#[from] PreloadError),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The engine task has stopped and no longer accepts commands
    #[error("Playback engine has shut down")]
    EngineClosed,
}

/// Why a preload fetch was rejected
///
/// Every variant is recovered locally by pointing the target slot at the
/// remote URL instead.
#[derive(Debug, Error)]
pub enum PreloadError {
    /// Song has not been resolved to a fetchable URL yet
    #[error("Song has no audio URL")]
    MissingUrl,

    /// URL could not be parsed
    #[error("Invalid audio URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Network or protocol failure
    #[error("Fetch failed: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("Unexpected HTTP status {0}")]
    BadStatus(u16),

    /// Response is not audio (typically an HTML error page)
    #[error("Invalid content type: {0}")]
    WrongContentType(String),

    /// Body is too small to be real audio
    #[error("Body too small: {size} bytes (minimum {minimum})")]
    TooSmall { size: usize, minimum: usize },

    /// Resource store could not materialise the bytes
    #[error("Resource store rejected the audio: {0}")]
    Store(String),
}

/// Failures reported by an audio slot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    /// Platform refused to start playback (autoplay policy, missing gesture)
    #[error("Playback blocked: {0}")]
    Blocked(String),

    /// Source could not be decoded
    #[error("Decode failed: {0}")]
    Decode(String),

    /// `play()` was called before any source was loaded
    #[error("No source loaded")]
    NoSource,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Sources could not be read or deserialised
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
