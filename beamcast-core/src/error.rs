//! Error types for Beamcast

use thiserror::Error;

use crate::types::MediaKind;

/// Result type alias using BeamcastError
pub type Result<T> = std::result::Result<T, BeamcastError>;

/// Main error type for Beamcast operations
#[derive(Debug, Error)]
pub enum BeamcastError {
    /// Invalid or missing settings, detected synchronously
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network connection failure while starting a stream
    #[error("Connect error: {0}")]
    Connect(String),

    /// Codec open/configure failure, fatal to the start transition
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Mid-stream codec or write failure on one lane
    #[error("{kind} lane encode error: {message}")]
    Encode {
        /// Which lane failed
        kind: MediaKind,
        /// What went wrong
        message: String,
    },

    /// Lifecycle misuse (e.g. querying the clock outside Publishing)
    #[error("State error: {0}")]
    State(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BeamcastError>,
    },
}

impl BeamcastError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connect error
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    /// Create an encoder error
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Create a runtime encode error for one lane
    pub fn encode(kind: MediaKind, msg: impl Into<String>) -> Self {
        Self::Encode {
            kind,
            message: msg.into(),
        }
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl From<ffmpeg_next::Error> for BeamcastError {
    fn from(err: ffmpeg_next::Error) -> Self {
        Self::Encoder(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wrapping() {
        let err: Result<()> = Err(BeamcastError::config("missing url"));
        let wrapped = err.context("preparing session").unwrap_err();
        let text = wrapped.to_string();
        assert!(text.contains("preparing session"));
        assert!(text.contains("missing url"));
    }

    #[test]
    fn test_encode_error_names_lane() {
        let err = BeamcastError::encode(MediaKind::Audio, "codec fault");
        assert!(err.to_string().contains("audio"));
    }
}
