//! Result and error types for the capture pipeline.

use thiserror::Error;

/// Result type for export operations
pub type ExportarResult<T> = Result<T, ExportError>;

/// Errors that can occur while exporting an invitation
#[derive(Debug, Error)]
pub enum ExportError {
    /// Rendering engine acquisition failed; retryable on the next call
    #[error("Rendering engine unavailable: {message}")]
    EngineUnavailable {
        /// Error message
        message: String,
    },

    /// Target page unreachable or failed to load
    #[error("Navigation to {url} failed: {message}")]
    NavigationFailed {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Screenshot failure after a successful navigation
    #[error("Capture failed at frame {frame_index}: {message}")]
    CaptureFailed {
        /// Zero-based index of the frame that failed
        frame_index: u32,
        /// Error message
        message: String,
    },

    /// Export aborted by a caller-signalled cancellation
    #[error("Export cancelled after {frames_captured} frames")]
    Cancelled {
        /// Frames captured before the cancellation was observed
        frames_captured: u32,
    },

    /// Capture configuration rejected before any session was opened
    #[error("Invalid capture configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Invitation identifier did not resolve to a render target
    #[error("Invitation not found: {id}")]
    InvitationNotFound {
        /// Opaque invitation identifier
        id: String,
    },

    /// Frame decoding or GIF assembly error
    #[error("Image processing failed: {message}")]
    ImageProcessing {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Create an `EngineUnavailable` error
    #[must_use]
    pub fn engine_unavailable(message: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            message: message.into(),
        }
    }

    /// Create a `NavigationFailed` error for a target URL
    #[must_use]
    pub fn navigation_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NavigationFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a `CaptureFailed` error carrying the failing frame index
    #[must_use]
    pub fn capture_failed(frame_index: u32, message: impl Into<String>) -> Self {
        Self::CaptureFailed {
            frame_index,
            message: message.into(),
        }
    }

    /// Whether a subsequent request may retry without changing the target
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EngineUnavailable { .. } | Self::CaptureFailed { .. }
        )
    }
}
