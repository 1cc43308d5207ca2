use crate::foundation::core::{BufferType, Hresult};

/// Result alias used across the crate.
pub type HwDecodeResult<T> = Result<T, HwDecodeError>;

/// Failure of a decode transaction step.
///
/// The transient busy status never shows up here on its own; it becomes
/// [`HwDecodeError::BeginBusy`] only once the begin-frame retry budget is spent.
#[derive(thiserror::Error, Debug)]
pub enum HwDecodeError {
    /// The backend could not provide a slot for the buffer type.
    #[error("failed to get a buffer for {buffer_type}: {status}")]
    BufferAcquire {
        /// Requested buffer type.
        buffer_type: BufferType,
        /// Backend status code.
        status: Hresult,
    },

    /// The payload does not fit into the slot the backend handed out.
    #[error("buffer for {buffer_type} was too small: {size} bytes into {capacity}")]
    BufferTooSmall {
        /// Requested buffer type.
        buffer_type: BufferType,
        /// Payload size in bytes.
        size: usize,
        /// Slot capacity in bytes.
        capacity: usize,
    },

    /// The payload fits the slot but its size does not fit the descriptor's 32-bit size field.
    #[error("payload for {buffer_type} is too large for a buffer descriptor: {size} bytes")]
    PayloadTooLarge {
        /// Requested buffer type.
        buffer_type: BufferType,
        /// Payload size in bytes.
        size: usize,
    },

    /// The backend refused to take a slot back.
    #[error("failed to release buffer type {buffer_type}: {status}")]
    BufferRelease {
        /// Released buffer type.
        buffer_type: BufferType,
        /// Backend status code.
        status: Hresult,
    },

    /// The backend stayed busy for every allowed begin-frame attempt.
    #[error("failed to begin frame: decoder still busy after {attempts} attempts")]
    BeginBusy {
        /// Number of begin-frame calls made.
        attempts: u32,
    },

    /// Begin-frame reported a hard failure.
    #[error("failed to begin frame: {status}")]
    BeginFrame {
        /// Backend status code.
        status: Hresult,
    },

    /// Submitting the descriptor batch failed.
    #[error("failed to execute: {status}")]
    Submit {
        /// Backend status code.
        status: Hresult,
    },

    /// End-frame failed.
    #[error("failed to end frame: {status}")]
    EndFrame {
        /// Backend status code.
        status: Hresult,
    },

    /// Invalid configuration or input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Errors raised by codec callbacks or other collaborators.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HwDecodeError {
    /// Build a [`HwDecodeError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Name of the transaction phase this error belongs to, for log fields.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::BufferAcquire { .. }
            | Self::BufferTooSmall { .. }
            | Self::PayloadTooLarge { .. }
            | Self::BufferRelease { .. } => "commit",
            Self::BeginBusy { .. } | Self::BeginFrame { .. } => "begin",
            Self::Submit { .. } => "submit",
            Self::EndFrame { .. } => "end",
            Self::Validation(_) | Self::Other(_) => "other",
        }
    }

    /// Backend status code carried by this error, if any.
    pub fn status(&self) -> Option<Hresult> {
        match self {
            Self::BufferAcquire { status, .. }
            | Self::BufferRelease { status, .. }
            | Self::BeginFrame { status }
            | Self::Submit { status }
            | Self::EndFrame { status } => Some(*status),
            Self::BeginBusy { .. } => Some(Hresult::E_PENDING),
            Self::BufferTooSmall { .. }
            | Self::PayloadTooLarge { .. }
            | Self::Validation(_)
            | Self::Other(_) => None,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
