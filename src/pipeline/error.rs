//! Pipeline-specific error types.

use crate::pipeline::decoder::DecoderKind;
use thiserror::Error;

/// A payload could not be decoded.
///
/// Decoders never panic or propagate faults; they return this value and the
/// caller decides how to degrade. The `decoder` tag is always
/// [`DecoderKind::None`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DecodeError {
    pub message: String,
    pub decoder: DecoderKind,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            decoder: DecoderKind::None,
        }
    }
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
