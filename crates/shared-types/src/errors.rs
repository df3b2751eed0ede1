//! # Codec Errors
//!
//! Errors from encoding/decoding wire envelopes.

use thiserror::Error;

/// Errors from the envelope codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The envelope named a kind this build does not know.
    ///
    /// Receivers log and drop these rather than crash, so rolling
    /// deployments with new event kinds stay safe.
    #[error("unknown event kind: {0}")]
    UnknownKind(String),

    /// The bytes were not a valid envelope for the claimed kind.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}
