//! Error types for the protocol layer.
//!
//! When you see a `ProtocolError`, the problem is in turning bytes into
//! messages (or back), never in networking or match rules.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing field, or an
    /// unknown `"type"` tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but breaks protocol rules, e.g. a first
    /// message that is not a handshake, or a version mismatch.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
