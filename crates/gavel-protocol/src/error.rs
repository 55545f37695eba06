//! Errors raised while encoding, decoding, or validating wire messages.
//!
//! Every crate in the workspace has its own error enum. A `ProtocolError`
//! always means the bytes or their shape were wrong: the socket itself and
//! the auction rules are someone else's concern.

/// Errors from the protocol layer.
///
/// After the handshake, a frame that fails to decode is answered with a
/// `Validation` error event and the connection keeps reading. A bad
/// handshake frame is answered the same way and then the connection is
/// closed.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    ///
    /// Every outbound type is plain data with string keys, so this only
    /// shows up if a new message type is added with a map keyed by
    /// something JSON cannot represent.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Bytes did not parse into the expected message.
    ///
    /// Usual causes are malformed JSON, an unknown `type` tag, a missing
    /// required field, or an amount sent as a string instead of a number.
    /// The inner error carries the line and column from `serde_json`.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// Parsed fine but breaks a protocol rule, e.g. a client handshake
    /// announcing a version this server does not speak.
    ///
    /// Also used for catalog entries whose values are well-formed JSON but
    /// not usable, such as a negative or zero base price.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
