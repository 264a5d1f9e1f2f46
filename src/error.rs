//! Crate-wide error type.
//!
//! Every failure mode named in the protocol design (transport, APDU status
//! words, secure-messaging integrity, and the individual authentication
//! protocols) gets its own variant so callers can match on *why* a session
//! failed rather than parsing a message string.

use thiserror::Error;

/// A 16-bit ISO/IEC 7816-4 status word (SW1 || SW2).
pub type StatusWord = u16;

/// Errors produced by the protocol core.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying `CardTransport` failed (I/O error reaching the chip).
    #[error("transport error: {0}")]
    Transport(String),

    /// A command expecting success got a status word other than `0x9000`.
    #[error("unexpected status word: {0:04X}")]
    Apdu(StatusWord),

    /// SELECT FILE / SELECT APPLET reported the file does not exist.
    #[error("file not found (SW {0:04X})")]
    FileNotFound(StatusWord),

    /// SELECT / READ reported a security condition was not satisfied.
    #[error("access denied (SW {0:04X})")]
    AccessDenied(StatusWord),

    /// A BER-TLV structure could not be parsed, or carried the wrong tag.
    #[error("malformed TLV: {0}")]
    MalformedTlv(String),

    /// A response APDU or secure-messaging envelope had an unexpected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Secure-messaging MAC verification failed. The channel is poisoned:
    /// any `SecureChannel` that returns this must not be used again.
    #[error("secure messaging MAC mismatch")]
    MacMismatch,

    /// BAC mutual authentication: the chip's response nonces did not match
    /// the ones sent, or the response MAC failed. No channel is created.
    #[error("BAC mutual authentication denied")]
    BacDenied,

    /// PACE failed at some step of the GENERAL AUTHENTICATE state machine.
    #[error("PACE failed: {reason}{}", .status_word.map(|sw| format!(" (SW {sw:04X})")).unwrap_or_default())]
    PaceFailed {
        /// Human-readable description of which step failed.
        reason: String,
        /// Status word returned by the chip, if the failure was APDU-level.
        status_word: Option<StatusWord>,
    },

    /// Chip Authentication or Terminal Authentication failed.
    #[error("EAC failed: {0}")]
    EacFailed(String),

    /// A cryptographic primitive could not be set up or computed: a bad key
    /// length, an unsupported curve, or a field/group arithmetic failure.
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// A named feature is recognized but not implemented (e.g. an OID this
    /// build has no mapping table entry for).
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    pub(crate) fn pace_failed(reason: impl Into<String>) -> Self {
        Error::PaceFailed {
            reason: reason.into(),
            status_word: None,
        }
    }

    pub(crate) fn pace_failed_sw(reason: impl Into<String>, sw: StatusWord) -> Self {
        Error::PaceFailed {
            reason: reason.into(),
            status_word: Some(sw),
        }
    }
}

/// Map a non-success status word from a generic command into the closest
/// domain error, per §4.5/§6 of the file-operation SW table. Commands with
/// more specific semantics (BAC, PACE) construct their own errors instead.
pub fn apdu_error(sw: StatusWord) -> Error {
    match sw {
        0x6A82 => Error::FileNotFound(sw),
        0x6982 | 0x6985 | 0x6986 => Error::AccessDenied(sw),
        _ => Error::Apdu(sw),
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
