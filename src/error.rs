//! Crate-wide error types.
//!
//! Most failure modes in this crate are *silent* by spec (a dropped
//! datagram, a malformed CSI sequence) and are logged at `debug`/`trace`
//! rather than surfaced as `Err`. The few failures that must be surfaced to
//! a caller — an invalid session key, a bootstrap parse failure or timeout —
//! get a small hand-written error enum in the style of `ChannelError`
//! (`channel/mod.rs`): a `Display` impl and a blanket `std::error::Error`
//! impl, no `thiserror`.

use std::fmt;

/// Failure constructing or using an OCB3 session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The session key was not exactly 16 bytes.
    InvalidKeyLength(usize),
    /// Tag verification failed on decrypt; plaintext is discarded.
    AuthenticationFailed,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKeyLength(len) => {
                write!(f, "OCB3 key must be 16 bytes, got {len}")
            }
            Self::AuthenticationFailed => write!(f, "authentication failure"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Failure parsing the out-of-band SSH bootstrap output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// No `MOSH CONNECT` line was present in the scanned output.
    NoConnectLine,
    /// The `MOSH CONNECT` line did not have exactly four tokens.
    MalformedConnectLine(String),
    /// The port token did not parse as a `u16`.
    InvalidPort(String),
    /// The base64 key did not decode to exactly 16 bytes.
    InvalidKey(String),
    /// The bootstrap channel did not produce a connect line within the
    /// allotted deadline.
    Timeout,
}

impl fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoConnectLine => write!(f, "no MOSH CONNECT line found in bootstrap output"),
            Self::MalformedConnectLine(line) => {
                write!(f, "malformed MOSH CONNECT line: {line:?}")
            }
            Self::InvalidPort(tok) => write!(f, "invalid port token: {tok:?}"),
            Self::InvalidKey(tok) => write!(f, "invalid base64 session key: {tok:?}"),
            Self::Timeout => write!(f, "bootstrap channel timed out before connecting"),
        }
    }
}

impl std::error::Error for BootstrapError {}
