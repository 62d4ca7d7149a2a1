use thiserror::Error;

use crate::backends::BackendKind;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced by the CTR engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Advancing the counter would carry into the nonce bytes.
    /// Fatal for the stream: the caller has to rekey or pick a new nonce.
    #[error("counter overflow: block index would carry into the nonce")]
    Overflow,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The physical input ran out before `requested` bytes were decrypted.
    #[error("short read: {read} of {requested} bytes available")]
    ShortRead { requested: usize, read: usize },

    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        backend: BackendKind,
        reason: &'static str,
    },

    #[error("device error: {0}")]
    Device(String),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            Error::Overflow.to_string(),
            "counter overflow: block index would carry into the nonce"
        );
        assert_eq!(
            Error::ShortRead { requested: 32, read: 5 }.to_string(),
            "short read: 5 of 32 bytes available"
        );
        assert_eq!(
            Error::BackendUnavailable {
                backend: BackendKind::Vector,
                reason: "no AES instructions",
            }
            .to_string(),
            "vector backend unavailable: no AES instructions"
        );
    }
}
