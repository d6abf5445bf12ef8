use crate::transport::TransportError;
use crate::{dsig, xml, xmlenc};

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of a client operation. None of them is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request fields were rejected locally and nothing was sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to sign request: {0}")]
    Signing(#[source] dsig::Error),

    /// The acquirer answered with an error envelope
    #[error("Acquirer error: {0}")]
    Acquirer(AcquirerError),

    /// The response signature did not verify against the pinned certificate
    #[error("Invalid response signature: {0}")]
    InvalidSignature(#[source] dsig::Error),

    /// The status response names another transaction than the one requested
    #[error("Transaction ID mismatch: expected {expected}, got {actual}")]
    TransactionIdMismatch { expected: String, actual: String },

    #[error("Invalid transaction status: {0}")]
    InvalidStatus(String),

    #[error("Failed to decrypt attributes: {0}")]
    Decryption(#[from] xmlenc::Error),

    /// A required element is missing from an otherwise valid response
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("XML error: {0}")]
    Xml(#[from] xml::Error),
}

/// An error reported by the acquirer in an `AcquirerErrorRes` envelope.
///
/// Only `consumer_message` may be shown to the consumer; the other fields
/// are meant for logs and support.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("{error_code}: {error_message} ({error_detail})")]
pub struct AcquirerError {
    pub error_code: String,
    pub error_message: String,
    pub error_detail: String,
    pub consumer_message: String,
}
