#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML error: {0}")]
    Xml(#[from] crate::xml::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Document carries no Signature element")]
    MissingSignature,

    #[error("Signature is missing the {0} element")]
    MissingElement(&'static str),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Digest of the signed document does not match")]
    DigestMismatch,

    #[error("Signature value does not verify against the certificate")]
    SignatureMismatch,

    #[error("Invalid signature: {0}")]
    Invalid(String),
}
