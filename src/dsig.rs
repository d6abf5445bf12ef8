//! Enveloped XML-DSig over whole acquirer messages.

mod error;
mod signer;
mod verifier;

use std::fmt;

use crate::xml::Element;

pub use error::Error;
pub use signer::{SigningIdentity, sign_enveloped};
pub use verifier::verify_enveloped;

pub type Result<T> = std::result::Result<T, Error>;

/// Produces the signed document sent for an outgoing message
pub trait Signer: Send + Sync + fmt::Debug {
    fn sign(&self, document: &Element) -> Result<String>;
}

/// Checks the signature of a parsed response.
///
/// Returns the document without its `Signature` element.
pub trait SignatureVerifier: Send + Sync + fmt::Debug {
    fn verify(&self, document: &Element) -> Result<Element>;
}

pub mod algorithms {
    // Digest algorithms
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

    // Signature algorithms
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

    // Canonicalization algorithms
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

    // Transform algorithms
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
}

pub mod ns {
    pub const DS: &str = "http://www.w3.org/2000/09/xmldsig#";
}
