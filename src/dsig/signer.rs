use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::instrument;

use crate::crypto::{Certificate, HashAlg, rsa, rsa::RsaPrivateKey};
use crate::dsig::{Result, Signer, algorithms, ns};
use crate::xml::{Element, c14n};

/// Key material used to sign outgoing messages
#[derive(Debug, Clone)]
pub struct SigningIdentity {
    /// Private key of the signer
    pub private_key: RsaPrivateKey,

    /// Certificate whose thumbprint is announced in `KeyInfo/KeyName`
    pub certificate: Certificate,
}

impl Signer for SigningIdentity {
    fn sign(&self, document: &Element) -> Result<String> {
        sign_enveloped(document, self)
    }
}

/// Sign a message with an enveloped signature over the whole document.
///
/// The `Signature` element is appended as the last child of the root and
/// the result is returned as a complete document with an XML declaration.
#[instrument(skip_all, fields(root = document.name()))]
pub fn sign_enveloped(document: &Element, identity: &SigningIdentity) -> Result<String> {
    let mut root = document.clone();

    let root_c14n = c14n::canonicalize(&root, &c14n::NamespaceScope::new(), &[]);
    let digest = HashAlg::Sha256.hash(root_c14n.as_bytes())?;
    let signed_info = signed_info(&BASE64.encode(digest));

    // SignedInfo is canonicalized as it appears inside Signature
    let mut scope = c14n::in_scope([&root]);
    scope.insert(String::new(), ns::DS.to_owned());
    let signed_info_c14n = c14n::canonicalize(&signed_info, &scope, &[]);

    let signature = rsa::sign(
        &identity.private_key,
        signed_info_c14n.as_bytes(),
        HashAlg::Sha256,
    )?;

    let mut signature_element = Element::new("Signature").with_attr("xmlns", ns::DS);
    signature_element.push(signed_info);
    signature_element.add_text_child("SignatureValue", BASE64.encode(signature.as_bytes()));
    signature_element
        .add_child("KeyInfo")
        .add_text_child("KeyName", identity.certificate.thumbprint()?);
    root.push(signature_element);

    Ok(root.to_document()?)
}

fn signed_info(digest_value: &str) -> Element {
    let mut signed_info = Element::new("SignedInfo");
    signed_info
        .add_child("CanonicalizationMethod")
        .set_attr("Algorithm", algorithms::EXCLUSIVE_C14N);
    signed_info
        .add_child("SignatureMethod")
        .set_attr("Algorithm", algorithms::RSA_SHA256);

    let reference = signed_info.add_child("Reference");
    reference.set_attr("URI", "");
    let transforms = reference.add_child("Transforms");
    transforms
        .add_child("Transform")
        .set_attr("Algorithm", algorithms::ENVELOPED_SIGNATURE);
    transforms
        .add_child("Transform")
        .set_attr("Algorithm", algorithms::EXCLUSIVE_C14N);
    reference
        .add_child("DigestMethod")
        .set_attr("Algorithm", algorithms::SHA256);
    reference.add_text_child("DigestValue", digest_value);

    signed_info
}
