use tracing::{debug, instrument, warn};

use crate::crypto::{
    Certificate, HashAlg, decode_base64,
    rsa::{self, RsaSignature},
};
use crate::dsig::{Error, Result, SignatureVerifier, algorithms};
use crate::xml::{Element, c14n};

impl SignatureVerifier for Certificate {
    fn verify(&self, document: &Element) -> Result<Element> {
        verify_enveloped(document, self)
    }
}

/// Verify the enveloped signature of a parsed message against the pinned
/// certificate.
///
/// Exactly one reference is accepted and it must cover the document root,
/// either through an empty URI or through the root's `Id`. On success the
/// root is returned with its `Signature` element removed.
#[instrument(skip_all, fields(root = document.name()))]
pub fn verify_enveloped(document: &Element, certificate: &Certificate) -> Result<Element> {
    let signatures: Vec<&Element> = document
        .child_elements()
        .filter(|e| e.local_name() == "Signature")
        .collect();
    let signature = match signatures.as_slice() {
        [signature] => *signature,
        [] => return Err(Error::MissingSignature),
        _ => return Err(Error::Invalid("more than one Signature element".into())),
    };
    let signed_info = signature
        .find("SignedInfo")
        .ok_or(Error::MissingElement("SignedInfo"))?;

    check_key_name(signature, certificate)?;

    let mut stripped = document.clone();
    stripped.remove_children("Signature");

    let references = signed_info.find_all("Reference");
    let [reference] = references.as_slice() else {
        return Err(Error::Invalid(format!(
            "expected exactly one Reference, found {}",
            references.len()
        )));
    };
    verify_reference(reference, &stripped)?;

    let canonicalization = signed_info
        .find("CanonicalizationMethod")
        .ok_or(Error::MissingElement("CanonicalizationMethod"))?;
    let c14n_algorithm = algorithm(canonicalization)?;
    if c14n_algorithm != algorithms::EXCLUSIVE_C14N {
        return Err(Error::UnsupportedAlgorithm(c14n_algorithm.to_owned()));
    }
    let prefixes = inclusive_prefixes(canonicalization);
    let inclusive: Vec<&str> = prefixes.split_whitespace().collect();
    let scope = c14n::in_scope([document, signature]);
    let signed_info_c14n = c14n::canonicalize(signed_info, &scope, &inclusive);

    let signature_method = signed_info
        .find("SignatureMethod")
        .ok_or(Error::MissingElement("SignatureMethod"))?;
    let hash_alg = match algorithm(signature_method)? {
        algorithms::RSA_SHA1 => HashAlg::Sha1,
        algorithms::RSA_SHA256 => HashAlg::Sha256,
        algorithms::RSA_SHA512 => HashAlg::Sha512,
        other => return Err(Error::UnsupportedAlgorithm(other.to_owned())),
    };

    let signature_value = signature
        .find("SignatureValue")
        .ok_or(Error::MissingElement("SignatureValue"))?;
    let signature_bytes = decode_base64(&signature_value.text())?;

    let public_key = certificate.public_key()?;
    let rsa_signature = RsaSignature::new(public_key.key_size(), signature_bytes);
    if !rsa::verify(&public_key, signed_info_c14n.as_bytes(), &rsa_signature, hash_alg)? {
        return Err(Error::SignatureMismatch);
    }

    debug!(%hash_alg, "Signature verified");
    Ok(stripped)
}

/// Check the digest of the single reference against the document without
/// its signature
fn verify_reference(reference: &Element, stripped: &Element) -> Result<()> {
    let uri = reference.attr("URI").unwrap_or("");
    if !uri.is_empty() {
        let id = uri
            .strip_prefix('#')
            .ok_or_else(|| Error::Invalid(format!("unsupported reference URI: {uri}")))?;
        let root_id = ["Id", "ID", "id"]
            .iter()
            .find_map(|name| stripped.attr(name));
        if root_id != Some(id) {
            return Err(Error::Invalid(format!(
                "reference {uri} does not cover the document root"
            )));
        }
    }

    let mut prefixes = String::new();
    for transform in reference.find_all("Transforms/Transform") {
        match algorithm(transform)? {
            // The Signature element is already detached
            algorithms::ENVELOPED_SIGNATURE => {}
            algorithms::EXCLUSIVE_C14N => prefixes = inclusive_prefixes(transform),
            other => return Err(Error::UnsupportedAlgorithm(other.to_owned())),
        }
    }
    let inclusive: Vec<&str> = prefixes.split_whitespace().collect();
    let canonical = c14n::canonicalize(stripped, &c14n::NamespaceScope::new(), &inclusive);

    let digest_method = reference
        .find("DigestMethod")
        .ok_or(Error::MissingElement("DigestMethod"))?;
    let hash_alg = match algorithm(digest_method)? {
        algorithms::SHA1 => HashAlg::Sha1,
        algorithms::SHA256 => HashAlg::Sha256,
        algorithms::SHA512 => HashAlg::Sha512,
        other => return Err(Error::UnsupportedAlgorithm(other.to_owned())),
    };

    let digest_value = reference
        .find("DigestValue")
        .ok_or(Error::MissingElement("DigestValue"))?;
    let expected = decode_base64(&digest_value.text())?;
    let computed = hash_alg.hash(canonical.as_bytes())?;

    if computed != expected {
        return Err(Error::DigestMismatch);
    }
    Ok(())
}

/// A `KeyName` naming another certificate is not fatal since the
/// certificate used for verification is pinned
fn check_key_name(signature: &Element, certificate: &Certificate) -> Result<()> {
    if let Some(key_name) = signature.find_text("KeyInfo/KeyName") {
        let thumbprint = certificate.thumbprint()?;
        if !key_name.trim().eq_ignore_ascii_case(&thumbprint) {
            warn!(
                key_name = key_name.trim(),
                %thumbprint,
                "KeyName does not match the pinned certificate"
            );
        }
    }
    Ok(())
}

fn algorithm(element: &Element) -> Result<&str> {
    element
        .attr("Algorithm")
        .ok_or_else(|| Error::Invalid(format!("{} has no Algorithm", element.local_name())))
}

fn inclusive_prefixes(element: &Element) -> String {
    element
        .find("InclusiveNamespaces")
        .and_then(|e| e.attr("PrefixList"))
        .unwrap_or_default()
        .to_owned()
}
