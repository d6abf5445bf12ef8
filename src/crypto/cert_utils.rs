use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder};

use crate::crypto::Certificate;
use crate::crypto::errors::CryptoResult;
use crate::crypto::rsa::RsaPrivateKey;

/// Generate a self-signed 2048-bit RSA identity for tests and sandbox
/// setups. Returns the private key and its certificate, valid for a year.
pub fn generate_test_identity(common_name: &str) -> CryptoResult<(RsaPrivateKey, Certificate)> {
    let key_pair = PKey::from_rsa(Rsa::generate(2048)?)?;

    let mut cert_builder = X509Builder::new()?;
    cert_builder.set_version(2)?;
    let serial_number: Asn1Integer = generate_serial_number()?;
    cert_builder.set_serial_number(&serial_number)?;

    let subject_name = create_x509_name(&[
        ("C", "NL"),
        ("O", "Test Organization"),
        ("CN", common_name),
    ])?;
    cert_builder.set_subject_name(&subject_name)?;
    cert_builder.set_issuer_name(&subject_name)?;
    cert_builder.set_pubkey(&key_pair)?;

    let not_before: Asn1Time = Asn1Time::days_from_now(0)?;
    let not_after: Asn1Time = Asn1Time::days_from_now(365)?;
    cert_builder.set_not_before(&not_before)?;
    cert_builder.set_not_after(&not_after)?;

    cert_builder.append_extension(BasicConstraints::new().build()?)?;
    cert_builder.append_extension(
        KeyUsage::new()
            .critical()
            .digital_signature()
            .key_encipherment()
            .build()?,
    )?;
    cert_builder.sign(&key_pair, MessageDigest::sha256())?;

    let certificate = Certificate::from_der(cert_builder.build().to_der()?)?;
    let private_key = RsaPrivateKey::from_pem(key_pair.private_key_to_pem_pkcs8()?)?;

    Ok((private_key, certificate))
}

fn generate_serial_number() -> Result<Asn1Integer, ErrorStack> {
    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
    serial.to_asn1_integer()
}

fn create_x509_name(entries: &[(&str, &str)]) -> Result<X509Name, ErrorStack> {
    let mut name_builder = X509NameBuilder::new()?;
    for (key, value) in entries {
        name_builder.append_entry_by_text(key, value)?;
    }
    Ok(name_builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_test_identity() {
        let (key, certificate) = generate_test_identity("Test Merchant").unwrap();

        assert!(certificate.subject().contains("CN=Test Merchant"));
        assert_eq!(key.key_size().bits(), 2048);
        assert_eq!(
            certificate.public_key().unwrap().to_der().unwrap(),
            key.public_key().unwrap().to_der().unwrap()
        );
    }

    #[test]
    fn test_identities_are_distinct() {
        let (_, first) = generate_test_identity("Same Name").unwrap();
        let (_, second) = generate_test_identity("Same Name").unwrap();
        assert_ne!(first, second);
    }
}
