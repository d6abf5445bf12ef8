use std::fmt;
use std::sync::Arc;

use openssl::hash::MessageDigest;
use openssl::x509::X509;

use crate::crypto::errors::CryptoResult;
use crate::crypto::rsa::RsaPublicKey;

/// An X.509 certificate together with its DER encoding.
#[derive(Clone)]
pub struct Certificate {
    x509: X509,
    der: Arc<Vec<u8>>,
}

impl Certificate {
    /// Load a certificate from DER-encoded bytes
    pub fn from_der(der: impl AsRef<[u8]>) -> CryptoResult<Self> {
        let x509 = X509::from_der(der.as_ref())?;
        Ok(Self {
            x509,
            der: Arc::new(der.as_ref().to_vec()),
        })
    }

    /// Load the first certificate found in PEM-encoded bytes
    pub fn from_pem(pem: impl AsRef<[u8]>) -> CryptoResult<Self> {
        let x509 = X509::from_pem(pem.as_ref())?;
        let der = x509.to_der()?;
        Ok(Self {
            x509,
            der: Arc::new(der),
        })
    }

    /// The DER encoding of the certificate
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// PEM encoding of the certificate
    pub fn to_pem(&self) -> CryptoResult<Vec<u8>> {
        Ok(self.x509.to_pem()?)
    }

    /// Upper-case hex SHA-1 digest of the DER certificate.
    ///
    /// Acquirers identify the signing certificate by this value in
    /// `KeyInfo/KeyName`.
    pub fn thumbprint(&self) -> CryptoResult<String> {
        let digest = self.x509.digest(MessageDigest::sha1())?;
        Ok(hex::encode_upper(&*digest))
    }

    /// The RSA public key carried by the certificate
    pub fn public_key(&self) -> CryptoResult<RsaPublicKey> {
        RsaPublicKey::from_pkey(self.x509.public_key()?)
    }

    /// Subject DN in one-line form, for logging
    pub fn subject(&self) -> String {
        self.x509
            .subject_name()
            .entries()
            .filter_map(|entry| {
                let key = entry.object().nid().short_name().ok()?;
                let value = entry.data().as_utf8().ok()?;
                Some(format!("{key}={value}"))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject())
            .field("size", &self.der.len())
            .finish()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::HashAlg;
    use crate::crypto::cert_utils::generate_test_identity;

    #[test]
    fn test_thumbprint_is_upper_hex_sha1_of_der() {
        let (_, certificate) = generate_test_identity("Thumbprint Test").unwrap();
        let thumbprint = certificate.thumbprint().unwrap();

        let expected = hex::encode_upper(HashAlg::Sha1.hash(certificate.der()).unwrap());
        assert_eq!(thumbprint, expected);
        assert_eq!(thumbprint.len(), 40);
        assert!(!thumbprint.chars().any(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_pem_and_der_load_the_same_certificate() {
        let (_, certificate) = generate_test_identity("Roundtrip Test").unwrap();
        let pem = certificate.to_pem().unwrap();

        let from_pem = Certificate::from_pem(&pem).unwrap();
        let from_der = Certificate::from_der(certificate.der()).unwrap();
        assert_eq!(from_pem, from_der);
        assert!(from_pem.subject().contains("CN=Roundtrip Test"));
    }

    #[test]
    fn test_public_key_matches_private_key() {
        let (key, certificate) = generate_test_identity("Key Test").unwrap();
        assert_eq!(
            certificate.public_key().unwrap().to_der().unwrap(),
            key.public_key().unwrap().to_der().unwrap()
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Certificate::from_der(b"not a certificate").is_err());
        assert!(Certificate::from_pem(b"-----BEGIN CERTIFICATE-----\n").is_err());
    }
}
