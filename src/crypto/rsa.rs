use crate::crypto::HashAlg;
use crate::crypto::errors::{CryptoResult, Error};
use crate::crypto::keys::SecureBytes;
use openssl::encrypt::{Decrypter, Encrypter};
use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKey, Private, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{Signer, Verifier};
use std::fmt;

/// Smallest modulus accepted for signatures and key transport
const MIN_RSA_BITS: u32 = 1024;

/// Modulus size of an RSA key, as read from the key itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RsaKeySize(u32);

impl RsaKeySize {
    pub const RSA_2048: RsaKeySize = RsaKeySize(2048);
    pub const RSA_3072: RsaKeySize = RsaKeySize(3072);
    pub const RSA_4096: RsaKeySize = RsaKeySize(4096);

    /// Get the key size in bits
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for RsaKeySize {
    type Error = Error;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        if bits < MIN_RSA_BITS {
            return Err(Error::UnsupportedKey(format!("{bits}-bit RSA key")));
        }
        Ok(Self(bits))
    }
}

/// Padding scheme for RSA key transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaPadding {
    /// RSAES-PKCS1-v1_5
    Pkcs1,
    /// RSAES-OAEP with the given label digest and MGF1 digest
    Oaep { digest: HashAlg, mgf1_digest: HashAlg },
}

/// Represents an RSA signature
#[derive(Clone)]
pub struct RsaSignature {
    key_size: RsaKeySize,
    data: Vec<u8>,
}

impl RsaSignature {
    /// Create a new RSA signature
    pub fn new(key_size: RsaKeySize, data: impl Into<Vec<u8>>) -> Self {
        Self {
            key_size,
            data: data.into(),
        }
    }

    /// Get the key size used for this signature
    pub fn key_size(&self) -> RsaKeySize {
        self.key_size
    }

    /// Get the signature data as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the signature length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if signature is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for RsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSignature")
            .field("key_size", &self.key_size)
            .field("size", &self.len())
            .field("hex", &hex::encode(&self.data))
            .finish()
    }
}

/// RSA private key wrapper
#[derive(Debug, Clone)]
pub struct RsaPrivateKey {
    key: PKey<Private>,
    key_size: RsaKeySize,
}

impl RsaPrivateKey {
    /// Generate a new RSA private key
    pub fn generate(key_size: RsaKeySize) -> CryptoResult<Self> {
        let rsa = Rsa::generate(key_size.bits())?;
        let key = PKey::from_rsa(rsa)?;

        Ok(Self { key, key_size })
    }

    /// Load from PEM-encoded PKCS#1/PKCS#8.
    pub fn from_pem(pem_bytes: impl AsRef<[u8]>) -> CryptoResult<Self> {
        let key = PKey::private_key_from_pem(pem_bytes.as_ref())?;
        Self::from_pkey(key)
    }

    /// Load from an encrypted PEM-encoded PKCS#8 key.
    pub fn from_pem_with_passphrase(
        pem_bytes: impl AsRef<[u8]>,
        passphrase: impl AsRef<[u8]>,
    ) -> CryptoResult<Self> {
        let key = PKey::private_key_from_pem_passphrase(pem_bytes.as_ref(), passphrase.as_ref())?;
        Self::from_pkey(key)
    }

    fn from_pkey(key: PKey<Private>) -> CryptoResult<Self> {
        if key.id() != Id::RSA {
            return Err(Error::UnsupportedKey(format!("key type {}", key.id().as_raw())));
        }
        let key_size = RsaKeySize::try_from(key.bits())?;
        Ok(Self { key, key_size })
    }

    /// Serialize as PEM-encoded PKCS#8.
    pub fn to_pem(&self) -> CryptoResult<String> {
        let pem_bytes = self.key.private_key_to_pem_pkcs8()?;
        Ok(String::from_utf8_lossy(&pem_bytes).to_string())
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> CryptoResult<RsaPublicKey> {
        let pub_key = PKey::public_key_from_der(&self.key.public_key_to_der()?)?;

        Ok(RsaPublicKey {
            key: pub_key,
            key_size: self.key_size,
        })
    }

    /// Get the key size
    pub fn key_size(&self) -> RsaKeySize {
        self.key_size
    }

    /// Get the underlying OpenSSL private key
    pub(crate) fn pkey(&self) -> &PKey<Private> {
        &self.key
    }
}

/// RSA public key wrapper
#[derive(Debug, Clone)]
pub struct RsaPublicKey {
    key: PKey<Public>,
    key_size: RsaKeySize,
}

impl RsaPublicKey {
    pub(crate) fn from_pkey(key: PKey<Public>) -> CryptoResult<Self> {
        if key.id() != Id::RSA {
            return Err(Error::UnsupportedKey(format!("key type {}", key.id().as_raw())));
        }
        let key_size = RsaKeySize::try_from(key.bits())?;
        Ok(Self { key, key_size })
    }

    /// Export key in SubjectPublicKeyInfo DER format
    pub fn to_der(&self) -> CryptoResult<Vec<u8>> {
        Ok(self.key.public_key_to_der()?)
    }

    /// Get the key size
    pub fn key_size(&self) -> RsaKeySize {
        self.key_size
    }
}

/// Sign data with RSASSA-PKCS1-v1_5 using the given digest
pub fn sign(
    private_key: &RsaPrivateKey,
    data: impl AsRef<[u8]>,
    hash_alg: HashAlg,
) -> CryptoResult<RsaSignature> {
    let mut signer = Signer::new(MessageDigest::from(&hash_alg), private_key.pkey())?;
    signer.update(data.as_ref())?;
    let signature_data = signer.sign_to_vec()?;

    Ok(RsaSignature::new(private_key.key_size(), signature_data))
}

/// Verify an RSASSA-PKCS1-v1_5 signature
pub fn verify(
    public_key: &RsaPublicKey,
    data: impl AsRef<[u8]>,
    signature: &RsaSignature,
    hash_alg: HashAlg,
) -> CryptoResult<bool> {
    if public_key.key_size() != signature.key_size() {
        return Err(Error::Invalid(
            "Signature key size does not match key size".to_string(),
        ));
    }

    let mut verifier = Verifier::new(MessageDigest::from(&hash_alg), &public_key.key)?;
    verifier.update(data.as_ref())?;
    Ok(verifier.verify(signature.as_bytes())?)
}

/// Decrypt a transported key with the RSA private key
pub fn decrypt(
    private_key: &RsaPrivateKey,
    ciphertext: impl AsRef<[u8]>,
    padding: RsaPadding,
) -> CryptoResult<SecureBytes> {
    let ciphertext = ciphertext.as_ref();
    let mut decrypter = Decrypter::new(private_key.pkey())?;
    match padding {
        RsaPadding::Pkcs1 => decrypter.set_rsa_padding(Padding::PKCS1)?,
        RsaPadding::Oaep {
            digest,
            mgf1_digest,
        } => {
            decrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
            decrypter.set_rsa_oaep_md(MessageDigest::from(&digest))?;
            decrypter.set_rsa_mgf1_md(MessageDigest::from(&mgf1_digest))?;
        }
    }

    let mut plaintext = vec![0u8; decrypter.decrypt_len(ciphertext)?];
    let len = decrypter.decrypt(ciphertext, &mut plaintext)?;
    plaintext.truncate(len);
    Ok(SecureBytes::new(plaintext))
}

/// Encrypt a key for transport to the holder of the RSA public key
pub fn encrypt(
    public_key: &RsaPublicKey,
    plaintext: impl AsRef<[u8]>,
    padding: RsaPadding,
) -> CryptoResult<Vec<u8>> {
    let plaintext = plaintext.as_ref();
    let mut encrypter = Encrypter::new(&public_key.key)?;
    match padding {
        RsaPadding::Pkcs1 => encrypter.set_rsa_padding(Padding::PKCS1)?,
        RsaPadding::Oaep {
            digest,
            mgf1_digest,
        } => {
            encrypter.set_rsa_padding(Padding::PKCS1_OAEP)?;
            encrypter.set_rsa_oaep_md(MessageDigest::from(&digest))?;
            encrypter.set_rsa_mgf1_md(MessageDigest::from(&mgf1_digest))?;
        }
    }

    let mut ciphertext = vec![0u8; encrypter.encrypt_len(plaintext)?];
    let len = encrypter.encrypt(plaintext, &mut ciphertext)?;
    ciphertext.truncate(len);
    Ok(ciphertext)
}
