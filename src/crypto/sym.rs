use crate::crypto::SecureBytes;
use crate::crypto::errors::{CryptoResult, Error};
use openssl::rand::rand_bytes;
use openssl::symm::{Cipher as OpenSslCipher, Crypter, Mode, decrypt_aead, encrypt_aead};

const AES_BLOCK_SIZE: usize = 16;
const GCM_IV_SIZE: usize = 12;
const GCM_TAG_SIZE: usize = 16;

/// Block ciphers used for XML Encryption content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
}

impl Cipher {
    /// Get the key size of the cipher in bytes
    pub const fn key_size(self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes128Gcm => 16,
            Self::Aes192Cbc | Self::Aes192Gcm => 24,
            Self::Aes256Cbc | Self::Aes256Gcm => 32,
        }
    }

    /// Size of the IV that prefixes every ciphertext
    pub const fn iv_size(self) -> usize {
        if self.is_aead() {
            GCM_IV_SIZE
        } else {
            AES_BLOCK_SIZE
        }
    }

    /// Whether the cipher is an authenticated (GCM) mode
    pub const fn is_aead(self) -> bool {
        matches!(self, Self::Aes128Gcm | Self::Aes192Gcm | Self::Aes256Gcm)
    }

    fn to_openssl_cipher(self) -> OpenSslCipher {
        match self {
            Self::Aes128Cbc => OpenSslCipher::aes_128_cbc(),
            Self::Aes192Cbc => OpenSslCipher::aes_192_cbc(),
            Self::Aes256Cbc => OpenSslCipher::aes_256_cbc(),
            Self::Aes128Gcm => OpenSslCipher::aes_128_gcm(),
            Self::Aes192Gcm => OpenSslCipher::aes_192_gcm(),
            Self::Aes256Gcm => OpenSslCipher::aes_256_gcm(),
        }
    }
}

/// Decrypt an XML Encryption cipher value.
///
/// `data` is the raw (base64-decoded) cipher value: the IV, the ciphertext and,
/// for GCM, the trailing 16-byte authentication tag. CBC plaintext is unpadded
/// with the W3C scheme where the final byte holds the padding length.
pub fn decrypt(cipher: Cipher, key: &SecureBytes, data: &[u8]) -> CryptoResult<Vec<u8>> {
    check_key(cipher, key)?;
    let iv_size = cipher.iv_size();

    if cipher.is_aead() {
        if data.len() < iv_size + GCM_TAG_SIZE {
            return Err(Error::Invalid("cipher value too short".into()));
        }
        let (iv, rest) = data.split_at(iv_size);
        let (ciphertext, tag) = rest.split_at(rest.len() - GCM_TAG_SIZE);
        return Ok(decrypt_aead(
            cipher.to_openssl_cipher(),
            key.expose_secret(),
            Some(iv),
            &[],
            ciphertext,
            tag,
        )?);
    }

    if data.len() < iv_size + AES_BLOCK_SIZE || (data.len() - iv_size) % AES_BLOCK_SIZE != 0 {
        return Err(Error::Invalid(
            "cipher value is not a whole number of blocks".into(),
        ));
    }
    let (iv, ciphertext) = data.split_at(iv_size);

    let mut decrypter = Crypter::new(
        cipher.to_openssl_cipher(),
        Mode::Decrypt,
        key.expose_secret(),
        Some(iv),
    )?;
    decrypter.pad(false);

    let mut plaintext = vec![0u8; ciphertext.len() + AES_BLOCK_SIZE];
    let mut count = decrypter.update(ciphertext, &mut plaintext)?;
    count += decrypter.finalize(&mut plaintext[count..])?;
    plaintext.truncate(count);

    xmlenc_unpad(plaintext)
}

/// Encrypt data into an XML Encryption cipher value (IV-prefixed).
pub fn encrypt(cipher: Cipher, key: &SecureBytes, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    check_key(cipher, key)?;
    let mut iv = vec![0u8; cipher.iv_size()];
    rand_bytes(&mut iv)?;

    if cipher.is_aead() {
        let mut tag = [0u8; GCM_TAG_SIZE];
        let ciphertext = encrypt_aead(
            cipher.to_openssl_cipher(),
            key.expose_secret(),
            Some(&iv),
            &[],
            plaintext,
            &mut tag,
        )?;
        iv.extend_from_slice(&ciphertext);
        iv.extend_from_slice(&tag);
        return Ok(iv);
    }

    let pad_len = AES_BLOCK_SIZE - plaintext.len() % AES_BLOCK_SIZE;
    let mut padded = plaintext.to_vec();
    padded.resize(plaintext.len() + pad_len - 1, 0);
    padded.push(pad_len as u8);

    let mut encrypter = Crypter::new(
        cipher.to_openssl_cipher(),
        Mode::Encrypt,
        key.expose_secret(),
        Some(&iv),
    )?;
    encrypter.pad(false);

    let mut ciphertext = vec![0u8; padded.len() + AES_BLOCK_SIZE];
    let mut count = encrypter.update(&padded, &mut ciphertext)?;
    count += encrypter.finalize(&mut ciphertext[count..])?;
    ciphertext.truncate(count);

    iv.extend_from_slice(&ciphertext);
    Ok(iv)
}

/// Generate a random content-encryption key for the cipher
pub fn generate_key(cipher: Cipher) -> CryptoResult<SecureBytes> {
    let mut key = vec![0u8; cipher.key_size()];
    rand_bytes(&mut key)?;
    Ok(SecureBytes::new(key))
}

fn check_key(cipher: Cipher, key: &SecureBytes) -> CryptoResult<()> {
    if key.len() != cipher.key_size() {
        return Err(Error::Invalid(format!(
            "wrong key size for {cipher:?}: {} bytes",
            key.len()
        )));
    }
    Ok(())
}

fn xmlenc_unpad(mut plaintext: Vec<u8>) -> CryptoResult<Vec<u8>> {
    let pad_len = match plaintext.last() {
        Some(&n) if n >= 1 && (n as usize) <= AES_BLOCK_SIZE && (n as usize) <= plaintext.len() => {
            n as usize
        }
        _ => return Err(Error::Invalid("invalid block padding".into())),
    };
    plaintext.truncate(plaintext.len() - pad_len);
    Ok(plaintext)
}
