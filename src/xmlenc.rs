//! Decryption of the XML Encryption `EncryptedAttribute` elements carried in
//! identity assertions.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, instrument};

use crate::crypto::{
    HashAlg, SecureBytes, decode_base64,
    rsa::{self, RsaPadding, RsaPrivateKey},
    sym::{self, Cipher},
};
use crate::xml::Element;

pub type Result<T> = std::result::Result<T, Error>;

pub mod algorithms {
    // Key transport
    pub const RSA_1_5: &str = "http://www.w3.org/2001/04/xmlenc#rsa-1_5";
    pub const RSA_OAEP_MGF1P: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";
    pub const RSA_OAEP: &str = "http://www.w3.org/2009/xmlenc11#rsa-oaep";

    // Block encryption
    pub const AES128_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes128-cbc";
    pub const AES192_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes192-cbc";
    pub const AES256_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes256-cbc";
    pub const AES128_GCM: &str = "http://www.w3.org/2009/xmlenc11#aes128-gcm";
    pub const AES192_GCM: &str = "http://www.w3.org/2009/xmlenc11#aes192-gcm";
    pub const AES256_GCM: &str = "http://www.w3.org/2009/xmlenc11#aes256-gcm";

    // OAEP digests
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    pub const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
    pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

    // OAEP mask generation
    pub const MGF1_SHA1: &str = "http://www.w3.org/2009/xmlenc11#mgf1sha1";
    pub const MGF1_SHA256: &str = "http://www.w3.org/2009/xmlenc11#mgf1sha256";
    pub const MGF1_SHA384: &str = "http://www.w3.org/2009/xmlenc11#mgf1sha384";
    pub const MGF1_SHA512: &str = "http://www.w3.org/2009/xmlenc11#mgf1sha512";

    // EncryptedData types
    pub const TYPE_ELEMENT: &str = "http://www.w3.org/2001/04/xmlenc#Element";
    pub const TYPE_CONTENT: &str = "http://www.w3.org/2001/04/xmlenc#Content";
}

pub mod ns {
    pub const XENC: &str = "http://www.w3.org/2001/04/xmlenc#";
    pub const XENC11: &str = "http://www.w3.org/2009/xmlenc11#";
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML error: {0}")]
    Xml(#[from] crate::xml::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Decrypted data is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Encrypted structure is missing the {0} element")]
    MissingElement(&'static str),

    #[error("Unsupported encryption algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid encrypted attribute: {0}")]
    Invalid(String),
}

/// Turns the attribute statement of a successful identification into
/// attribute values
pub trait AttributeDecryptor: Send + Sync + fmt::Debug {
    fn decrypt_attributes(&self, statement: &Element) -> Result<HashMap<String, String>>;
}

impl AttributeDecryptor for RsaPrivateKey {
    fn decrypt_attributes(&self, statement: &Element) -> Result<HashMap<String, String>> {
        decrypt_attributes(statement, self)
    }
}

/// Decrypt every `EncryptedAttribute` below `statement` into a map from
/// attribute name to its first value.
///
/// A single failure fails the whole set.
#[instrument(skip_all)]
pub fn decrypt_attributes(
    statement: &Element,
    private_key: &RsaPrivateKey,
) -> Result<HashMap<String, String>> {
    let mut attributes = HashMap::new();
    for encrypted in statement.find_all("EncryptedAttribute") {
        let (name, value) = decrypt_attribute(encrypted, private_key)?;
        debug!(attribute = %name, "Decrypted attribute");
        attributes.insert(name, value);
    }
    Ok(attributes)
}

/// Decrypt one `EncryptedAttribute` into its name and first value.
///
/// The `EncryptedKey` is looked up inside `EncryptedData/KeyInfo` first and
/// then next to the `EncryptedData`.
pub fn decrypt_attribute(
    encrypted: &Element,
    private_key: &RsaPrivateKey,
) -> Result<(String, String)> {
    let data = encrypted
        .find("EncryptedData")
        .ok_or(Error::MissingElement("EncryptedData"))?;
    let encrypted_key = data
        .find("KeyInfo/EncryptedKey")
        .or_else(|| encrypted.find("EncryptedKey"))
        .ok_or(Error::MissingElement("EncryptedKey"))?;

    let fragment = decrypt_data(data, encrypted_key, private_key)?;
    let attribute = if fragment.local_name() == "Attribute" {
        &fragment
    } else {
        fragment
            .find("Attribute")
            .ok_or(Error::MissingElement("Attribute"))?
    };

    let name = attribute
        .attr("Name")
        .ok_or_else(|| Error::Invalid("Attribute has no Name".into()))?;
    let value = attribute
        .find("AttributeValue")
        .ok_or(Error::MissingElement("AttributeValue"))?;

    Ok((name.to_owned(), value.text()))
}

/// Decrypt an `EncryptedData` element with the content key carried by
/// `encrypted_key` and parse the plaintext.
///
/// `Content`-typed data is returned wrapped in a `DecryptedContent` element.
pub fn decrypt_data(
    data: &Element,
    encrypted_key: &Element,
    private_key: &RsaPrivateKey,
) -> Result<Element> {
    let method = data
        .find("EncryptionMethod")
        .ok_or(Error::MissingElement("EncryptionMethod"))?;
    let cipher = match algorithm(method)? {
        algorithms::AES128_CBC => Cipher::Aes128Cbc,
        algorithms::AES192_CBC => Cipher::Aes192Cbc,
        algorithms::AES256_CBC => Cipher::Aes256Cbc,
        algorithms::AES128_GCM => Cipher::Aes128Gcm,
        algorithms::AES192_GCM => Cipher::Aes192Gcm,
        algorithms::AES256_GCM => Cipher::Aes256Gcm,
        other => return Err(Error::UnsupportedAlgorithm(other.to_owned())),
    };

    let key = decrypt_key(encrypted_key, private_key)?;
    let cipher_value = cipher_value(data)?;
    let plaintext = sym::decrypt(cipher, &key, &cipher_value)?;
    let xml = std::str::from_utf8(&plaintext)?;

    let element = match data.attr("Type") {
        Some(algorithms::TYPE_CONTENT) => {
            Element::parse(&format!("<DecryptedContent>{xml}</DecryptedContent>"))?
        }
        _ => Element::parse(xml)?,
    };
    Ok(element)
}

/// Unwrap the content-encryption key of an `EncryptedKey`
fn decrypt_key(encrypted_key: &Element, private_key: &RsaPrivateKey) -> Result<SecureBytes> {
    let method = encrypted_key
        .find("EncryptionMethod")
        .ok_or(Error::MissingElement("EncryptionMethod"))?;
    let padding = match algorithm(method)? {
        algorithms::RSA_1_5 => RsaPadding::Pkcs1,
        algorithms::RSA_OAEP_MGF1P => RsaPadding::Oaep {
            digest: oaep_digest(method)?,
            mgf1_digest: HashAlg::Sha1,
        },
        algorithms::RSA_OAEP => RsaPadding::Oaep {
            digest: oaep_digest(method)?,
            mgf1_digest: mgf1_digest(method)?,
        },
        other => return Err(Error::UnsupportedAlgorithm(other.to_owned())),
    };

    let cipher_value = cipher_value(encrypted_key)?;
    Ok(rsa::decrypt(private_key, cipher_value, padding)?)
}

fn oaep_digest(method: &Element) -> Result<HashAlg> {
    let Some(digest_method) = method.find("DigestMethod") else {
        return Ok(HashAlg::Sha1);
    };
    match algorithm(digest_method)? {
        algorithms::SHA1 => Ok(HashAlg::Sha1),
        algorithms::SHA256 => Ok(HashAlg::Sha256),
        algorithms::SHA384 => Ok(HashAlg::Sha384),
        algorithms::SHA512 => Ok(HashAlg::Sha512),
        other => Err(Error::UnsupportedAlgorithm(other.to_owned())),
    }
}

fn mgf1_digest(method: &Element) -> Result<HashAlg> {
    let Some(mgf) = method.find("MGF") else {
        return Ok(HashAlg::Sha1);
    };
    match algorithm(mgf)? {
        algorithms::MGF1_SHA1 => Ok(HashAlg::Sha1),
        algorithms::MGF1_SHA256 => Ok(HashAlg::Sha256),
        algorithms::MGF1_SHA384 => Ok(HashAlg::Sha384),
        algorithms::MGF1_SHA512 => Ok(HashAlg::Sha512),
        other => Err(Error::UnsupportedAlgorithm(other.to_owned())),
    }
}

fn cipher_value(element: &Element) -> Result<Vec<u8>> {
    let value = element
        .find("CipherData/CipherValue")
        .ok_or(Error::MissingElement("CipherValue"))?;
    Ok(decode_base64(&value.text())?)
}

fn algorithm(element: &Element) -> Result<&str> {
    element
        .attr("Algorithm")
        .ok_or_else(|| Error::Invalid(format!("{} has no Algorithm", element.local_name())))
}

#[cfg(test)]
mod tests {
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

    use super::*;
    use crate::crypto::cert_utils::generate_test_identity;
    use crate::crypto::rsa::RsaPublicKey;

    const SAML: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

    fn attribute_xml(name: &str, value: &str) -> String {
        format!(
            r#"<saml:Attribute xmlns:saml="{SAML}" Name="{name}"><saml:AttributeValue>{value}</saml:AttributeValue><saml:AttributeValue>ignored</saml:AttributeValue></saml:Attribute>"#
        )
    }

    fn encrypted_key(recipient: &RsaPublicKey, key: &SecureBytes, method: Element) -> Element {
        let wrapped = match method.attr("Algorithm") {
            Some(algorithms::RSA_1_5) => rsa::encrypt(recipient, key.expose_secret(), RsaPadding::Pkcs1),
            _ => rsa::encrypt(
                recipient,
                key.expose_secret(),
                RsaPadding::Oaep {
                    digest: HashAlg::Sha1,
                    mgf1_digest: HashAlg::Sha1,
                },
            ),
        }
        .unwrap();

        let mut encrypted_key = Element::new("xenc:EncryptedKey");
        encrypted_key.push(method);
        encrypted_key
            .add_child("xenc:CipherData")
            .add_text_child("xenc:CipherValue", BASE64.encode(wrapped));
        encrypted_key
    }

    fn encrypted_attribute(
        recipient: &RsaPublicKey,
        plaintext: &str,
        cipher: (Cipher, &str),
        key_method: Element,
        key_beside_data: bool,
    ) -> Element {
        let key = sym::generate_key(cipher.0).unwrap();
        let cipher_value = sym::encrypt(cipher.0, &key, plaintext.as_bytes()).unwrap();
        let encrypted_key = encrypted_key(recipient, &key, key_method);

        let mut attribute = Element::new("saml:EncryptedAttribute").with_attr("xmlns:saml", SAML);
        let mut data = Element::new("xenc:EncryptedData")
            .with_attr("xmlns:xenc", ns::XENC)
            .with_attr("Type", algorithms::TYPE_ELEMENT);
        data.add_child("xenc:EncryptionMethod")
            .set_attr("Algorithm", cipher.1);
        if !key_beside_data {
            data.add_child("ds:KeyInfo").push(encrypted_key.clone());
        }
        data.add_child("xenc:CipherData")
            .add_text_child("xenc:CipherValue", BASE64.encode(cipher_value));
        attribute.push(data);
        if key_beside_data {
            attribute.push(encrypted_key);
        }
        attribute
    }

    fn oaep_mgf1p() -> Element {
        Element::new("xenc:EncryptionMethod").with_attr("Algorithm", algorithms::RSA_OAEP_MGF1P)
    }

    #[test]
    fn test_decrypt_attribute_all_ciphers() {
        let (private_key, certificate) = generate_test_identity("Merchant").unwrap();
        let public_key = certificate.public_key().unwrap();

        for cipher in [
            (Cipher::Aes128Cbc, algorithms::AES128_CBC),
            (Cipher::Aes192Cbc, algorithms::AES192_CBC),
            (Cipher::Aes256Cbc, algorithms::AES256_CBC),
            (Cipher::Aes128Gcm, algorithms::AES128_GCM),
            (Cipher::Aes192Gcm, algorithms::AES192_GCM),
            (Cipher::Aes256Gcm, algorithms::AES256_GCM),
        ] {
            let plaintext = attribute_xml("urn:nl:bvn:bankid:1.0:consumer.bin", "BIN-123");
            let encrypted =
                encrypted_attribute(&public_key, &plaintext, cipher, oaep_mgf1p(), false);

            let (name, value) = decrypt_attribute(&encrypted, &private_key).unwrap();
            assert_eq!(name, "urn:nl:bvn:bankid:1.0:consumer.bin", "{:?}", cipher.0);
            assert_eq!(value, "BIN-123");
        }
    }

    #[test]
    fn test_decrypt_with_key_beside_data_and_rsa_1_5() {
        let (private_key, certificate) = generate_test_identity("Merchant").unwrap();
        let public_key = certificate.public_key().unwrap();
        let method =
            Element::new("xenc:EncryptionMethod").with_attr("Algorithm", algorithms::RSA_1_5);

        let encrypted = encrypted_attribute(
            &public_key,
            &attribute_xml("gender", "F"),
            (Cipher::Aes256Cbc, algorithms::AES256_CBC),
            method,
            true,
        );

        let (name, value) = decrypt_attribute(&encrypted, &private_key).unwrap();
        assert_eq!((name.as_str(), value.as_str()), ("gender", "F"));
    }

    #[test]
    fn test_decrypt_xmlenc11_oaep_with_explicit_sha1() {
        let (private_key, certificate) = generate_test_identity("Merchant").unwrap();
        let public_key = certificate.public_key().unwrap();
        let mut method =
            Element::new("xenc:EncryptionMethod").with_attr("Algorithm", algorithms::RSA_OAEP);
        method
            .add_child("ds:DigestMethod")
            .set_attr("Algorithm", algorithms::SHA1);
        method
            .add_child("xenc11:MGF")
            .set_attr("Algorithm", algorithms::MGF1_SHA1);

        let encrypted = encrypted_attribute(
            &public_key,
            &attribute_xml("email", "jan@example.nl"),
            (Cipher::Aes128Gcm, algorithms::AES128_GCM),
            method,
            false,
        );

        let (_, value) = decrypt_attribute(&encrypted, &private_key).unwrap();
        assert_eq!(value, "jan@example.nl");
    }

    #[test]
    fn test_decrypt_attributes_collects_all() {
        let (private_key, certificate) = generate_test_identity("Merchant").unwrap();
        let public_key = certificate.public_key().unwrap();

        let mut statement = Element::new("saml:AttributeStatement");
        for (name, value) in [("initials", "J."), ("legallastname", "Jansen")] {
            statement.push(encrypted_attribute(
                &public_key,
                &attribute_xml(name, value),
                (Cipher::Aes256Cbc, algorithms::AES256_CBC),
                oaep_mgf1p(),
                false,
            ));
        }

        let attributes = decrypt_attributes(&statement, &private_key).unwrap();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes["initials"], "J.");
        assert_eq!(attributes["legallastname"], "Jansen");
    }

    #[test]
    fn test_one_bad_attribute_fails_all() {
        let (private_key, certificate) = generate_test_identity("Merchant").unwrap();
        let (_, other_certificate) = generate_test_identity("Someone Else").unwrap();

        let mut statement = Element::new("saml:AttributeStatement");
        statement.push(encrypted_attribute(
            &certificate.public_key().unwrap(),
            &attribute_xml("initials", "J."),
            (Cipher::Aes256Cbc, algorithms::AES256_CBC),
            oaep_mgf1p(),
            false,
        ));
        statement.push(encrypted_attribute(
            &other_certificate.public_key().unwrap(),
            &attribute_xml("legallastname", "Jansen"),
            (Cipher::Aes256Cbc, algorithms::AES256_CBC),
            oaep_mgf1p(),
            false,
        ));

        assert!(decrypt_attributes(&statement, &private_key).is_err());
    }

    #[test]
    fn test_unsupported_cipher_is_rejected() {
        let (private_key, certificate) = generate_test_identity("Merchant").unwrap();
        let mut encrypted = encrypted_attribute(
            &certificate.public_key().unwrap(),
            &attribute_xml("initials", "J."),
            (Cipher::Aes256Cbc, algorithms::AES256_CBC),
            oaep_mgf1p(),
            false,
        );
        let xml = encrypted
            .to_xml()
            .unwrap()
            .replace(algorithms::AES256_CBC, "http://www.w3.org/2001/04/xmlenc#tripledes-cbc");
        encrypted = Element::parse(&xml).unwrap();

        let result = decrypt_attribute(&encrypted, &private_key);
        assert!(matches!(result, Err(Error::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn test_missing_encrypted_key() {
        let (private_key, _) = generate_test_identity("Merchant").unwrap();
        let mut encrypted = Element::new("EncryptedAttribute");
        encrypted.add_child("EncryptedData");

        let result = decrypt_attribute(&encrypted, &private_key);
        assert!(matches!(result, Err(Error::MissingElement("EncryptedKey"))));
    }
}
