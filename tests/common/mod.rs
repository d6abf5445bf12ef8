#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use idx_client::{
    ClientIdentity, Merchant, Transport, TransportError, Variant,
    crypto::{
        Certificate, HashAlg,
        cert_utils::generate_test_identity,
        rsa::{self, RsaPadding},
        sym::{self, Cipher},
    },
    dsig::{self, SigningIdentity},
    message::{SAML_NAMESPACE, SAMLP_NAMESPACE},
    telemetry,
    xml::{Element, c14n},
    xmlenc::{algorithms, ns},
};

pub const MERCHANT_ID: &str = "002054205";
pub const RETURN_URL: &str = "https://shop.example/return";

/// Key material of both sides of a test exchange
pub struct Parties {
    pub merchant: ClientIdentity,
    pub acquirer: SigningIdentity,
}

pub fn parties() -> Parties {
    telemetry::init_tracing();

    let (merchant_key, merchant_cert) = generate_test_identity("Test Merchant").unwrap();
    let (acquirer_key, acquirer_cert) = generate_test_identity("Test Acquirer").unwrap();
    Parties {
        merchant: ClientIdentity {
            merchant: Merchant {
                id: MERCHANT_ID.to_string(),
                sub_id: "0".to_string(),
                return_url: RETURN_URL.to_string(),
            },
            signing: SigningIdentity {
                private_key: merchant_key,
                certificate: merchant_cert,
            },
            acquirer_certificate: acquirer_cert.clone(),
        },
        acquirer: SigningIdentity {
            private_key: acquirer_key,
            certificate: acquirer_cert,
        },
    }
}

/// What the fake acquirer answers with next
pub enum Reply {
    /// Signed with the acquirer key before sending
    Signed(Element),
    /// Sent as is
    Raw(String),
}

#[derive(Default)]
struct State {
    replies: VecDeque<Reply>,
    requests: Vec<Element>,
}

/// In-process acquirer. Checks the merchant signature on every request and
/// answers with the queued replies in order.
#[derive(Clone)]
pub struct FakeAcquirer {
    identity: SigningIdentity,
    merchant_certificate: Certificate,
    state: Arc<Mutex<State>>,
}

impl FakeAcquirer {
    pub fn new(parties: &Parties) -> Self {
        Self {
            identity: parties.acquirer.clone(),
            merchant_certificate: parties.merchant.signing.certificate.clone(),
            state: Arc::default(),
        }
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    pub fn reply_signed(&self, document: Element) -> &Self {
        self.reply(Reply::Signed(document))
    }

    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    /// Validated requests received so far, signatures removed
    pub fn requests(&self) -> Vec<Element> {
        self.state.lock().unwrap().requests.clone()
    }
}

impl Transport for FakeAcquirer {
    async fn post(&self, body: String) -> Result<String, TransportError> {
        let request = Element::parse(&body).expect("request is well-formed XML");
        let request = dsig::verify_enveloped(&request, &self.merchant_certificate)
            .expect("request carries a valid merchant signature");

        let mut state = self.state.lock().unwrap();
        state.requests.push(request);
        match state.replies.pop_front().expect("a reply is queued") {
            Reply::Signed(document) => Ok(dsig::sign_enveloped(&document, &self.identity).unwrap()),
            Reply::Raw(body) => Ok(body),
        }
    }
}

pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Enveloped signature the way some acquirers write it: `ds:` prefixed and
/// with `xsi` listed in `InclusiveNamespaces` for both canonicalizations.
/// The root must declare the `xsi` prefix.
pub fn sign_prefixed(document: &Element, identity: &SigningIdentity) -> String {
    let mut root = document.clone();
    let inclusive = ["xsi"];
    let inclusive_namespaces = || {
        Element::new("ec:InclusiveNamespaces")
            .with_attr("xmlns:ec", dsig::algorithms::EXCLUSIVE_C14N)
            .with_attr("PrefixList", inclusive.join(" "))
    };

    let root_c14n = c14n::canonicalize(&root, &c14n::NamespaceScope::new(), &inclusive);
    let digest = HashAlg::Sha256.hash(root_c14n.as_bytes()).unwrap();

    let mut signed_info = Element::new("ds:SignedInfo");
    signed_info
        .add_child("ds:CanonicalizationMethod")
        .set_attr("Algorithm", dsig::algorithms::EXCLUSIVE_C14N)
        .push(inclusive_namespaces());
    signed_info
        .add_child("ds:SignatureMethod")
        .set_attr("Algorithm", dsig::algorithms::RSA_SHA256);
    let reference = signed_info.add_child("ds:Reference");
    reference.set_attr("URI", "");
    let transforms = reference.add_child("ds:Transforms");
    transforms
        .add_child("ds:Transform")
        .set_attr("Algorithm", dsig::algorithms::ENVELOPED_SIGNATURE);
    transforms
        .add_child("ds:Transform")
        .set_attr("Algorithm", dsig::algorithms::EXCLUSIVE_C14N)
        .push(inclusive_namespaces());
    reference
        .add_child("ds:DigestMethod")
        .set_attr("Algorithm", dsig::algorithms::SHA256);
    reference.add_text_child("ds:DigestValue", BASE64.encode(digest));

    let mut signature = Element::new("ds:Signature").with_attr("xmlns:ds", dsig::ns::DS);
    let scope = c14n::in_scope([&root, &signature]);
    let signed_info_c14n = c14n::canonicalize(&signed_info, &scope, &inclusive);
    let value = rsa::sign(
        &identity.private_key,
        signed_info_c14n.as_bytes(),
        HashAlg::Sha256,
    )
    .unwrap();

    signature.push(signed_info);
    signature.add_text_child("ds:SignatureValue", BASE64.encode(value.as_bytes()));
    signature
        .add_child("ds:KeyInfo")
        .add_text_child("ds:KeyName", identity.certificate.thumbprint().unwrap());
    root.push(signature);
    root.to_document().unwrap()
}

fn response_root(variant: Variant, name: &str) -> Element {
    let mut root = Element::new(name)
        .with_attr("xmlns", variant.namespace())
        .with_attr("version", variant.version());
    root.add_text_child("createDateTimestamp", "2024-05-01T12:00:00.000Z");
    root.add_child("Acquirer").add_text_child("acquirerID", "0050");
    root
}

pub fn directory_response(variant: Variant, countries: &[(&str, &[(&str, &str)])]) -> Element {
    let mut root = response_root(variant, "DirectoryRes");
    let directory = root.add_child("Directory");
    directory.add_text_child("directoryDateTimestamp", "2024-05-01T00:00:00.000Z");
    for (name, issuers) in countries {
        let country = directory.add_child("Country");
        country.add_text_child("countryNames", *name);
        for (id, issuer_name) in *issuers {
            country
                .add_child("Issuer")
                .add_text_child("issuerID", *id)
                .add_text_child("issuerName", *issuer_name);
        }
    }
    root
}

pub fn transaction_response(variant: Variant, transaction_id: &str, url: &str) -> Element {
    let mut root = response_root(variant, "AcquirerTrxRes");
    root.add_child("Issuer")
        .add_text_child("issuerAuthenticationURL", url);
    root.add_child("Transaction")
        .add_text_child("transactionID", transaction_id)
        .add_text_child("transactionCreateDateTimestamp", "2024-05-01T12:00:00.000Z")
        .add_text_child("purchaseID", "order-1");
    root
}

pub fn ideal_status_response(transaction_id: &str, status: &str) -> Element {
    let mut root = response_root(Variant::Ideal, "AcquirerStatusRes");
    let transaction = root.add_child("Transaction");
    transaction
        .add_text_child("transactionID", transaction_id)
        .add_text_child("status", status)
        .add_text_child("statusDateTimestamp", "2024-05-01T12:05:00.000Z");
    if status == "Success" {
        transaction
            .add_text_child("consumerName", "C. Onsumer")
            .add_text_child("consumerIBAN", "NL44RABO0123456789")
            .add_text_child("consumerBIC", "RABONL2U")
            .add_text_child("amount", "12.50")
            .add_text_child("currency", "EUR");
    }
    root
}

pub fn idin_status_response(
    transaction_id: &str,
    status_uri: &str,
    attribute_statement: Option<Element>,
) -> Element {
    let mut root = response_root(Variant::Idin, "AcquirerStatusRes");
    let transaction = root.add_child("Transaction");
    transaction
        .add_text_child("transactionID", transaction_id)
        .add_text_child("statusDateTimestamp", "2024-05-01T12:05:00.000Z");

    let response = transaction
        .add_child("container")
        .add_child("samlp:Response")
        .set_attr("xmlns:samlp", SAMLP_NAMESPACE)
        .set_attr("xmlns:saml", SAML_NAMESPACE);
    response
        .add_child("samlp:Status")
        .add_child("samlp:StatusCode")
        .set_attr("Value", status_uri);
    if let Some(statement) = attribute_statement {
        response.add_child("saml:Assertion").push(statement);
    }
    root
}

pub fn error_response(code: &str, message: &str, detail: &str, consumer_message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<AcquirerErrorRes xmlns="http://www.idealdesk.com/ideal/messages/mer-acq/3.3.1" version="3.3.1">
  <createDateTimestamp>2024-05-01T12:00:00.000Z</createDateTimestamp>
  <Error>
    <errorCode>{code}</errorCode>
    <errorMessage>{message}</errorMessage>
    <errorDetail>{detail}</errorDetail>
    <consumerMessage>{consumer_message}</consumerMessage>
  </Error>
</AcquirerErrorRes>"#
    )
}

/// `saml:AttributeStatement` with one AES-256-CBC `EncryptedAttribute` per
/// entry, keys transported with RSA-OAEP to `recipient`
pub fn attribute_statement(recipient: &Certificate, attributes: &[(&str, &str)]) -> Element {
    let public_key = recipient.public_key().unwrap();
    let mut statement = Element::new("saml:AttributeStatement");

    for (name, value) in attributes {
        let plaintext = format!(
            r#"<saml:Attribute xmlns:saml="{SAML_NAMESPACE}" Name="{name}"><saml:AttributeValue>{value}</saml:AttributeValue></saml:Attribute>"#
        );
        let key = sym::generate_key(Cipher::Aes256Cbc).unwrap();
        let encrypted = sym::encrypt(Cipher::Aes256Cbc, &key, plaintext.as_bytes()).unwrap();
        let wrapped = rsa::encrypt(
            &public_key,
            key.expose_secret(),
            RsaPadding::Oaep {
                digest: HashAlg::Sha1,
                mgf1_digest: HashAlg::Sha1,
            },
        )
        .unwrap();

        let data = statement
            .add_child("saml:EncryptedAttribute")
            .add_child("xenc:EncryptedData")
            .set_attr("xmlns:xenc", ns::XENC)
            .set_attr("Type", algorithms::TYPE_ELEMENT);
        data.add_child("xenc:EncryptionMethod")
            .set_attr("Algorithm", algorithms::AES256_CBC);
        let encrypted_key = data
            .add_child("ds:KeyInfo")
            .set_attr("xmlns:ds", dsig::ns::DS)
            .add_child("xenc:EncryptedKey");
        encrypted_key
            .add_child("xenc:EncryptionMethod")
            .set_attr("Algorithm", algorithms::RSA_OAEP_MGF1P);
        encrypted_key
            .add_child("xenc:CipherData")
            .add_text_child("xenc:CipherValue", BASE64.encode(wrapped));
        data.add_child("xenc:CipherData")
            .add_text_child("xenc:CipherValue", BASE64.encode(encrypted));
    }
    statement
}
