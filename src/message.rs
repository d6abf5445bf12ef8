//! Construction of the request documents in their normative element order.

use std::fmt;

use bitflags::bitflags;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::xml::Element;

pub const IDEAL_NAMESPACE: &str = "http://www.idealdesk.com/ideal/messages/mer-acq/3.3.1";
pub const IDEAL_VERSION: &str = "3.3.1";

pub const IDIN_NAMESPACE: &str =
    "http://www.betaalvereniging.nl/iDx/messages/Merchant-Acquirer/1.0.0";
pub const IDIN_VERSION: &str = "1.0.0";
pub const IDIN_PRODUCT_ID: &str = "NL:BVN:BankID:1.0";

pub const SAMLP_NAMESPACE: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub const SAML_NAMESPACE: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const IDIN_PROTOCOL_BINDING: &str = "nl:bvn:bankid:1.0:protocol:iDx";
pub const IDIN_MINIMUM_LOA: &str = "nl:bvn:bankid:1.0:loa3";

/// Protocol variant spoken with the acquirer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// iDEAL payments
    #[default]
    Ideal,
    /// iDIN identity
    Idin,
}

impl Variant {
    pub fn namespace(self) -> &'static str {
        match self {
            Variant::Ideal => IDEAL_NAMESPACE,
            Variant::Idin => IDIN_NAMESPACE,
        }
    }

    pub fn version(self) -> &'static str {
        match self {
            Variant::Ideal => IDEAL_VERSION,
            Variant::Idin => IDIN_VERSION,
        }
    }

    pub fn product_id(self) -> Option<&'static str> {
        match self {
            Variant::Ideal => None,
            Variant::Idin => Some(IDIN_PRODUCT_ID),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Ideal => write!(f, "iDEAL"),
            Variant::Idin => write!(f, "iDIN"),
        }
    }
}

/// Kinds of request sent to the acquirer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Directory,
    TransactionStart,
    TransactionStatus,
}

impl MessageKind {
    /// Root tag of the request document
    pub fn request_tag(self) -> &'static str {
        match self {
            MessageKind::Directory => "DirectoryReq",
            MessageKind::TransactionStart => "AcquirerTrxReq",
            MessageKind::TransactionStatus => "AcquirerStatusReq",
        }
    }
}

/// Merchant registration as issued by the acquirer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merchant {
    pub id: String,
    /// `"0"` when sub IDs are not used
    pub sub_id: String,
    /// Where the consumer returns after authenticating at the issuer
    pub return_url: String,
}

/// Fields of an iDEAL payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdealTransactionRequest {
    /// BIC of the consumer's bank
    pub issuer_id: String,
    /// Merchant reference shown on the consumer's statement
    pub purchase_id: String,
    /// Amount in euros with a decimal point, e.g. `"1.00"`
    pub amount: String,
    pub currency: String,
    pub language: String,
    pub description: String,
    /// Session token handed back on the return URL
    pub entrance_code: String,
}

impl IdealTransactionRequest {
    pub fn new(
        issuer_id: impl Into<String>,
        purchase_id: impl Into<String>,
        amount: impl Into<String>,
        description: impl Into<String>,
        entrance_code: impl Into<String>,
    ) -> Self {
        Self {
            issuer_id: issuer_id.into(),
            purchase_id: purchase_id.into(),
            amount: amount.into(),
            currency: "EUR".into(),
            language: "nl".into(),
            description: description.into(),
            entrance_code: entrance_code.into(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn validate(&self) -> Result<()> {
        require("issuer_id", &self.issuer_id)?;
        require("purchase_id", &self.purchase_id)?;
        require("entrance_code", &self.entrance_code)
    }
}

/// Fields of an iDIN identification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdinTransactionRequest {
    pub issuer_id: String,
    pub entrance_code: String,
    /// Unique ID of the embedded `AuthnRequest`
    pub id: String,
    /// Requested attribute sets
    pub attributes: ServiceId,
    pub language: String,
}

impl IdinTransactionRequest {
    pub fn new(
        issuer_id: impl Into<String>,
        entrance_code: impl Into<String>,
        id: impl Into<String>,
        attributes: ServiceId,
    ) -> Self {
        Self {
            issuer_id: issuer_id.into(),
            entrance_code: entrance_code.into(),
            id: id.into(),
            attributes,
            language: "nl".into(),
        }
    }

    fn validate(&self) -> Result<()> {
        require("issuer_id", &self.issuer_id)?;
        require("entrance_code", &self.entrance_code)?;
        require("id", &self.id)?;
        if self.attributes.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one attribute set must be requested".into(),
            ));
        }
        Ok(())
    }
}

bitflags! {
    /// Bitmask of identity attribute sets requested in an iDIN transaction
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ServiceId: u32 {
        const BIN = 1 << 14;
        const NAME = 1 << 12;
        const ADDRESS = 1 << 10;
        const DATE_OF_BIRTH = 7 << 6;
        const GENDER = 1 << 4;
        const TELEPHONE = 1 << 2;
        const EMAIL = 1 << 1;
    }
}

/// Written as the decimal `AttributeConsumingServiceIndex`
impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Builds request documents for one merchant and protocol variant.
#[derive(Debug, Clone, Copy)]
pub struct MessageBuilder<'a> {
    variant: Variant,
    merchant: &'a Merchant,
}

impl<'a> MessageBuilder<'a> {
    pub fn new(variant: Variant, merchant: &'a Merchant) -> Self {
        Self { variant, merchant }
    }

    /// The skeleton shared by all requests: root attributes, creation
    /// timestamp and the `Merchant` block.
    pub fn create_message(&self, kind: MessageKind, now: DateTime<Utc>) -> Element {
        let mut root = Element::new(kind.request_tag())
            .with_attr("xmlns", self.variant.namespace())
            .with_attr("version", self.variant.version());
        if let Some(product_id) = self.variant.product_id() {
            root.set_attr("productID", product_id);
        }

        root.add_text_child("createDateTimestamp", format_timestamp(now));
        root.add_child("Merchant")
            .add_text_child("merchantID", &self.merchant.id)
            .add_text_child("subID", &self.merchant.sub_id);
        root
    }

    pub fn directory_request(&self, now: DateTime<Utc>) -> Element {
        self.create_message(MessageKind::Directory, now)
    }

    pub fn status_request(&self, transaction_id: &str, now: DateTime<Utc>) -> Result<Element> {
        require("transaction_id", transaction_id)?;
        let mut root = self.create_message(MessageKind::TransactionStatus, now);
        root.add_child("Transaction")
            .add_text_child("transactionID", transaction_id);
        Ok(root)
    }

    pub fn ideal_transaction(
        &self,
        request: &IdealTransactionRequest,
        now: DateTime<Utc>,
    ) -> Result<Element> {
        request.validate()?;
        let mut root = self.transaction_request(&request.issuer_id, now);
        root.add_child("Transaction")
            .add_text_child("purchaseID", &request.purchase_id)
            .add_text_child("amount", &request.amount)
            .add_text_child("currency", &request.currency)
            .add_text_child("language", &request.language)
            .add_text_child("description", &request.description)
            .add_text_child("entranceCode", &request.entrance_code);
        Ok(root)
    }

    pub fn idin_transaction(
        &self,
        request: &IdinTransactionRequest,
        now: DateTime<Utc>,
    ) -> Result<Element> {
        request.validate()?;
        let mut root = self.transaction_request(&request.issuer_id, now);

        let mut authn_request = Element::new("samlp:AuthnRequest")
            .with_attr("xmlns:samlp", SAMLP_NAMESPACE)
            .with_attr("xmlns:saml", SAML_NAMESPACE)
            .with_attr("ID", &request.id)
            .with_attr("Version", "2.0")
            .with_attr("IssueInstant", format_timestamp(now))
            .with_attr("ProtocolBinding", IDIN_PROTOCOL_BINDING)
            .with_attr("AssertionConsumerServiceURL", &self.merchant.return_url)
            .with_attr(
                "AttributeConsumingServiceIndex",
                request.attributes.to_string(),
            );
        authn_request.add_text_child("saml:Issuer", &self.merchant.id);
        authn_request
            .add_child("samlp:RequestedAuthnContext")
            .set_attr("Comparison", "minimum")
            .add_text_child("saml:AuthnContextClassRef", IDIN_MINIMUM_LOA);

        let transaction = root.add_child("Transaction");
        transaction
            .add_text_child("language", &request.language)
            .add_text_child("entranceCode", &request.entrance_code);
        transaction.add_child("container").push(authn_request);
        Ok(root)
    }

    /// Transaction-creation skeleton: the return URL closes the `Merchant`
    /// block and `Issuer` precedes it.
    fn transaction_request(&self, issuer_id: &str, now: DateTime<Utc>) -> Element {
        let mut root = self.create_message(MessageKind::TransactionStart, now);
        if let Some(merchant) = root.find_mut("Merchant") {
            merchant.add_text_child("merchantReturnURL", &self.merchant.return_url);
        }
        let mut issuer = Element::new("Issuer");
        issuer.add_text_child("issuerID", issuer_id);
        root.insert_before("Merchant", issuer);
        root
    }
}

/// UTC timestamp with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Random alphanumeric value usable as entrance code (at most 40 characters)
pub fn random_entrance_code() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Random `AuthnRequest` ID. SAML IDs may not start with a digit.
pub fn random_request_id() -> String {
    format!("_{}", Uuid::new_v4().simple())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(())
}
