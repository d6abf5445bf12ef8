//! Interpretation of acquirer responses shared by both protocol variants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AcquirerError, Error, Result};
use crate::xml::Element;

/// Root tag of the acquirer's error envelope
pub const ERROR_RESPONSE_TAG: &str = "AcquirerErrorRes";

/// Participating issuers grouped by country, as returned by a directory
/// request. Issuers keep the order of the response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub issuers: BTreeMap<String, Vec<Issuer>>,
}

impl Directory {
    /// Issuers listed for one country
    pub fn country(&self, name: &str) -> &[Issuer] {
        self.issuers.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// All issuers of all countries
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Issuer)> {
        self.issuers
            .iter()
            .flat_map(|(country, issuers)| issuers.iter().map(move |i| (country.as_str(), i)))
    }
}

/// A consumer bank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    /// BIC of the bank
    #[serde(rename = "issuerID")]
    pub id: String,
    /// Display name
    #[serde(rename = "issuerName")]
    pub name: String,
}

/// Identifiers assigned by the acquirer when a transaction is started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionStarted {
    pub transaction_id: String,
    pub issuer_authentication_url: String,
}

/// Extract the error envelope fields when `document` is an
/// `AcquirerErrorRes`. Missing fields are left empty.
pub fn acquirer_error(document: &Element) -> Option<AcquirerError> {
    if document.local_name() != ERROR_RESPONSE_TAG {
        return None;
    }
    let field = |name: &str| {
        document
            .find_text(&format!("Error/{name}"))
            .unwrap_or_default()
    };
    Some(AcquirerError {
        error_code: field("errorCode"),
        error_message: field("errorMessage"),
        error_detail: field("errorDetail"),
        consumer_message: field("consumerMessage"),
    })
}

/// Build the directory from a validated `DirectoryRes`
pub fn parse_directory(response: &Element) -> Result<Directory> {
    let mut directory = Directory::default();
    for country in response.find_all("Directory/Country") {
        let name = required_text(country, "countryNames")?;
        let entries = directory.issuers.entry(name).or_default();
        for issuer in country.find_all("Issuer") {
            entries.push(Issuer {
                id: required_text(issuer, "issuerID")?,
                name: required_text(issuer, "issuerName")?,
            });
        }
    }
    Ok(directory)
}

/// Read the transaction identifiers from a validated `AcquirerTrxRes`
pub fn parse_transaction_start(response: &Element) -> Result<TransactionStarted> {
    Ok(TransactionStarted {
        transaction_id: required_text(response, "Transaction/transactionID")?,
        issuer_authentication_url: required_text(response, "Issuer/issuerAuthenticationURL")?,
    })
}

/// Make sure a status response is about the transaction that was asked for.
pub fn check_transaction_id(response: &Element, expected: &str) -> Result<()> {
    let actual = required_text(response, "Transaction/transactionID")?;
    if actual != expected {
        warn!(expected, actual = %actual, "Status response names another transaction");
        return Err(Error::TransactionIdMismatch {
            expected: expected.to_owned(),
            actual,
        });
    }
    Ok(())
}

/// Text of the element at `path`, which must exist
pub(crate) fn required_text(element: &Element, path: &str) -> Result<String> {
    element
        .find_text(path)
        .ok_or_else(|| Error::MalformedResponse(format!("missing {path} in {}", element.name())))
}
