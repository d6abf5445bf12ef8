//! Transaction status vocabulary and the two ways acquirers encode it.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::response::required_text;
use crate::xml::Element;

/// Prefix of the SAML status URIs used by identity acquirers
pub const SAML_STATUS_PREFIX: &str = "urn:oasis:names:tc:SAML:2.0:status:";

/// Status of a transaction as reported by the acquirer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    Success,
    Cancelled,
    Expired,
    Failure,
    /// Not finished yet, may be polled again
    Open,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "Success",
            Status::Cancelled => "Cancelled",
            Status::Expired => "Expired",
            Status::Failure => "Failure",
            Status::Open => "Open",
        }
    }

    /// Whether the acquirer will not report a different status later
    pub fn is_final(self) -> bool {
        !matches!(self, Status::Open)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Success" => Ok(Status::Success),
            "Cancelled" => Ok(Status::Cancelled),
            "Expired" => Ok(Status::Expired),
            "Failure" => Ok(Status::Failure),
            "Open" => Ok(Status::Open),
            other => Err(Error::InvalidStatus(other.to_owned())),
        }
    }
}

/// Result of a status request. The payload is only present on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionStatus<P> {
    status: Status,
    payload: Option<P>,
}

impl<P> TransactionStatus<P> {
    pub(crate) fn success(payload: P) -> Self {
        Self {
            status: Status::Success,
            payload: Some(payload),
        }
    }

    /// Status without payload; never used for `Success`
    pub(crate) fn unsuccessful(status: Status) -> Self {
        debug_assert_ne!(status, Status::Success);
        Self {
            status,
            payload: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<P> {
        self.payload
    }
}

/// Reads the transaction status out of a validated status response
pub trait StatusDecoder: Send + Sync {
    fn decode(&self, response: &Element) -> Result<Status>;
}

/// Status carried as plain text in `Transaction/status` (iDEAL)
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainStatusDecoder;

impl StatusDecoder for PlainStatusDecoder {
    fn decode(&self, response: &Element) -> Result<Status> {
        required_text(response, "Transaction/status")?.parse()
    }
}

/// Status carried as a SAML status URI on
/// `Transaction/container/Response/Status/StatusCode/@Value` (iDIN)
#[derive(Debug, Clone, Copy, Default)]
pub struct SamlStatusDecoder;

impl StatusDecoder for SamlStatusDecoder {
    fn decode(&self, response: &Element) -> Result<Status> {
        const PATH: &str = "Transaction/container/Response/Status/StatusCode";
        let value = response
            .find(PATH)
            .and_then(|code| code.attr("Value"))
            .ok_or_else(|| Error::MalformedResponse(format!("missing {PATH}/@Value")))?;

        value
            .strip_prefix(SAML_STATUS_PREFIX)
            .and_then(|suffix| suffix.parse::<Status>().ok())
            .ok_or_else(|| Error::InvalidStatus(value.to_owned()))
    }
}
