//! iDEAL payments.

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use crate::client::{ClientIdentity, CommonClient, DirectoryClient};
use crate::dsig::{SignatureVerifier, Signer};
use crate::error::Result;
use crate::message::{IdealTransactionRequest, Variant};
use crate::response::{Directory, required_text};
use crate::status::{PlainStatusDecoder, Status, TransactionStatus};
use crate::transaction::Transaction;
use crate::transport::Transport;
use crate::xml::Element;

/// Details of a successful payment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdealPayment {
    /// Name of the account holder(s)
    pub consumer_name: String,
    pub consumer_iban: String,
    pub consumer_bic: String,
    /// Amount paid, e.g. `"1.00"`
    pub amount: String,
    pub currency: String,
}

pub type IdealTransaction<'c, T> = Transaction<'c, T>;
pub type IdealTransactionStatus = TransactionStatus<IdealPayment>;

#[derive(Debug, Clone)]
pub struct IdealClient<T> {
    common: CommonClient<T>,
}

impl<T: Transport> IdealClient<T> {
    pub fn new(identity: ClientIdentity, transport: T) -> Self {
        Self {
            common: CommonClient::new(Variant::Ideal, identity, transport),
        }
    }

    pub fn with_signer(mut self, signer: impl Signer + 'static) -> Self {
        self.common = self.common.with_signer(signer);
        self
    }

    pub fn with_verifier(mut self, verifier: impl SignatureVerifier + 'static) -> Self {
        self.common = self.common.with_verifier(verifier);
        self
    }

    pub fn common(&self) -> &CommonClient<T> {
        &self.common
    }

    /// Build a payment without sending it; see [`Transaction::start`].
    pub fn new_transaction(&self, request: &IdealTransactionRequest) -> Result<IdealTransaction<'_, T>> {
        let message = self
            .common
            .message_builder()
            .ideal_transaction(request, Utc::now())?;
        Ok(Transaction::new(&self.common, message, &request.purchase_id))
    }

    /// Request the status of a started payment.
    ///
    /// Acquirers restrict how often this may be called per transaction; the
    /// client does not enforce those limits.
    #[instrument(skip(self))]
    pub async fn transaction_status(&self, transaction_id: &str) -> Result<IdealTransactionStatus> {
        let (status, response) = self
            .common
            .status_response(transaction_id, &PlainStatusDecoder)
            .await?;

        if status != Status::Success {
            return Ok(TransactionStatus::unsuccessful(status));
        }
        Ok(TransactionStatus::success(parse_payment(&response)?))
    }
}

impl<T: Transport> DirectoryClient for IdealClient<T> {
    async fn directory(&self) -> Result<Directory> {
        self.common.directory().await
    }
}

/// Consumer details are optional in the response, amount and currency are not
fn parse_payment(response: &Element) -> Result<IdealPayment> {
    let optional = |path: &str| response.find_text(path).unwrap_or_default();
    Ok(IdealPayment {
        consumer_name: optional("Transaction/consumerName"),
        consumer_iban: optional("Transaction/consumerIBAN"),
        consumer_bic: optional("Transaction/consumerBIC"),
        amount: required_text(response, "Transaction/amount")?,
        currency: required_text(response, "Transaction/currency")?,
    })
}
