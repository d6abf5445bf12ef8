//! iDIN identification.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::client::{ClientIdentity, CommonClient, DirectoryClient};
use crate::dsig::{SignatureVerifier, Signer};
use crate::error::Result;
use crate::message::{IdinTransactionRequest, Variant};
use crate::response::Directory;
use crate::status::{SamlStatusDecoder, Status, TransactionStatus};
use crate::transaction::Transaction;
use crate::transport::Transport;
use crate::xmlenc::AttributeDecryptor;

/// Location of the encrypted attributes in a successful status response
const ATTRIBUTE_STATEMENT: &str = "Transaction/container/Response/Assertion/AttributeStatement";

/// Decrypted identity attributes, keyed by attribute name
pub type IdinAttributes = HashMap<String, String>;

pub type IdinTransaction<'c, T> = Transaction<'c, T>;
pub type IdinTransactionStatus = TransactionStatus<IdinAttributes>;

#[derive(Debug, Clone)]
pub struct IdinClient<T> {
    common: CommonClient<T>,
    decryptor: Arc<dyn AttributeDecryptor>,
}

impl<T: Transport> IdinClient<T> {
    /// Attributes are decrypted with the merchant's signing key unless
    /// another decryptor is set with [`IdinClient::with_decryptor`].
    pub fn new(identity: ClientIdentity, transport: T) -> Self {
        let decryptor: Arc<dyn AttributeDecryptor> =
            Arc::new(identity.signing.private_key.clone());
        Self {
            common: CommonClient::new(Variant::Idin, identity, transport),
            decryptor,
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

    pub fn with_decryptor(mut self, decryptor: impl AttributeDecryptor + 'static) -> Self {
        self.decryptor = Arc::new(decryptor);
        self
    }

    pub fn common(&self) -> &CommonClient<T> {
        &self.common
    }

    /// Build an identification request without sending it; see
    /// [`Transaction::start`].
    pub fn new_transaction(&self, request: &IdinTransactionRequest) -> Result<IdinTransaction<'_, T>> {
        let message = self
            .common
            .message_builder()
            .idin_transaction(request, Utc::now())?;
        Ok(Transaction::new(&self.common, message, &request.id))
    }

    /// Request the status of an identification and decrypt the attributes
    /// on success.
    ///
    /// Only one status request is allowed after the consumer returns; the
    /// client does not enforce this.
    #[instrument(skip(self))]
    pub async fn transaction_status(&self, transaction_id: &str) -> Result<IdinTransactionStatus> {
        let (status, response) = self
            .common
            .status_response(transaction_id, &SamlStatusDecoder)
            .await?;

        if status != Status::Success {
            return Ok(TransactionStatus::unsuccessful(status));
        }

        let attributes = match response.find(ATTRIBUTE_STATEMENT) {
            Some(statement) => self.decryptor.decrypt_attributes(statement)?,
            None => {
                debug!("Successful response carries no attribute statement");
                IdinAttributes::new()
            }
        };
        Ok(TransactionStatus::success(attributes))
    }
}

impl<T: Transport> DirectoryClient for IdinClient<T> {
    async fn directory(&self) -> Result<Directory> {
        self.common.directory().await
    }
}
