use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::crypto::Certificate;
use crate::dsig::{SignatureVerifier, Signer, SigningIdentity};
use crate::error::{Error, Result};
use crate::message::{MessageBuilder, Merchant, Variant};
use crate::response::{self, Directory};
use crate::status::{Status, StatusDecoder};
use crate::transport::Transport;
use crate::xml::Element;

/// Everything a merchant needs to talk to its acquirer
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub merchant: Merchant,
    /// Key and certificate used to sign requests
    pub signing: SigningIdentity,
    /// Pinned certificate the acquirer signs its responses with
    pub acquirer_certificate: Certificate,
}

/// Functionality shared by the iDEAL and iDIN clients
pub trait DirectoryClient {
    /// Fetch the list of participating issuers.
    ///
    /// The acquirer limits how often this may be called, so callers should
    /// cache the result.
    fn directory(&self) -> impl Future<Output = Result<Directory>> + Send;
}

/// Request pipeline common to both protocol variants.
///
/// Requests are signed with the merchant key and responses checked against
/// the pinned acquirer certificate unless another [`Signer`] or
/// [`SignatureVerifier`] is plugged in.
#[derive(Debug, Clone)]
pub struct CommonClient<T> {
    variant: Variant,
    identity: ClientIdentity,
    transport: T,
    signer: Arc<dyn Signer>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl<T: Transport> CommonClient<T> {
    pub fn new(variant: Variant, identity: ClientIdentity, transport: T) -> Self {
        let signer: Arc<dyn Signer> = Arc::new(identity.signing.clone());
        let verifier: Arc<dyn SignatureVerifier> = Arc::new(identity.acquirer_certificate.clone());
        Self {
            variant,
            identity,
            transport,
            signer,
            verifier,
        }
    }

    /// Sign requests with `signer`, e.g. a key held in an HSM
    pub fn with_signer(mut self, signer: impl Signer + 'static) -> Self {
        self.signer = Arc::new(signer);
        self
    }

    pub fn with_verifier(mut self, verifier: impl SignatureVerifier + 'static) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn message_builder(&self) -> MessageBuilder<'_> {
        MessageBuilder::new(self.variant, &self.identity.merchant)
    }

    /// Sign `message`, send it and return the validated response root with
    /// its signature removed.
    ///
    /// Error envelopes are recognized before any signature check since they
    /// may be unsigned.
    #[instrument(skip_all, fields(variant = %self.variant, request = message.name()))]
    pub async fn exchange(&self, message: &Element) -> Result<Element> {
        let signed = self.signer.sign(message).map_err(Error::Signing)?;

        debug!("Sending request");
        let body = self.transport.post(signed).await?;
        let document = Element::parse(&body)?;

        if let Some(error) = response::acquirer_error(&document) {
            warn!(
                code = %error.error_code,
                message = %error.error_message,
                detail = %error.error_detail,
                "Acquirer returned an error"
            );
            return Err(Error::Acquirer(error));
        }

        self.verifier.verify(&document).map_err(|e| {
            warn!(error = %e, response = document.name(), "Rejected response signature");
            Error::InvalidSignature(e)
        })
    }

    #[instrument(skip(self))]
    pub async fn directory(&self) -> Result<Directory> {
        let message = self.message_builder().directory_request(Utc::now());
        let response = self.exchange(&message).await?;
        let directory = response::parse_directory(&response)?;
        info!(issuers = directory.iter().count(), "Fetched directory");
        Ok(directory)
    }

    /// Request the status of a transaction and decode it, after making sure
    /// the response is about that same transaction.
    pub(crate) async fn status_response<D: StatusDecoder>(
        &self,
        transaction_id: &str,
        decoder: &D,
    ) -> Result<(Status, Element)> {
        let message = self
            .message_builder()
            .status_request(transaction_id, Utc::now())?;
        let response = self.exchange(&message).await?;

        response::check_transaction_id(&response, transaction_id)?;
        let status = decoder.decode(&response)?;
        info!(transaction_id, %status, "Fetched transaction status");
        Ok((status, response))
    }
}
