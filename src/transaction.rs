use tracing::{info, instrument, warn};

use crate::client::CommonClient;
use crate::error::Result;
use crate::response::{self, TransactionStarted};
use crate::transport::Transport;
use crate::xml::Element;

#[derive(Debug, Clone)]
enum State {
    Created,
    Started(TransactionStarted),
}

/// One payment or identification, from creation until it has been started
/// at the acquirer.
///
/// The request is built when the handle is created; [`Transaction::start`]
/// sends it. Polling the status afterwards goes through the client with the
/// transaction ID and never touches the handle.
#[derive(Debug)]
pub struct Transaction<'c, T> {
    client: &'c CommonClient<T>,
    message: Element,
    correlation_id: String,
    state: State,
}

impl<'c, T: Transport> Transaction<'c, T> {
    pub(crate) fn new(
        client: &'c CommonClient<T>,
        message: Element,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            message,
            correlation_id: correlation_id.into(),
            state: State::Created,
        }
    }

    /// Send the transaction request and record the identifiers assigned by
    /// the acquirer.
    ///
    /// Store the transaction ID right away: every started transaction has to
    /// be followed up with status requests until it is final.
    #[instrument(skip(self), fields(correlation_id = %self.correlation_id))]
    pub async fn start(&mut self) -> Result<()> {
        if let State::Started(started) = &self.state {
            warn!(
                transaction_id = %started.transaction_id,
                "Transaction was already started, sending it again"
            );
        }

        let response = self.client.exchange(&self.message).await?;
        let started = response::parse_transaction_start(&response)?;
        info!(transaction_id = %started.transaction_id, "Transaction started");

        self.state = State::Started(started);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        matches!(self.state, State::Started(_))
    }

    /// ID assigned by the acquirer, once started
    pub fn transaction_id(&self) -> Option<&str> {
        match &self.state {
            State::Started(started) => Some(&started.transaction_id),
            State::Created => None,
        }
    }

    /// Caller-chosen value tying the transaction to the merchant's records:
    /// the purchase ID for iDEAL, the `AuthnRequest` ID for iDIN
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Where to redirect the consumer, once started
    pub fn issuer_authentication_url(&self) -> Option<&str> {
        match &self.state {
            State::Started(started) => Some(&started.issuer_authentication_url),
            State::Created => None,
        }
    }

    /// The unsigned request document
    pub fn message(&self) -> &Element {
        &self.message
    }
}
