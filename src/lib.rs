//! Merchant side of the iDEAL and iDIN acquirer protocols: signed request
//! construction, response validation and status interpretation.

pub mod client;
pub mod config;
pub mod crypto;
pub mod dsig;
pub mod error;
pub mod ideal;
pub mod idin;
pub mod message;
pub mod response;
pub mod status;
pub mod telemetry;
pub mod transaction;
pub mod transport;
pub mod xml;
pub mod xmlenc;

pub use client::{ClientIdentity, CommonClient, DirectoryClient};
pub use error::{AcquirerError, Error, Result};
pub use ideal::{IdealClient, IdealPayment, IdealTransactionStatus};
pub use idin::{IdinAttributes, IdinClient, IdinTransactionStatus};
pub use message::{IdealTransactionRequest, IdinTransactionRequest, Merchant, ServiceId, Variant};
pub use response::{Directory, Issuer};
pub use status::{Status, TransactionStatus};
pub use transaction::Transaction;
pub use transport::{HttpTransport, Transport, TransportError};
