//! In-memory XML element tree used for every outbound and inbound message.
//!
//! Names are kept exactly as written (`prefix:local`) and namespace
//! declarations stay ordinary attributes, so a parsed document serializes and
//! canonicalizes to the same bytes the sender signed. Lookups match on local
//! names only, the way the acquirer documents are addressed.

pub mod c14n;
mod element;

pub use element::{Element, Node};

/// Namespace of the `xml:` prefix, implicitly bound in every document
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Header prepended to every serialized document
pub const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML syntax error: {0}")]
    Syntax(String),

    #[error("XML document has no root element")]
    NoRoot,

    #[error("XML document has more than one root element")]
    MultipleRoots,

    #[error("Failed to write XML: {0}")]
    Write(String),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl Error {
    pub(crate) fn syntax(err: impl std::fmt::Display) -> Self {
        Error::Syntax(err.to_string())
    }

    pub(crate) fn write(err: impl std::fmt::Display) -> Self {
        Error::Write(err.to_string())
    }
}
