//! Error types for the search core.
//!
//! Lookup, validation, transport and decoding failures are typed so the
//! [`crate::search`] layer can map each kind onto the HTTP status and generic
//! message callers see. Details (record names, backend errors) are only ever
//! written to the log.

use thiserror::Error;

/// A configuration record needed by a query-id could not be found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no query connector binding registered for query id '{0}'")]
    MissingBinding(String),

    #[error("connector '{0}' is not configured and no 'solr' fallback exists")]
    MissingConnector(String),

    #[error("query definition '{0}' is not configured")]
    MissingQueryDefinition(String),

    #[error("connector '{connector}' is incomplete: {reason}")]
    IncompleteConnector { connector: String, reason: String },
}

/// The outbound call could not complete. HTTP error statuses are not
/// transport failures; they come back as a [`crate::backend::RawResponse`].
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {uri} timed out after {seconds}s")]
    Timeout { uri: String, seconds: u64 },

    #[error("request to {uri} failed: {source}")]
    Request {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read response body from {uri}: {source}")]
    Body {
        uri: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure of the search pipeline before a canonical response could be built.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no query parameter was found for search")]
    MissingQueryText,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to deserialize response body: {0}")]
    Normalization(String),
}

pub const MSG_CONFIGURATION: &str = "Bad Request. Query connector configuration not found.";
pub const MSG_MISSING_QUERY: &str = "Bad Request. No query parameter was found for search.";
pub const MSG_NO_RESPONSE: &str = "Bad Request. No response - Check connection details.";
pub const MSG_DESERIALIZE: &str = "An error occurred while deserializing the response body.";

impl SearchError {
    /// HTTP status surfaced to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            SearchError::Config(_) | SearchError::MissingQueryText | SearchError::Transport(_) => {
                400
            }
            SearchError::Normalization(_) => 412,
        }
    }

    /// Caller-facing message. Never names the missing record or the
    /// underlying transport failure.
    pub fn public_message(&self) -> &'static str {
        match self {
            SearchError::Config(_) => MSG_CONFIGURATION,
            SearchError::MissingQueryText => MSG_MISSING_QUERY,
            SearchError::Transport(_) => MSG_NO_RESPONSE,
            SearchError::Normalization(_) => MSG_DESERIALIZE,
        }
    }
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;
