use reqwest::StatusCode;
use thiserror::Error;

/// Errors produced by the shepherd core.  Per-target Redfish failures are
/// carried on the target records instead; this type covers the failures that
/// abort a whole operation plus the request-validation cases the API layer
/// maps onto 4xx codes.
#[derive(Debug, Error)]
pub enum ShepherdError {
    #[error("state manager request failed: {0}")]
    Inventory(String),

    #[error("secure store operation failed for '{key}': {detail}")]
    SecureStore { key: String, detail: String },

    #[error("secure store access is disabled")]
    SecureStoreDisabled,

    #[error("invalid component name '{0}'")]
    BadXname(String),

    #[error("'{0}' is not the name of a node")]
    NotANode(String),

    #[error("hardware at '{0}' is not a supported vendor")]
    UnsupportedHardware(String),

    #[error("invalid certificate domain '{0}'")]
    InvalidDomain(String),

    #[error("target '{xname}' in bad state: {state}")]
    TargetState { xname: String, state: String },

    #[error("no valid targets")]
    NoValidTargets,

    #[error("no system matches node '{xname}', known system URIs: {known:?}")]
    SystemNotFound { xname: String, known: Vec<String> },

    #[error("BIOS attribute '{name}' does not allow value '{value}'")]
    ValueNotAllowed { name: String, value: String },

    #[error("'{0}' not supported in the BIOS")]
    AttributeNotSupported(String),

    #[error("{0}")]
    NotImplemented(String),

    #[error("target(s) had no matching Redfish account")]
    NoMatchingAccount,

    #[error("bad return code from '{url}': {code}")]
    BadStatus { url: String, code: u16 },

    #[error("response from '{url}' has no body")]
    MissingResponse { url: String },

    #[error("problem decoding response from '{url}': {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl ShepherdError {
    /// HTTP status the API layer reports for this failure.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ShepherdError::BadXname(_)
            | ShepherdError::NotANode(_)
            | ShepherdError::UnsupportedHardware(_)
            | ShepherdError::InvalidDomain(_)
            | ShepherdError::NoValidTargets => StatusCode::BAD_REQUEST,
            ShepherdError::SecureStoreDisabled => StatusCode::GONE,
            ShepherdError::SystemNotFound { .. } => StatusCode::NOT_FOUND,
            ShepherdError::ValueNotAllowed { .. }
            | ShepherdError::AttributeNotSupported(_) => StatusCode::METHOD_NOT_ALLOWED,
            ShepherdError::TargetState { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ShepherdError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShepherdError>;
