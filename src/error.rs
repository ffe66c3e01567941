//! Defines the crate's primary error type `Error` and a convenience `Result` alias.
//!
//! Uses the `thiserror` crate for ergonomic error definition and provides `From`
//! implementations to convert common external errors into `Error` variants.
//! Errors that do not implement `Clone` are wrapped in `Arc` to allow `Error` to be cloneable.

use std::sync::Arc;
use thiserror::Error as ThisError;

/// The primary error enumeration for all client-side and service-side failures.
#[derive(ThisError, Debug, Clone)]
pub enum Error {
    /// Transport-level failure from the HTTP client (`reqwest`).
    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),

    /// The service answered with a non-success HTTP status code.
    #[error("service at {url} returned HTTP status {status}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    /// The response body is not well-formed XML (`roxmltree`).
    #[error("XML error: {0}")]
    Xml(Arc<roxmltree::Error>),

    /// The XML is well-formed but not a usable VOTable / UWS / VOSI document.
    #[error("malformed document: {0}")]
    Votable(String),

    /// The service executed the request and reported `QUERY_STATUS = ERROR`.
    #[error("service error: {0}")]
    Service(String),

    /// An asynchronous job finished in the `ERROR` phase. The message comes
    /// from the UWS error summary, `error_type` is `transient` or `fatal`.
    #[error("job error ({error_type}): {message}")]
    Job { message: String, error_type: String },

    /// A job operation was attempted in a phase that does not allow it.
    #[error("job is in phase {actual}, operation requires {expected}")]
    WrongPhase { expected: String, actual: String },

    /// `wait_timeout` gave up before the job reached a terminal phase.
    #[error("timed out waiting for job completion (last phase: {0})")]
    JobTimeout(String),

    /// A record accessor referenced a column the result table does not have.
    #[error("no such column: {0}")]
    NoSuchColumn(String),

    /// Error while parsing or joining a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Error related to standard I/O operations.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Error related to accessing environment variables.
    #[error("environment error: {0}")]
    Env(#[from] std::env::VarError),

    /// Error while serializing results to JSON (`serde_json`). Wrapped in
    /// Arc as serde_json::Error is not Clone.
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    /// Error specific to CLI logic or argument handling.
    #[error("CLI error: {0}")]
    Cli(String),

    /// Error related to progress bar style templating (`indicatif`).
    #[error("progress style template error: {0}")]
    Template(Arc<indicatif::style::TemplateError>),
}

/// A specialized `Result` type using the crate's `Error`.
pub type Result<T> = std::result::Result<T, Error>;

// --- From implementations ---
// These allow easy conversion from external error types into Error
// using the `?` operator. Arc is used for non-Clone error types.

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(Arc::new(err))
    }
}

impl From<roxmltree::Error> for Error {
    fn from(err: roxmltree::Error) -> Self {
        Error::Xml(Arc::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<indicatif::style::TemplateError> for Error {
    fn from(err: indicatif::style::TemplateError) -> Self {
        Error::Template(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(Arc::new(err))
    }
}
