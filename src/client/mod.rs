//! Query-client session manager.
//!
//! Resolves transport configuration once, opens a session, introspects the
//! remote schema a single time, and exposes a typed query builder over it.
//! A synchronous (blocking) and an asynchronous session exist; the
//! asynchronous one is wrapped by [`retry::RetryPolicy`] combinators with
//! independent connect and execute policies.

pub mod query;
pub mod retry;
pub mod schema;
pub mod session;
pub mod transport;

pub use query::{ArgValue, Fragment, QueryBuilder, QueryDocument, Selection};
pub use retry::{retry, RetryPolicy};
pub use schema::SchemaIndex;
pub use session::{BlockingSession, Session, SessionState};
pub use transport::{BlockingTransport, HttpTransport, QueryTransport, ResponseEnvelope};

use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::ConfigError;

/// Failure taxonomy for the query clients.
///
/// Transport faults are retryable; an application-level query error means
/// the endpoint executed the request and rejected it, and is never retried.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Query returned errors: {errors}; response headers: {headers:?}")]
    Query {
        errors: serde_json::Value,
        headers: BTreeMap<String, String>,
    },

    #[error("Failed to build query: {0}")]
    QueryBuild(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Session has no schema yet, introspection has not run")]
    SchemaMissing,
}

impl ClientError {
    /// Whether this is a well-formed application-level query error, as
    /// opposed to a transport fault. Application errors are surfaced
    /// immediately, never retried.
    pub fn is_application_error(&self) -> bool {
        matches!(self, ClientError::Query { .. })
    }
}

/// Result type for query-client operations.
pub type ClientResult<T> = Result<T, ClientError>;
