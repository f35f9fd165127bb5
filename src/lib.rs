//! # Skystack Library
//!
//! Skystack assembles cloud deployment topologies and talks to GraphQL
//! services. The crate splits into three areas:
//!
//! ## Stack assembly
//! [`stack`] turns a handful of environment parameters into a validated
//! resource graph and a portable template document. Three assemblers are
//! provided: a single function ([`function_stack`]), a function fronted by
//! an HTTP API ([`http_api_stack`]), and a full multi-tier content
//! deployment with database, shared filesystem, and load balancer
//! ([`content_stack`]). Network ranges are sliced deterministically from
//! the parent CIDR, highest block first, so an address plan survives
//! re-assembly unchanged.
//!
//! ## GraphQL clients
//! [`client`] provides a blocking session ([`BlockingSession`]) and an
//! async session ([`Session`]) over the same lifecycle: build the
//! transport from the environment, introspect the schema once, build
//! typed queries against it, execute, close. Transport-level faults are
//! retried under exponential backoff ([`RetryPolicy`]); application-level
//! `errors` responses are returned to the caller untouched.
//!
//! ## Configuration
//! [`config`] reads everything from the environment: stack parameters for
//! the assemblers and endpoint/TLS/proxy/credential settings for the
//! clients.

pub mod client;
pub mod config;
pub mod stack;

// Flat re-exports so callers can import from the crate root instead of
// navigating the module hierarchy.
pub use client::{
    retry, ArgValue, BlockingSession, ClientError, ClientResult, Fragment, QueryBuilder,
    QueryDocument, RetryPolicy, SchemaIndex, Selection, Session, SessionState,
};
pub use config::{ClientConfig, ConfigError, ProxyConfig, StackParams, TlsMode, TransportLimits};
pub use stack::{
    content_stack, function_stack, http_api_stack, CidrBlock, Resource, ResourceGraph, StackError,
    StackResult, Template,
};
