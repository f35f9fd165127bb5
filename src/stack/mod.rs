//! Stack-topology assembler.
//!
//! Builds an in-memory resource graph (network, storage, database, compute,
//! logging, load balancing, access control) from environment-sourced
//! parameters and renders it as a deployment template for the external
//! provisioning engine. Construction is pure: no network calls, no side
//! effects beyond the graph itself. Provisioning, drift detection and
//! teardown belong to the engine, not to this crate.

pub mod cidr;
pub mod content;
pub mod function;
pub mod graph;
pub mod http_api;
pub mod resources;
pub mod template;
pub mod validate;

pub use cidr::CidrBlock;
pub use content::content_stack;
pub use function::function_stack;
pub use graph::{Bootstrap, Grant, GrantAction, Output, ResourceGraph};
pub use http_api::http_api_stack;
pub use resources::Resource;
pub use template::Template;

use thiserror::Error;

/// Errors raised while assembling or validating a resource graph.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Invalid CIDR block '{0}'")]
    InvalidCidr(String),

    #[error("Cannot split a /{parent} block into /{child} children")]
    MaskOverflow { parent: u8, child: u8 },

    #[error("Subnet index {index} out of range, parent only holds {count} blocks")]
    SubnetIndex { index: u32, count: u32 },

    #[error("Address space exhausted: {zones} zones but only {available} blocks")]
    AddressSpaceExhausted { zones: usize, available: u32 },

    #[error("Duplicate resource id: {0}")]
    DuplicateResource(String),

    #[error("Stack already carries encryption key '{existing}', a second key is not allowed")]
    SecondEncryptionKey { existing: String },

    #[error("Resource '{from}' depends on unknown resource '{to}'")]
    UnknownDependency { from: String, to: String },

    #[error("Topology validation failed:\n  {}", violations.join("\n  "))]
    Validation { violations: Vec<String> },

    #[error("Malformed template document: {0}")]
    MalformedTemplate(#[from] serde_json::Error),
}

/// Result type for stack assembly operations.
pub type StackResult<T> = Result<T, StackError>;
