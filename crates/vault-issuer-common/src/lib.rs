//! Common types for the vault issuer: CRD, keyring config, errors, and utilities

#![deny(missing_docs)]

pub mod annotations;
pub mod config;
pub mod crd;
pub mod error;
pub mod identity;
pub mod keyring;
pub mod kube_utils;
pub mod telemetry;

pub use config::IssuerConfig;
pub use error::Error;
pub use identity::ClusterIdentity;
pub use keyring::VaultConnectionDescriptor;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Fixed requeue interval for every reconcile outcome, success or failure
pub const REQUEUE_SECS: u64 = 5;

/// Field manager name used for writes made by this operator
pub const FIELD_MANAGER: &str = "k8s-vault-issuer";
