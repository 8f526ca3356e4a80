//! Vault token issuance and transition key transfer for database clusters
//!
//! This crate provides the reconcile loop for PerconaXtraDBCluster resources.
//!
//! Related crates:
//! - `vault-issuer-common`: CRD, keyring config codec, errors, telemetry
//! - `vault-issuer-operator`: the binary wiring this controller to the cluster

pub mod controller;
pub mod issuer;
pub mod resolver;
pub mod store;
pub mod transfer;
pub mod vault;

#[cfg(test)]
mod testing;

// Re-export controller types
pub use controller::{error_policy, reconcile, requeue_interval, Context};
pub use issuer::{IssueOutcome, TokenIssuer};
pub use resolver::VaultConfigResolver;
pub use store::{ClusterStore, KubeClusterStore};
pub use transfer::{TransferLedger, TransitionKeyTransferor, WorkState};
pub use vault::{HttpVaultConnector, VaultApi, VaultClient, VaultConnector};

// Re-export common error types
pub use vault_issuer_common::{Error, Result};
