//! Transition key transfer between clusters
//!
//! The transfer annotation lists source clusters as `name.namespace`
//! tokens. Each token is an independent unit of work: a failed source
//! does not stop its siblings, and only the sources still outstanding are
//! written back to the annotation. An empty outstanding set removes it.
//!
//! Authorization is read from the source cluster on every attempt, so a
//! source can revoke access between retries.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use vault_issuer_common::annotations::{
    AnnotationPatch, ALLOW_ANY, ALLOW_TRANSFER_ANNOTATION, TRANSFER_KEYS_ANNOTATION,
};
use vault_issuer_common::crd::PerconaXtraDBCluster;
use vault_issuer_common::keyring::SECRET_MOUNT_POINT;
use vault_issuer_common::{ClusterIdentity, Error, IssuerConfig};

use crate::resolver::VaultConfigResolver;
use crate::store::ClusterStore;
use crate::vault::{VaultApi, VaultConnector};

/// Sub-path holding backup keys under a cluster's mount point
pub const BACKUP_SUBPATH: &str = "backup";

/// Progress of one source in a transfer request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkState {
    /// Not attempted yet in this pass
    Pending,
    /// Being copied
    InProgress,
    /// Keys copied
    Done,
    /// Attempted and failed
    Failed(String),
    /// Token is not a `name.namespace` pair
    Invalid,
}

impl WorkState {
    /// Whether the token must stay in the annotation for another pass
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Invalid)
    }
}

/// One token of a transfer request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    /// Token as written in the annotation; trimmed unless invalid
    pub token: String,
    /// Parsed source, absent for invalid tokens
    pub source: Option<ClusterIdentity>,
    /// Current state
    pub state: WorkState,
}

/// Per-source bookkeeping for one transfer pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferLedger {
    items: Vec<WorkItem>,
}

impl TransferLedger {
    /// Parse a comma-separated source list
    ///
    /// Blank tokens are dropped and valid ones trimmed. Tokens that are not
    /// `name.namespace` pairs are kept as [`WorkState::Invalid`] exactly as
    /// written, so the operator sees their own text back.
    pub fn parse(value: &str) -> Self {
        let items = value
            .split(',')
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| match raw.trim().parse::<ClusterIdentity>() {
                Ok(source) => WorkItem {
                    token: raw.trim().to_string(),
                    source: Some(source),
                    state: WorkState::Pending,
                },
                Err(e) => {
                    warn!(token = %raw, error = %e, "invalid transfer source");
                    WorkItem {
                        token: raw.to_string(),
                        source: None,
                        state: WorkState::Invalid,
                    }
                }
            })
            .collect();
        Self { items }
    }

    /// Tokens currently being copied
    pub fn in_progress(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| i.state == WorkState::InProgress)
            .map(|i| i.token.as_str())
            .collect()
    }

    /// All items in request order
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Tokens still needing work, in request order
    pub fn outstanding(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| i.state.is_outstanding())
            .map(|i| i.token.as_str())
            .collect()
    }

    /// Tokens whose keys were copied
    pub fn completed(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| i.state == WorkState::Done)
            .map(|i| i.token.as_str())
            .collect()
    }

    /// Annotation mutation recording this ledger, guarded on `observed`
    pub fn to_patch(&self, observed: &str) -> AnnotationPatch {
        let outstanding = self.outstanding();
        if outstanding.is_empty() {
            AnnotationPatch::remove(TRANSFER_KEYS_ANNOTATION, Some(observed))
        } else {
            AnnotationPatch::replace(
                TRANSFER_KEYS_ANNOTATION,
                Some(observed),
                outstanding.join(","),
            )
        }
    }
}

impl fmt::Display for TransferLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} done, {} in progress, {} outstanding",
            self.completed().len(),
            self.in_progress().len(),
            self.outstanding().len()
        )
    }
}

/// Check a source's allow annotation against the requester
pub fn check_allowed(
    source: &ClusterIdentity,
    allow: Option<&str>,
    requester: &ClusterIdentity,
) -> Result<(), Error> {
    let Some(allow) = allow else {
        return Err(Error::not_authorized(
            source.to_string(),
            requester.to_string(),
            format!("no {ALLOW_TRANSFER_ANNOTATION} annotation"),
        ));
    };
    if allow.trim() == ALLOW_ANY {
        return Ok(());
    }
    let requester = requester.to_string();
    if allow.split(',').map(str::trim).any(|t| t == requester) {
        return Ok(());
    }
    Err(Error::not_authorized(
        source.to_string(),
        requester,
        "requester is not in the allow list",
    ))
}

fn backup_path(mount_point: &str) -> String {
    format!("{}/{BACKUP_SUBPATH}", mount_point.trim_end_matches('/'))
}

/// Copies transition keys into a destination cluster's vault path
#[derive(Clone)]
pub struct TransitionKeyTransferor {
    store: Arc<dyn ClusterStore>,
    resolver: VaultConfigResolver,
    connector: Arc<dyn VaultConnector>,
    config: IssuerConfig,
}

impl TransitionKeyTransferor {
    /// Create a transferor
    pub fn new(
        store: Arc<dyn ClusterStore>,
        connector: Arc<dyn VaultConnector>,
        config: IssuerConfig,
    ) -> Self {
        Self {
            resolver: VaultConfigResolver::new(store.clone()),
            store,
            connector,
            config,
        }
    }

    /// Run every source in `request` and record the outcome on `destination`
    ///
    /// Per-source failures are recorded in the returned ledger. Only a
    /// failure to write the annotation is returned as an error.
    pub async fn transfer(
        &self,
        destination: &PerconaXtraDBCluster,
        request: &str,
    ) -> Result<TransferLedger, Error> {
        let dest_id = destination.identity();
        let mut ledger = TransferLedger::parse(request);

        for idx in 0..ledger.items.len() {
            let Some(source) = ledger.items[idx].source.clone() else {
                continue;
            };
            ledger.items[idx].state = WorkState::InProgress;
            debug!(
                cluster = %dest_id,
                source = %source,
                ledger = %ledger,
                "transferring transition keys"
            );
            ledger.items[idx].state = match self.transfer_one(&source, destination).await {
                Ok(copied) => {
                    info!(
                        cluster = %dest_id,
                        source = %source,
                        keys = copied,
                        "transition keys transferred"
                    );
                    WorkState::Done
                }
                Err(e) => {
                    warn!(
                        cluster = %dest_id,
                        source = %source,
                        error = %e,
                        "transition key transfer failed"
                    );
                    WorkState::Failed(e.to_string())
                }
            };
        }

        self.store
            .patch_annotation(&dest_id, &ledger.to_patch(request))
            .await?;
        debug!(cluster = %dest_id, ledger = %ledger, "transfer annotation updated");
        Ok(ledger)
    }

    /// Copy every backup key of `source` into `destination`; returns the count
    async fn transfer_one(
        &self,
        source: &ClusterIdentity,
        destination: &PerconaXtraDBCluster,
    ) -> Result<usize, Error> {
        let source_cluster = self
            .store
            .get_cluster(source)
            .await?
            .ok_or_else(|| {
                Error::not_found("PerconaXtraDBCluster", &source.namespace, &source.name)
            })?;
        check_allowed(
            source,
            source_cluster.annotation(ALLOW_TRANSFER_ANNOTATION),
            &destination.identity(),
        )?;

        let source_conf = self.resolver.resolve_cluster(&source_cluster).await?;
        let dest_conf = self.resolver.resolve_cluster(destination).await?;
        let root = self.resolver.resolve_root(&self.config).await?;
        let vault = self.connector.connect(&root)?;

        let from = backup_path(source_conf.require(&source.to_string(), SECRET_MOUNT_POINT)?);
        let to = backup_path(
            dest_conf.require(&destination.identity().to_string(), SECRET_MOUNT_POINT)?,
        );
        copy_backup_keys(vault.as_ref(), &from, &to).await
    }
}

/// Copy every entry listed under `from` to the same id under `to`
async fn copy_backup_keys(vault: &dyn VaultApi, from: &str, to: &str) -> Result<usize, Error> {
    let ids = match vault.list(&format!("{from}/")).await? {
        Some(ids) if !ids.is_empty() => ids,
        _ => return Err(Error::no_transition_keys(from)),
    };

    for id in &ids {
        let source_path = format!("{from}/{id}");
        let data = vault.read(&source_path).await?.ok_or_else(|| {
            Error::vault("read", format!("{source_path} disappeared during transfer"))
        })?;
        vault.write(&format!("{to}/{id}"), &data).await?;
        debug!(from = %source_path, to = %to, "copied transition key");
    }
    Ok(ids.len())
}
