//! PerconaXtraDBCluster reconciliation
//!
//! Each pass re-reads the cluster and runs the issue and transfer workflows
//! for whichever trigger annotations are present. Both run even if the other
//! fails. Every outcome requeues at the same fixed interval.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::Client;
use tracing::{debug, error, info, instrument, warn};

use vault_issuer_common::annotations::{AnnotationPatch, ISSUE_TOKEN_ANNOTATION};
use vault_issuer_common::crd::PerconaXtraDBCluster;
use vault_issuer_common::{Error, IssuerConfig, REQUEUE_SECS};

use crate::issuer::{IssueOutcome, TokenIssuer};
use crate::store::{ClusterStore, KubeClusterStore};
use crate::transfer::TransitionKeyTransferor;
use crate::vault::{HttpVaultConnector, VaultConnector};

/// Requeue interval used for success and failure alike
pub fn requeue_interval() -> Duration {
    Duration::from_secs(REQUEUE_SECS)
}

/// Shared context for the cluster controller
pub struct Context {
    /// Object store access (trait object for testability)
    pub store: Arc<dyn ClusterStore>,
    /// Issue-token workflow
    pub issuer: TokenIssuer,
    /// Transfer-keys workflow
    pub transferor: TransitionKeyTransferor,
}

impl Context {
    /// Create a context backed by the cluster API and HTTP vault clients
    pub fn new(client: Client, config: IssuerConfig) -> Self {
        Self::from_parts(
            Arc::new(KubeClusterStore::new(client)),
            Arc::new(HttpVaultConnector::default()),
            config,
        )
    }

    fn from_parts(
        store: Arc<dyn ClusterStore>,
        connector: Arc<dyn VaultConnector>,
        config: IssuerConfig,
    ) -> Self {
        Self {
            issuer: TokenIssuer::new(store.clone(), connector.clone(), config.clone()),
            transferor: TransitionKeyTransferor::new(store.clone(), connector, config),
            store,
        }
    }

    /// Create a context for testing with fake or mock collaborators
    #[cfg(test)]
    pub fn for_testing(
        store: Arc<dyn ClusterStore>,
        connector: Arc<dyn VaultConnector>,
        config: IssuerConfig,
    ) -> Self {
        Self::from_parts(store, connector, config)
    }
}

/// Reconcile one cluster
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.identity()))]
pub async fn reconcile(
    cluster: Arc<PerconaXtraDBCluster>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let id = cluster.identity();
    let cluster = ctx
        .store
        .get_cluster(&id)
        .await?
        .ok_or_else(|| Error::not_found("PerconaXtraDBCluster", &id.namespace, &id.name))?;

    let issued = match cluster.issue_request() {
        Some(observed) => issue_and_clear(&ctx, &cluster, observed)
            .await
            .map_err(|e| Error::in_workflow("issue token", id.to_string(), e)),
        None => Ok(()),
    };

    let transferred = match cluster.transfer_request() {
        Some(request) => ctx
            .transferor
            .transfer(&cluster, request)
            .await
            .map(|ledger| {
                info!(cluster = %id, ledger = %ledger, "transfer pass finished");
            })
            .map_err(|e| Error::in_workflow("transfer keys", id.to_string(), e)),
        None => Ok(()),
    };

    match (issued, transferred) {
        (Err(issue_err), Err(transfer_err)) => {
            warn!(cluster = %id, error = %transfer_err, "transfer pass failed");
            return Err(issue_err);
        }
        (issued, transferred) => {
            issued?;
            transferred?;
        }
    }
    debug!(cluster = %id, "reconcile complete");
    Ok(Action::requeue(requeue_interval()))
}

async fn issue_and_clear(
    ctx: &Context,
    cluster: &PerconaXtraDBCluster,
    observed: &str,
) -> Result<(), Error> {
    let outcome = ctx.issuer.issue(cluster).await?;
    if outcome == IssueOutcome::AlreadyIssued {
        debug!(cluster = %cluster.identity(), "token already issued, clearing trigger");
    }
    ctx.store
        .patch_annotation(
            &cluster.identity(),
            &AnnotationPatch::remove(ISSUE_TOKEN_ANNOTATION, Some(observed)),
        )
        .await
}

/// Error policy for the cluster controller
pub fn error_policy(
    cluster: Arc<PerconaXtraDBCluster>,
    error: &Error,
    _ctx: Arc<Context>,
) -> Action {
    if error.is_retryable() {
        warn!(error = %error, cluster = %cluster.identity(), "reconciliation failed, will retry");
    } else {
        error!(
            error = %error,
            cluster = %cluster.identity(),
            "reconciliation failed, needs operator attention"
        );
    }
    Action::requeue(requeue_interval())
}
