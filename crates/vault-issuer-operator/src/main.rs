//! Vault issuer operator - Vault tokens and transition keys for database clusters

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::Api;

use vault_issuer_common::config::{
    read_namespace_file, DEFAULT_TOKEN_PATH, ROOT_SECRET_ENV, SERVICE_ACCOUNT_NAMESPACE_PATH,
    TOKEN_PATH_ENV,
};
use vault_issuer_common::crd::PerconaXtraDBCluster;
use vault_issuer_common::kube_utils::create_client;
use vault_issuer_common::telemetry::{init_telemetry, TelemetryConfig};
use vault_issuer_common::IssuerConfig;
use vault_issuer_controller::{error_policy, reconcile, Context};

/// Watcher timeout in seconds; must stay below the client read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Issues scoped Vault tokens and moves transition keys between clusters
#[derive(Parser, Debug)]
#[command(name = "vault-issuer", version, about, long_about = None)]
struct Cli {
    /// Namespace holding the root vault secret (defaults to the pod's namespace)
    #[arg(long, env = "POD_NAMESPACE")]
    namespace: Option<String>,

    /// Name of the secret holding the root keyring config
    #[arg(long, env = ROOT_SECRET_ENV)]
    vault_secret_name: String,

    /// File holding a root token that overrides the secret's token
    #[arg(long, env = TOKEN_PATH_ENV, default_value = DEFAULT_TOKEN_PATH)]
    token_file: PathBuf,

    /// Kubeconfig to use instead of in-cluster config
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Maximum number of clusters reconciled at once
    #[arg(long, default_value_t = 4)]
    concurrency: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // aws-lc-rs for every TLS client in the process (kube and vault)
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();
    init_telemetry(TelemetryConfig::default())?;
    run_controller(cli).await
}

async fn run_controller(cli: Cli) -> anyhow::Result<()> {
    let namespace = match cli.namespace {
        Some(ns) if !ns.is_empty() => ns,
        _ => read_namespace_file(Path::new(SERVICE_ACCOUNT_NAMESPACE_PATH))?,
    };
    let config = IssuerConfig::new(namespace, cli.vault_secret_name).with_token_file(cli.token_file);
    tracing::info!(
        root_secret = %config.root_secret_ref(),
        token_file = %config.token_file.display(),
        concurrency = cli.concurrency,
        "starting vault issuer"
    );

    let client = create_client(cli.kubeconfig.as_deref()).await?;
    let clusters: Api<PerconaXtraDBCluster> = Api::all(client.clone());
    let ctx = Arc::new(Context::new(client, config));

    Controller::new(clusters, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .with_config(ControllerConfig::default().concurrency(cli.concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(cluster = %obj.name, ?action, "reconciliation completed");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("vault issuer shut down");
    Ok(())
}
