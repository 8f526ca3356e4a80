//! Error types for the vault issuer
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the object, path, or cluster it concerns so that the
//! reconcile log line is enough to locate the failure.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for vault issuer operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// An object the workflow depends on does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Kind of the missing object (e.g. "Secret", "PerconaXtraDBCluster")
        kind: String,
        /// Namespace the object was looked up in
        namespace: String,
        /// Name of the object
        name: String,
    },

    /// A cluster resource is missing data the workflow needs
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Cluster identity (`name.namespace`)
        cluster: String,
        /// Description of what's invalid
        message: String,
    },

    /// The keyring config blob could not be parsed
    #[error("malformed vault config in secret {secret}: {message}")]
    MalformedConfig {
        /// Secret holding the config (`namespace/name`)
        secret: String,
        /// Description of what failed to parse
        message: String,
    },

    /// The private trust store could not be built
    #[error("trust setup failed: {message}")]
    TrustSetup {
        /// Description of what failed
        message: String,
    },

    /// Vault rejected the token
    #[error("vault rejected token during {operation}")]
    Unauthorized {
        /// Vault operation that was rejected
        operation: String,
    },

    /// A source cluster has not granted transition key access to the requester
    #[error("transition key transfer from {source_cluster} to {requester} is not allowed: {reason}")]
    NotAuthorized {
        /// Source cluster identity
        source_cluster: String,
        /// Requesting (destination) cluster identity
        requester: String,
        /// Why access was refused
        reason: String,
    },

    /// The source vault path has no backup keys to copy
    #[error("no transition keys found under {path}")]
    NoTransitionKeys {
        /// Vault path that was listed
        path: String,
    },

    /// Vault call failed without a more specific classification
    #[error("vault error during {operation}: {message}")]
    Vault {
        /// Vault operation that failed
        operation: String,
        /// Description of what failed
        message: String,
        /// HTTP status, when a response was received
        status: Option<u16>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },

    /// A reconcile workflow failed for one cluster
    #[error("{workflow} for {cluster}: {source}")]
    Workflow {
        /// Workflow that failed (e.g. "issue token")
        workflow: String,
        /// Cluster identity (`name.namespace`)
        cluster: String,
        /// The underlying failure
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not-found error for an object
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a validation error with cluster context
    pub fn validation_for(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a malformed-config error for a secret
    pub fn malformed_config(secret: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedConfig {
            secret: secret.into(),
            message: msg.into(),
        }
    }

    /// Create a trust setup error
    pub fn trust_setup(msg: impl Into<String>) -> Self {
        Self::TrustSetup {
            message: msg.into(),
        }
    }

    /// Create an unauthorized error for a vault operation
    pub fn unauthorized(operation: impl Into<String>) -> Self {
        Self::Unauthorized {
            operation: operation.into(),
        }
    }

    /// Create a not-authorized error for a transfer
    pub fn not_authorized(
        source_cluster: impl Into<String>,
        requester: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::NotAuthorized {
            source_cluster: source_cluster.into(),
            requester: requester.into(),
            reason: reason.into(),
        }
    }

    /// Create a no-transition-keys error for a vault path
    pub fn no_transition_keys(path: impl Into<String>) -> Self {
        Self::NoTransitionKeys { path: path.into() }
    }

    /// Create a vault error without an HTTP status
    pub fn vault(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Vault {
            operation: operation.into(),
            message: msg.into(),
            status: None,
        }
    }

    /// Create a vault error for an unexpected HTTP status
    pub fn vault_status(operation: impl Into<String>, status: u16) -> Self {
        Self::Vault {
            operation: operation.into(),
            message: format!("unexpected status {status}"),
            status: Some(status),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Wrap an error with the workflow and cluster it happened in
    pub fn in_workflow(workflow: impl Into<String>, cluster: impl Into<String>, source: Error) -> Self {
        Self::Workflow {
            workflow: workflow.into(),
            cluster: cluster.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, with workflow context stripped
    pub fn root(&self) -> &Error {
        match self {
            Error::Workflow { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the error means "the object does not exist"
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Workflow { source, .. } => source.is_not_found(),
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }

    /// Check if this error is expected to clear on its own
    ///
    /// Config, trust, and authorization failures need an operator to change
    /// something. Network and API failures are transient. Every error is still
    /// requeued at the fixed interval; this only drives log severity.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Vault { status, .. } => !matches!(status, Some(s) if (400..500).contains(s)),
            Error::NotFound { .. } => true,
            Error::Internal { .. } => true,
            Error::Workflow { source, .. } => source.is_retryable(),
            Error::Validation { .. }
            | Error::MalformedConfig { .. }
            | Error::TrustSetup { .. }
            | Error::Unauthorized { .. }
            | Error::NotAuthorized { .. }
            | Error::NoTransitionKeys { .. }
            | Error::Serialization { .. } => false,
        }
    }
}
