//! Process-wide configuration threaded into the controller context

use std::path::{Path, PathBuf};

use crate::Error;

/// Default location of a pre-provisioned root vault token
pub const DEFAULT_TOKEN_PATH: &str = "/etc/k8s-vault-issuer/token";

/// Environment variable overriding [`DEFAULT_TOKEN_PATH`]
pub const TOKEN_PATH_ENV: &str = "VAULT_TOKEN_FILEPATH";

/// Environment variable naming the root vault secret
pub const ROOT_SECRET_ENV: &str = "VAULT_SECRET_NAME";

/// Where the pod's own namespace is mounted
pub const SERVICE_ACCOUNT_NAMESPACE_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Identity of the operator's own root vault connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuerConfig {
    /// Namespace the operator runs in; holds the root vault secret
    pub namespace: String,
    /// Name of the secret holding the root keyring config
    pub root_vault_secret_name: String,
    /// File that may hold a root token taking precedence over the secret's
    pub token_file: PathBuf,
}

impl IssuerConfig {
    /// Create a config with the default token path
    pub fn new(namespace: impl Into<String>, root_vault_secret_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            root_vault_secret_name: root_vault_secret_name.into(),
            token_file: PathBuf::from(DEFAULT_TOKEN_PATH),
        }
    }

    /// Override the root token file
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = path.into();
        self
    }

    /// `namespace/name` of the root secret, for logs and errors
    pub fn root_secret_ref(&self) -> String {
        format!("{}/{}", self.namespace, self.root_vault_secret_name)
    }
}

/// Read the namespace the pod runs in from its service account mount
pub fn read_namespace_file(path: &Path) -> Result<String, Error> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::internal_with_context(
            "operator_namespace",
            format!("failed to read {}: {e}", path.display()),
        )
    })?;
    let namespace = raw.trim();
    if namespace.is_empty() {
        return Err(Error::internal_with_context(
            "operator_namespace",
            format!("{} is empty", path.display()),
        ));
    }
    Ok(namespace.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_to_standard_token_path() {
        let config = IssuerConfig::new("vault-issuer", "root-vault");
        assert_eq!(config.token_file, PathBuf::from(DEFAULT_TOKEN_PATH));
        assert_eq!(config.root_secret_ref(), "vault-issuer/root-vault");
    }

    #[test]
    fn reads_trimmed_namespace() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  vault-issuer  ").unwrap();
        assert_eq!(read_namespace_file(file.path()).unwrap(), "vault-issuer");
    }

    #[test]
    fn empty_namespace_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(read_namespace_file(file.path()).is_err());
    }

    #[test]
    fn missing_namespace_file_is_an_error() {
        assert!(read_namespace_file(Path::new("/nonexistent/namespace")).is_err());
    }
}
