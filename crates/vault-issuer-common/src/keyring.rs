//! Keyring vault config: the `key = value` blob stored in opaque secrets
//!
//! The same format is read from the operator's root secret, from every
//! tenant secret, and written when a tenant token is issued.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use tracing::debug;

use crate::Error;

/// Secret field holding the `key = value` config blob
pub const KEYRING_CONF_KEY: &str = "keyring_vault.conf";
/// Secret field holding optional PEM CA bytes
pub const CA_CERT_KEY: &str = "ca.cert";

/// Vault server address
pub const VAULT_URL: &str = "vault_url";
/// Vault token
pub const TOKEN: &str = "token";
/// Secret mount point, i.e. the path prefix this config is scoped to
pub const SECRET_MOUNT_POINT: &str = "secret_mount_point";
/// Path of the CA file as seen by the database pods
pub const VAULT_CA: &str = "vault_ca";

/// Connection settings parsed from one secret
///
/// Built fresh on every resolution; the backing secret may change between
/// reconciles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VaultConnectionDescriptor {
    /// PEM CA bytes to trust in addition to the platform roots
    pub certificate: Option<Vec<u8>>,
    /// Parsed `key = value` pairs
    pub config: BTreeMap<String, String>,
}

impl VaultConnectionDescriptor {
    /// Parse from a secret's data map
    ///
    /// `secret` is only used for error messages (`namespace/name`).
    pub fn from_secret_data(
        secret: &str,
        data: Option<&BTreeMap<String, ByteString>>,
    ) -> Result<Self, Error> {
        let conf = data
            .and_then(|d| d.get(KEYRING_CONF_KEY))
            .ok_or_else(|| {
                Error::malformed_config(secret, format!("missing {KEYRING_CONF_KEY} field"))
            })?;
        let text = std::str::from_utf8(&conf.0).map_err(|e| {
            Error::malformed_config(secret, format!("{KEYRING_CONF_KEY} is not UTF-8: {e}"))
        })?;

        Ok(Self {
            certificate: data
                .and_then(|d| d.get(CA_CERT_KEY))
                .map(|ca| ca.0.clone()),
            config: parse_keyring_conf(secret, text)?,
        })
    }

    /// Render into a secret's data map
    pub fn to_secret_data(&self) -> BTreeMap<String, ByteString> {
        let mut data = BTreeMap::new();
        data.insert(
            KEYRING_CONF_KEY.to_string(),
            ByteString(render_keyring_conf(&self.config).into_bytes()),
        );
        if let Some(ref ca) = self.certificate {
            data.insert(CA_CERT_KEY.to_string(), ByteString(ca.clone()));
        }
        data
    }

    /// Value of a config key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    /// Value of a config key that must be present
    pub fn require(&self, secret: &str, key: &str) -> Result<&str, Error> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::malformed_config(secret, format!("missing {key}")))
    }

    /// Vault server address
    pub fn vault_url(&self) -> Option<&str> {
        self.get(VAULT_URL)
    }

    /// Vault token
    pub fn token(&self) -> Option<&str> {
        self.get(TOKEN)
    }

    /// Path prefix this config is scoped to
    pub fn mount_point(&self) -> Option<&str> {
        self.get(SECRET_MOUNT_POINT)
    }
}

/// Parse the line-oriented config blob
///
/// Blank lines are skipped. Every other line must split on its first `=`
/// into a non-empty key and a value; both are trimmed. Later duplicates win.
pub fn parse_keyring_conf(secret: &str, text: &str) -> Result<BTreeMap<String, String>, Error> {
    let mut conf = BTreeMap::new();
    for (lineno, line) in text.split('\n').enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::malformed_config(secret, format!("line {} has no '='", lineno + 1))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::malformed_config(
                secret,
                format!("line {} has an empty key", lineno + 1),
            ));
        }
        if conf.insert(key.to_string(), value.trim().to_string()).is_some() {
            debug!(secret = %secret, key = %key, "duplicate keyring key, later value wins");
        }
    }
    Ok(conf)
}

/// Render pairs in the order the database keyring plugin documents,
/// followed by any other keys alphabetically
pub fn render_keyring_conf(config: &BTreeMap<String, String>) -> String {
    const ORDER: [&str; 4] = [TOKEN, VAULT_URL, SECRET_MOUNT_POINT, VAULT_CA];

    let known = ORDER
        .iter()
        .filter_map(|k| config.get(*k).map(|v| (*k, v.as_str())));
    let rest = config
        .iter()
        .filter(|(k, _)| !ORDER.contains(&k.as_str()))
        .map(|(k, v)| (k.as_str(), v.as_str()));

    known
        .chain(rest)
        .map(|(k, v)| format!("{k} = {v}\n"))
        .collect()
}
