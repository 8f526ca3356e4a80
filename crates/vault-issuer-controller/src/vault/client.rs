//! Vault REST client over reqwest

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::warn;

use vault_issuer_common::{Error, VaultConnectionDescriptor};

use super::{SecretData, VaultApi, VaultConnector};

/// Connect and response timeout for every vault call
///
/// Bounds how long one reconcile can stall on an unreachable vault.
pub const VAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Authentication header
pub const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

fn user_agent() -> String {
    format!("k8s-vault-issuer/{}", env!("CARGO_PKG_VERSION"))
}

/// Build the HTTP client, trusting `certificate` on top of the platform roots
pub fn build_http_client(
    certificate: Option<&[u8]>,
    timeout: Duration,
) -> Result<reqwest::Client, Error> {
    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(timeout)
        .timeout(timeout);

    if let Some(pem) = certificate {
        let certs = reqwest::Certificate::from_pem_bundle(pem)
            .map_err(|e| Error::trust_setup(format!("invalid CA certificate: {e}")))?;
        if certs.is_empty() {
            return Err(Error::trust_setup("CA bundle contains no PEM certificates"));
        }
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
        return builder
            .build()
            .map_err(|e| Error::trust_setup(format!("failed to build trust store: {e}")));
    }

    builder.build().map_err(|e| {
        Error::internal_with_context("vault_client", format!("failed to build client: {e}"))
    })
}

/// Percent-encode a single URL path component.
fn percent_encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Percent-encode each segment of a slash-delimited Vault path.
fn encode_vault_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(percent_encode_component)
        .collect::<Vec<_>>()
        .join("/")
}

/// Map a non-success status to an error
fn status_error(operation: &str, status: StatusCode) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::unauthorized(operation),
        other => Error::vault_status(operation, other.as_u16()),
    }
}

/// Turn the `data.keys` array of a LIST response into entry names
///
/// Non-string entries are logged and skipped.
fn parse_key_listing(body: &serde_json::Value) -> Option<Vec<String>> {
    let keys = body.get("data")?.get("keys")?.as_array()?;
    Some(
        keys.iter()
            .filter_map(|k| match k.as_str() {
                Some(s) => Some(s.to_string()),
                None => {
                    warn!(key = %k, "skipping non-string entry in vault listing");
                    None
                }
            })
            .collect(),
    )
}

/// Vault REST API client bound to one address and token
#[derive(Clone)]
pub struct VaultClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl VaultClient {
    /// Create a client from a prepared HTTP client
    pub fn new(http: reqwest::Client, base_url: &str, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, encode_vault_path(path))
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, Error> {
        request
            .header(VAULT_TOKEN_HEADER, &self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::vault(operation, e.to_string()))
    }

    async fn json_body(operation: &str, response: Response) -> Result<serde_json::Value, Error> {
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| Error::serialization(format!("{operation}: invalid response body: {e}")))
    }
}

#[async_trait]
impl VaultApi for VaultClient {
    async fn put_policy(&self, name: &str, rules: &str) -> Result<(), Error> {
        const OP: &str = "put policy";
        let url = self.url(&format!("sys/policies/acl/{name}"));
        let body = serde_json::json!({ "policy": rules });
        let response = self.send(OP, self.http.put(url).json(&body)).await?;
        if !response.status().is_success() {
            return Err(status_error(OP, response.status()));
        }
        Ok(())
    }

    async fn create_token(&self, policies: &[String]) -> Result<String, Error> {
        const OP: &str = "create token";
        let url = self.url("auth/token/create");
        let body = serde_json::json!({ "policies": policies });
        let response = self.send(OP, self.http.post(url).json(&body)).await?;
        if !response.status().is_success() {
            return Err(status_error(OP, response.status()));
        }
        let body = Self::json_body(OP, response).await?;
        body.get("auth")
            .and_then(|a| a.get("client_token"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::vault(OP, "response has no auth.client_token"))
    }

    async fn list(&self, path: &str) -> Result<Option<Vec<String>>, Error> {
        const OP: &str = "list";
        let request = self.http.get(self.url(path)).query(&[("list", "true")]);
        let response = self.send(OP, request).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body = Self::json_body(OP, response).await?;
                Ok(parse_key_listing(&body))
            }
            s => Err(status_error(OP, s)),
        }
    }

    async fn read(&self, path: &str) -> Result<Option<SecretData>, Error> {
        const OP: &str = "read";
        let response = self.send(OP, self.http.get(self.url(path))).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body = Self::json_body(OP, response).await?;
                match body.get("data") {
                    Some(serde_json::Value::Object(data)) => Ok(Some(data.clone())),
                    Some(serde_json::Value::Null) | None => Ok(None),
                    Some(_) => Err(Error::vault(OP, "response data is not an object")),
                }
            }
            s => Err(status_error(OP, s)),
        }
    }

    async fn write(&self, path: &str, data: &SecretData) -> Result<(), Error> {
        const OP: &str = "write";
        let response = self.send(OP, self.http.put(self.url(path)).json(data)).await?;
        if !response.status().is_success() {
            return Err(status_error(OP, response.status()));
        }
        Ok(())
    }
}

/// Connector producing [`VaultClient`]s with a fixed timeout
#[derive(Debug, Clone)]
pub struct HttpVaultConnector {
    timeout: Duration,
}

impl HttpVaultConnector {
    /// Connector with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpVaultConnector {
    fn default() -> Self {
        Self::with_timeout(VAULT_TIMEOUT)
    }
}

impl VaultConnector for HttpVaultConnector {
    fn connect(&self, descriptor: &VaultConnectionDescriptor) -> Result<Arc<dyn VaultApi>, Error> {
        let url = descriptor
            .vault_url()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::malformed_config("vault connection", "missing vault_url"))?;
        let token = descriptor
            .token()
            .ok_or_else(|| Error::malformed_config("vault connection", "missing token"))?;

        let http = build_http_client(descriptor.certificate.as_deref(), self.timeout)?;
        Ok(Arc::new(VaultClient::new(http, url, token)))
    }
}
