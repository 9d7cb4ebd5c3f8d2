//! Google Cloud Secret Manager backend
//!
//! Uses the Secret Manager REST API (`versions.access`) with a bearer token.
//! References are secret version resource names:
//!
//! - `projects/<project>/secrets/<secret>/versions/<version>`
//! - `projects/<project>/secrets/<secret>` (version `latest`)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};

use crate::context::ResolveContext;
use crate::error::SecretError;
use crate::fetcher::SecretFetcher;

pub const SECRET_MANAGER_ENDPOINT: &str = "https://secretmanager.googleapis.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const LATEST_VERSION: &str = "latest";

/// Environment variables the access token is read from, in order
pub const ACCESS_TOKEN_VARS: [&str; 2] =
    ["ENVSECRET_GCP_ACCESS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"];

/// A fully qualified secret version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretVersionName {
    pub project: String,
    pub secret: String,
    pub version: String,
}

impl fmt::Display for SecretVersionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/secrets/{}/versions/{}",
            self.project, self.secret, self.version
        )
    }
}

impl FromStr for SecretVersionName {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();

        let (project, secret, version) = match parts.as_slice() {
            ["projects", project, "secrets", secret] => (*project, *secret, LATEST_VERSION),
            ["projects", project, "secrets", secret, "versions", version] => {
                (*project, *secret, *version)
            }
            _ => {
                return Err(SecretError::invalid_reference(
                    s,
                    "expected projects/<project>/secrets/<secret>[/versions/<version>]",
                ))
            }
        };

        for (label, segment) in [("project", project), ("secret", secret), ("version", version)] {
            if !is_valid_segment(segment) {
                return Err(SecretError::invalid_reference(
                    s,
                    format!("{label} must be non-empty and use only letters, digits, '-' or '_'"),
                ));
            }
        }

        Ok(Self {
            project: project.to_string(),
            secret: secret.to_string(),
            version: version.to_string(),
        })
    }
}

impl<'de> Deserialize<'de> for SecretVersionName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SecretVersionName::from_str(&s).map_err(serde::de::Error::custom)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Connection settings for Secret Manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// API base URL, override for emulators and proxies
    pub endpoint: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            endpoint: SECRET_MANAGER_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Fetcher backed by Google Cloud Secret Manager.
///
/// Missing secrets and versions are reported as [`SecretError::NotFound`].
#[derive(Clone)]
pub struct GcpSecretManager {
    client: Client,
    endpoint: String,
    access_token: String,
    timeout: Duration,
}

impl fmt::Debug for GcpSecretManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpSecretManager")
            .field("endpoint", &self.endpoint)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl GcpSecretManager {
    pub fn new(config: &GcpConfig, access_token: impl Into<String>) -> Result<Self, SecretError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SecretError::backend("gcp", format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            timeout,
        })
    }

    /// Build using the first non-empty token in [`ACCESS_TOKEN_VARS`]
    pub fn from_env(config: &GcpConfig) -> Result<Self, SecretError> {
        let token = ACCESS_TOKEN_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                SecretError::backend(
                    "gcp",
                    format!(
                        "no access token; set {} (e.g. from `gcloud auth print-access-token`)",
                        ACCESS_TOKEN_VARS.join(" or ")
                    ),
                )
            })?;

        Self::new(config, token)
    }

    fn access_url(&self, name: &SecretVersionName) -> String {
        format!("{}/{}:access", self.endpoint, name)
    }
}

#[async_trait]
impl SecretFetcher for GcpSecretManager {
    fn name(&self) -> &'static str {
        "gcp"
    }

    async fn get_secret_value(
        &self,
        ctx: &ResolveContext,
        reference: &str,
    ) -> Result<String, SecretError> {
        let name: SecretVersionName = reference.parse()?;

        tracing::debug!(
            project = %name.project,
            secret = %name.secret,
            version = %name.version,
            "Accessing secret version"
        );

        let mut request = self
            .client
            .get(self.access_url(&name))
            .bearer_auth(&self.access_token);

        // The context deadline only replaces the client timeout when it is sooner
        let deadline_bound = match ctx.remaining() {
            Some(remaining) if remaining < self.timeout => {
                request = request.timeout(remaining);
                true
            }
            _ => false,
        };
        let map_err = |e: reqwest::Error| map_request_error(e, deadline_bound, self.timeout);

        let response = request.send().await.map_err(map_err)?;
        let status = response.status();
        let body = response.text().await.map_err(map_err)?;

        if !status.is_success() {
            return Err(map_status(status, &name, &body));
        }

        decode_payload(&body)
    }
}

fn map_request_error(err: reqwest::Error, deadline_bound: bool, timeout: Duration) -> SecretError {
    match err.is_timeout() {
        true if deadline_bound => SecretError::DeadlineExceeded,
        true => SecretError::backend(
            "gcp",
            format!(
                "request timed out after {}s (gcp.timeout_secs)",
                timeout.as_secs()
            ),
        ),
        false => SecretError::backend("gcp", format!("request failed: {err}")),
    }
}

fn map_status(status: StatusCode, name: &SecretVersionName, body: &str) -> SecretError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_default();

    match status {
        StatusCode::NOT_FOUND => SecretError::NotFound(name.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SecretError::AccessDenied(format!("{name}: {message}"))
        }
        _ if message.is_empty() => SecretError::backend("gcp", format!("HTTP {status}")),
        _ => SecretError::backend("gcp", format!("HTTP {status}: {message}")),
    }
}

fn decode_payload(body: &str) -> Result<String, SecretError> {
    let response: AccessSecretVersionResponse = serde_json::from_str(body)
        .map_err(|e| SecretError::backend("gcp", format!("invalid response: {e}")))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(response.payload.data.as_bytes())
        .map_err(|e| SecretError::backend("gcp", format!("invalid payload encoding: {e}")))?;

    String::from_utf8(bytes)
        .map_err(|_| SecretError::InvalidValue("secret payload is not valid UTF-8".to_string()))
}
