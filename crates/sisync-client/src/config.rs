//! SIS client configuration.
//!
//! One explicit, immutable settings struct constructed up front.  The
//! `Debug` impl redacts the client secret and resource password to prevent
//! accidental credential exposure in log output.

use serde::{Deserialize, Serialize};

/// Default SIS host used when no host URL is configured.
pub const DEFAULT_HOST: &str = "https://sis-api.example.edu";

/// Path of the OAuth2 token endpoint, relative to the host.
pub const TOKEN_PATH: &str = "/oauth/1.0/access_token";

/// Path prefix of the SIS resource API, relative to the host.
pub const API_PATH: &str = "/general/sis/1.0";

/// Credentials and endpoints for one SIS connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct SisConfig {
    /// Base host URL, e.g. `https://sis-api.example.edu`.
    pub host_url: String,
    /// OAuth2 client id, also sent as an identifying header on every call.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Username for the password grant.
    pub resource_username: String,
    /// Password for the password grant.
    pub resource_password: String,
}

impl SisConfig {
    /// Create a configuration, falling back to [`DEFAULT_HOST`] when the
    /// host URL is empty.
    pub fn new(
        host_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        resource_username: impl Into<String>,
        resource_password: impl Into<String>,
    ) -> Self {
        let host_url: String = host_url.into();
        let host_url = if host_url.is_empty() {
            DEFAULT_HOST.to_string()
        } else {
            host_url.trim_end_matches('/').to_string()
        };
        Self {
            host_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            resource_username: resource_username.into(),
            resource_password: resource_password.into(),
        }
    }

    /// Full URL of the OAuth2 token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}{}", self.host_url, TOKEN_PATH)
    }

    /// Full URL prefix of the resource API.
    pub fn api_url(&self) -> String {
        format!("{}{}", self.host_url, API_PATH)
    }

    /// Report missing settings as operator-readable findings.
    ///
    /// Intended for the explicit settings check, not the sync hot path:
    /// sync itself simply fails authentication and skips.
    pub fn validate(&self) -> Vec<String> {
        let mut findings = Vec::new();
        if self.client_id.is_empty() {
            findings.push("client id not specified".to_string());
        }
        if self.client_secret.is_empty() {
            findings.push("client secret not specified".to_string());
        }
        if self.resource_username.is_empty() {
            findings.push("resource username not specified".to_string());
        }
        if self.resource_password.is_empty() {
            findings.push("resource password not specified".to_string());
        }
        findings
    }
}

impl std::fmt::Debug for SisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SisConfig")
            .field("host_url", &self.host_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("resource_username", &self.resource_username)
            .field("resource_password", &"[REDACTED]")
            .finish()
    }
}
