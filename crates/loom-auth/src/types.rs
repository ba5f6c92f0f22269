//! Core authentication types.
//!
//! Mirrors the TypeScript `AuthStorage` schema stored in `~/.loom/auth.json`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// OAuth token set returned by provider token endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTokens {
    /// The access token for API requests.
    pub access_token: String,
    /// The refresh token for obtaining new access tokens.
    pub refresh_token: String,
    /// Absolute expiration timestamp in **milliseconds** since Unix epoch.
    pub expires_at: i64,
}

/// A named account with OAuth credentials.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountEntry {
    /// Human-readable account label.
    pub label: String,
    /// OAuth tokens for this account.
    pub oauth: OAuthTokens,
}

/// Authentication for a single provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAuth {
    /// Legacy single OAuth token set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthTokens>,
    /// API key (fallback auth method).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Named accounts (takes priority over legacy `oauth`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<AccountEntry>>,
}

/// Google-specific provider auth with endpoint metadata.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleProviderAuth {
    /// Base provider auth fields.
    #[serde(flatten)]
    pub base: ProviderAuth,
    /// OAuth client ID (stored for refresh).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// OAuth client secret (stored for refresh).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Which Google endpoint was used for auth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<GoogleOAuthEndpoint>,
    /// Google Cloud project ID (required for Cloud Code Assist).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// Google OAuth endpoint variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoogleOAuthEndpoint {
    /// Production Cloud Code Assist.
    CloudCodeAssist,
    /// Free tier / sandbox.
    Antigravity,
}

/// API key auth for external services.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAuth {
    /// Single API key (legacy).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Multiple API keys (takes precedence over single).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_keys: Option<Vec<String>>,
}

/// Top-level auth storage schema (`~/.loom/auth.json`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStorage {
    /// Schema version (always 1).
    pub version: u32,
    /// Per-provider auth configuration.
    pub providers: HashMap<String, serde_json::Value>,
    /// Per-service API key configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<HashMap<String, ServiceAuth>>,
    /// ISO 8601 timestamp of last update.
    pub last_updated: String,
}

impl AuthStorage {
    /// Create a new empty auth storage.
    pub fn new() -> Self {
        Self {
            version: 1,
            providers: HashMap::new(),
            services: None,
            last_updated: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get typed provider auth for a given provider ID.
    pub fn get_provider_auth(&self, provider: &str) -> Option<ProviderAuth> {
        self.providers
            .get(provider)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get Google-specific provider auth.
    pub fn get_google_auth(&self) -> Option<GoogleProviderAuth> {
        self.providers
            .get("google")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set provider auth.
    pub fn set_provider_auth(&mut self, provider: &str, auth: &ProviderAuth) {
        if let Ok(v) = serde_json::to_value(auth) {
            let _ = self.providers.insert(provider.to_string(), v);
        }
    }

    /// Set Google-specific provider auth.
    pub fn set_google_auth(&mut self, auth: &GoogleProviderAuth) {
        if let Ok(v) = serde_json::to_value(auth) {
            let _ = self.providers.insert("google".to_string(), v);
        }
    }

    /// Get service auth for a given service ID.
    pub fn get_service_auth(&self, service: &str) -> Option<&ServiceAuth> {
        self.services.as_ref()?.get(service)
    }

    /// Get API keys for a service (prefers `api_keys` over single `api_key`).
    pub fn get_service_api_keys(&self, service: &str) -> Vec<String> {
        let Some(svc) = self.get_service_auth(service) else {
            return Vec::new();
        };
        if let Some(keys) = &svc.api_keys {
            if !keys.is_empty() {
                return keys.clone();
            }
        }
        if let Some(key) = &svc.api_key {
            return vec![key.clone()];
        }
        Vec::new()
    }
}

impl Default for AuthStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime auth state for server operations.
///
/// Discriminated union: either OAuth-based or API-key-based auth.
#[derive(Clone, Debug)]
pub enum ServerAuth {
    /// OAuth-based authentication.
    OAuth {
        /// Access token for API requests.
        access_token: String,
        /// Refresh token for renewal.
        refresh_token: String,
        /// Expiration timestamp in milliseconds.
        expires_at: i64,
        /// Account label (for multi-account).
        account_label: Option<String>,
    },
    /// API-key-based authentication.
    ApiKey {
        /// The API key.
        api_key: String,
    },
}

impl ServerAuth {
    /// Create from OAuth tokens.
    pub fn from_oauth(tokens: &OAuthTokens, account_label: Option<String>) -> Self {
        Self::OAuth {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.expires_at,
            account_label,
        }
    }

    /// Create from an API key.
    pub fn from_api_key(key: impl Into<String>) -> Self {
        Self::ApiKey {
            api_key: key.into(),
        }
    }

    /// Get the access token (for OAuth) or API key.
    pub fn token(&self) -> &str {
        match self {
            Self::OAuth { access_token, .. } => access_token,
            Self::ApiKey { api_key } => api_key,
        }
    }

    /// Check if this is OAuth auth.
    pub fn is_oauth(&self) -> bool {
        matches!(self, Self::OAuth { .. })
    }
}

/// Google-specific runtime auth.
#[derive(Clone, Debug)]
pub struct GoogleAuth {
    /// Base server auth.
    pub auth: ServerAuth,
    /// Which Google endpoint.
    pub endpoint: Option<GoogleOAuthEndpoint>,
    /// API base URL.
    pub api_endpoint: Option<String>,
    /// API version string.
    pub api_version: Option<String>,
    /// Google Cloud project ID.
    pub project_id: Option<String>,
}

/// OAuth configuration for a provider.
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    /// Authorization URL for browser redirect.
    pub auth_url: String,
    /// Token exchange URL.
    pub token_url: String,
    /// OAuth redirect URI.
    pub redirect_uri: String,
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret (Google only).
    pub client_secret: Option<String>,
    /// OAuth scopes.
    pub scopes: Vec<String>,
    /// Buffer in seconds before expiry to trigger refresh.
    pub token_expiry_buffer_seconds: i64,
}

/// Current system time in milliseconds since Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Check if OAuth tokens need refreshing.
pub fn should_refresh(tokens: &OAuthTokens, buffer_ms: i64) -> bool {
    now_ms() + buffer_ms >= tokens.expires_at
}

/// Calculate expiration timestamp from `expires_in` seconds.
pub fn calculate_expires_at(expires_in_seconds: i64, buffer_seconds: i64) -> i64 {
    now_ms() + (expires_in_seconds - buffer_seconds) * 1000
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
