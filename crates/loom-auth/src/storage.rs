//! Auth storage file I/O.
//!
//! Reads and writes `~/.loom/auth.json` with secure file permissions (0o600).

use std::path::{Path, PathBuf};

use crate::errors::AuthError;
use crate::types::{AuthStorage, GoogleProviderAuth, OAuthTokens, ProviderAuth, ServiceAuth};

/// Default auth file name.
const AUTH_FILE_NAME: &str = "auth.json";

/// Get the auth file path under the given data directory.
pub fn auth_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(AUTH_FILE_NAME)
}

/// Load auth storage from file (sync).
///
/// Returns `None` if the file doesn't exist or is invalid.
pub fn load_auth_storage(path: &Path) -> Option<AuthStorage> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("failed to read auth file: {e}");
            return None;
        }
    };

    match serde_json::from_str::<AuthStorage>(&data) {
        Ok(storage) if storage.version == 1 => Some(storage),
        Ok(storage) => {
            tracing::warn!("unsupported auth storage version: {}", storage.version);
            None
        }
        Err(e) => {
            tracing::warn!("failed to parse auth file: {e}");
            None
        }
    }
}

/// Save auth storage to file (sync).
///
/// Creates parent directories if needed. Sets file permissions to 0o600.
pub fn save_auth_storage(path: &Path, storage: &mut AuthStorage) -> Result<(), AuthError> {
    storage.last_updated = chrono::Utc::now().to_rfc3339();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(storage)?;
    std::fs::write(path, &json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }

    Ok(())
}

/// Get provider auth from storage file.
pub fn get_provider_auth(path: &Path, provider: &str) -> Option<ProviderAuth> {
    load_auth_storage(path)?.get_provider_auth(provider)
}

/// Get Google provider auth from storage file.
pub fn get_google_provider_auth(path: &Path) -> Option<GoogleProviderAuth> {
    load_auth_storage(path)?.get_google_auth()
}

/// Get service auth from storage file.
pub fn get_service_auth(path: &Path, service: &str) -> Option<ServiceAuth> {
    load_auth_storage(path)?
        .get_service_auth(service)
        .cloned()
}

/// Get service API keys from storage file.
pub fn get_service_api_keys(path: &Path, service: &str) -> Vec<String> {
    load_auth_storage(path)
        .map(|s| s.get_service_api_keys(service))
        .unwrap_or_default()
}

/// Save OAuth tokens for a provider.
///
/// Loads existing storage, patches the provider's OAuth tokens, and saves.
pub fn save_provider_oauth_tokens(
    path: &Path,
    provider: &str,
    tokens: &OAuthTokens,
) -> Result<(), AuthError> {
    let mut storage = load_auth_storage(path).unwrap_or_default();
    let mut pa = storage.get_provider_auth(provider).unwrap_or_default();
    pa.oauth = Some(tokens.clone());
    storage.set_provider_auth(provider, &pa);
    save_auth_storage(path, &mut storage)
}

/// Save an API key for a provider.
pub fn save_provider_api_key(
    path: &Path,
    provider: &str,
    api_key: &str,
) -> Result<(), AuthError> {
    let mut storage = load_auth_storage(path).unwrap_or_default();
    let mut pa = storage.get_provider_auth(provider).unwrap_or_default();
    pa.api_key = Some(api_key.to_string());
    storage.set_provider_auth(provider, &pa);
    save_auth_storage(path, &mut storage)
}

/// Save OAuth tokens for a named account.
pub fn save_account_oauth_tokens(
    path: &Path,
    provider: &str,
    label: &str,
    tokens: &OAuthTokens,
) -> Result<(), AuthError> {
    let mut storage = load_auth_storage(path).unwrap_or_default();
    let mut pa = storage.get_provider_auth(provider).unwrap_or_default();

    let accounts = pa.accounts.get_or_insert_with(Vec::new);
    if let Some(existing) = accounts.iter_mut().find(|a| a.label == label) {
        existing.oauth = tokens.clone();
    } else {
        accounts.push(crate::types::AccountEntry {
            label: label.to_string(),
            oauth: tokens.clone(),
        });
    }

    storage.set_provider_auth(provider, &pa);
    save_auth_storage(path, &mut storage)
}

/// Get account labels for a provider.
pub fn get_account_labels(path: &Path, provider: &str) -> Vec<String> {
    let Some(pa) = get_provider_auth(path, provider) else {
        return Vec::new();
    };
    pa.accounts
        .map(|accts| accts.iter().map(|a| a.label.clone()).collect())
        .unwrap_or_default()
}

/// Save Google-specific provider auth.
pub fn save_google_provider_auth(
    path: &Path,
    auth: &GoogleProviderAuth,
) -> Result<(), AuthError> {
    let mut storage = load_auth_storage(path).unwrap_or_default();
    storage.set_google_auth(auth);
    save_auth_storage(path, &mut storage)
}

/// Clear auth for a specific provider.
pub fn clear_provider_auth(path: &Path, provider: &str) -> Result<(), AuthError> {
    let Some(mut storage) = load_auth_storage(path) else {
        return Ok(());
    };
    let _ = storage.providers.remove(provider);
    save_auth_storage(path, &mut storage)
}

/// Delete the entire auth file.
pub fn clear_all_auth(path: &Path) -> Result<(), AuthError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AuthError::Io(e)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
