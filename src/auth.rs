use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::util::unix_now_secs;

/// Expiry skew: a token this close to its deadline is treated as expired
/// so an in-flight request does not race the cutoff.
const EXPIRY_SKEW_SECS: u64 = 120;

/// A Copilot bearer token together with the endpoint it is valid for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopilotToken {
    pub token: String,
    pub endpoint: String,
    pub expires_at: u64,
}

impl CopilotToken {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_now_secs().saturating_add(EXPIRY_SKEW_SECS)
    }
}

/// Source of the upstream credential.
///
/// The OAuth device-code sign-in and the periodic refresh timer are owned
/// by an external supervisor; this trait is the narrow read-side seam the
/// request pipeline consumes. `refresh` is invoked at most once per
/// request, only when the cached token is already expired.
pub trait AuthProvider: Send + Sync {
    /// Current token state.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Auth`] when no credential is available.
    fn token(&self) -> Result<CopilotToken, GatewayError>;

    /// Attempt to obtain a fresher credential. Returns `true` when the
    /// token changed.
    fn refresh(&self) -> bool;
}

/// File-backed token store.
///
/// Reads the JSON state persisted by the sign-in flow and caches it.
/// `refresh` re-reads the file, picking up whatever the external refresh
/// task wrote since.
pub struct TokenFile {
    path: String,
    cached: RwLock<Option<CopilotToken>>,
}

impl TokenFile {
    #[must_use]
    pub fn new(path: String) -> Self {
        Self {
            path,
            cached: RwLock::new(None),
        }
    }

    fn read_from_disk(&self) -> Option<CopilotToken> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<CopilotToken>(&contents) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!("malformed token state at {}: {e}", self.path);
                None
            }
        }
    }
}

impl AuthProvider for TokenFile {
    fn token(&self) -> Result<CopilotToken, GatewayError> {
        if let Some(token) = self.cached.read().as_ref() {
            return Ok(token.clone());
        }
        let token = self.read_from_disk().ok_or_else(|| {
            GatewayError::Auth(format!(
                "no Copilot token at {}; run the sign-in flow first",
                self.path
            ))
        })?;
        *self.cached.write() = Some(token.clone());
        Ok(token)
    }

    fn refresh(&self) -> bool {
        let Some(fresh) = self.read_from_disk() else {
            return false;
        };
        let mut cached = self.cached.write();
        let changed = cached
            .as_ref()
            .map_or(true, |current| current.token != fresh.token);
        *cached = Some(fresh);
        changed
    }
}

/// Resolve a usable token, refreshing once if the cached one is expired.
///
/// # Errors
///
/// Returns [`GatewayError::Auth`] when no credential exists or the token
/// is still expired after the refresh attempt.
pub fn resolve_token(provider: &dyn AuthProvider) -> Result<CopilotToken, GatewayError> {
    let token = provider.token()?;
    if !token.is_expired() {
        return Ok(token);
    }
    provider.refresh();
    let token = provider.token()?;
    if token.is_expired() {
        return Err(GatewayError::Auth(
            "Copilot token expired and refresh failed".to_string(),
        ));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider {
        token: CopilotToken,
    }

    impl AuthProvider for StaticProvider {
        fn token(&self) -> Result<CopilotToken, GatewayError> {
            Ok(self.token.clone())
        }
        fn refresh(&self) -> bool {
            false
        }
    }

    fn fresh_token() -> CopilotToken {
        CopilotToken {
            token: "tid=abc".to_string(),
            endpoint: "https://api.example.test".to_string(),
            expires_at: unix_now_secs() + 3600,
        }
    }

    #[test]
    fn test_resolve_token_passes_fresh_token_through() {
        let provider = StaticProvider {
            token: fresh_token(),
        };
        let token = resolve_token(&provider).unwrap();
        assert_eq!(token.token, "tid=abc");
    }

    #[test]
    fn test_resolve_token_rejects_expired_after_failed_refresh() {
        let mut token = fresh_token();
        token.expires_at = 1;
        let provider = StaticProvider { token };
        let err = resolve_token(&provider).unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));
    }

    #[test]
    fn test_token_file_round_trip() {
        let dir = std::env::temp_dir().join("copilot-gateway-auth-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("token.json");
        let state = CopilotToken {
            token: "tid=disk".to_string(),
            endpoint: "https://api.example.test".to_string(),
            expires_at: unix_now_secs() + 3600,
        };
        std::fs::write(&path, serde_json::to_string(&state).unwrap()).unwrap();

        let store = TokenFile::new(path.to_string_lossy().into_owned());
        let token = store.token().unwrap();
        assert_eq!(token.token, "tid=disk");

        // A rewrite on disk is visible after refresh.
        let rotated = CopilotToken {
            token: "tid=rotated".to_string(),
            ..state
        };
        std::fs::write(&path, serde_json::to_string(&rotated).unwrap()).unwrap();
        assert!(store.refresh());
        assert_eq!(store.token().unwrap().token, "tid=rotated");
    }

    #[test]
    fn test_token_file_missing_is_auth_error() {
        let store = TokenFile::new("/nonexistent/copilot-gateway/token.json".to_string());
        assert!(matches!(store.token(), Err(GatewayError::Auth(_))));
        assert!(!store.refresh());
    }
}
