// ─── Credential Broker ───
// Provider clients exchange user secrets for a `Credential`. Nothing here is
// persisted: callers own the returned credential and hand it back for refresh.

mod broker;
pub mod legacy;
pub mod microsoft;
mod offline;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::error::{AuthRejection, LauncherError, LauncherResult};

pub use broker::{CredentialBroker, RefreshProvider};
pub use legacy::LegacyAuth;
pub use microsoft::{GameProfile, MicrosoftAuth};

/// Tokens refresh this long before they actually expire.
pub fn default_refresh_skew() -> Duration {
    Duration::minutes(5)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Legacy,
    Microsoft,
    Offline,
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthProvider::Legacy => "legacy",
            AuthProvider::Microsoft => "microsoft",
            AuthProvider::Offline => "offline",
        })
    }
}

/// One network exchange of a provider's flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthHop {
    Authenticate,
    Refresh,
    Validate,
    Invalidate,
    Signout,
    OAuthToken,
    XblAuthenticate,
    Xsts,
    GameLogin,
    Entitlements,
    Profile,
}

impl fmt::Display for AuthHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthHop::Authenticate => "authenticate",
            AuthHop::Refresh => "refresh",
            AuthHop::Validate => "validate",
            AuthHop::Invalidate => "invalidate",
            AuthHop::Signout => "signout",
            AuthHop::OAuthToken => "oauth-token",
            AuthHop::XblAuthenticate => "xbl-authenticate",
            AuthHop::Xsts => "xsts-authorize",
            AuthHop::GameLogin => "game-login",
            AuthHop::Entitlements => "entitlements",
            AuthHop::Profile => "profile",
        })
    }
}

/// Intermediate token issued by a multi-hop provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainedToken {
    pub hop: AuthHop,
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for ChainedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedToken")
            .field("hop", &self.hop)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Resolved identity plus the tokens authorizing a game session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub provider: AuthProvider,
    /// Profile id in undashed form.
    pub identity_id: String,
    pub username: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_chain: Vec<ChainedToken>,
    pub expires_at: DateTime<Utc>,
    pub user_type: String,
    #[serde(default)]
    pub xuid: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

impl Credential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True once `now` is within `skew` of expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now + skew >= self.expires_at
    }

    /// Chained token recorded for `hop`, if any.
    pub fn chained(&self, hop: AuthHop) -> Option<&str> {
        self.token_chain
            .iter()
            .find(|t| t.hop == hop)
            .map(|t| t.token.as_str())
    }

    pub fn key(&self) -> (AuthProvider, String) {
        (self.provider, self.identity_id.clone())
    }
}

// Token values never reach logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("identity_id", &self.identity_id)
            .field("username", &self.username)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_chain", &self.token_chain)
            .field("expires_at", &self.expires_at)
            .field("user_type", &self.user_type)
            .finish()
    }
}

// ── Response handling shared by the provider clients ──

/// Send failures and body read failures both count as network errors.
pub(crate) async fn send(
    provider: AuthProvider,
    hop: AuthHop,
    request: reqwest::RequestBuilder,
) -> LauncherResult<(reqwest::StatusCode, String)> {
    let response: Response = request
        .send()
        .await
        .map_err(|source| LauncherError::AuthNetwork {
            provider,
            hop,
            source,
        })?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| LauncherError::AuthNetwork {
            provider,
            hop,
            source,
        })?;
    Ok((status, body))
}

/// Decode a success body, or report it verbatim when it has the wrong shape.
pub(crate) fn decode<T: DeserializeOwned>(
    provider: AuthProvider,
    hop: AuthHop,
    body: String,
) -> LauncherResult<T> {
    match serde_json::from_str(&body) {
        Ok(value) => Ok(value),
        Err(_) => Err(LauncherError::AuthProtocol {
            provider,
            hop,
            raw_body: body,
        }),
    }
}

/// Rejection for a non-success response without a recognised error body.
pub(crate) fn unstructured_rejection(
    provider: AuthProvider,
    hop: AuthHop,
    status: reqwest::StatusCode,
    body: &str,
) -> LauncherError {
    let reason = if status == reqwest::StatusCode::UNAUTHORIZED {
        AuthRejection::ReauthRequired
    } else {
        AuthRejection::Other
    };
    LauncherError::AuthRejected {
        provider,
        hop,
        code: format!("HTTP {}", status.as_u16()),
        message: body.chars().take(200).collect(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_in: Duration) -> Credential {
        Credential {
            provider: AuthProvider::Microsoft,
            identity_id: "069a79f444e94726a5befca90e38aaf5".into(),
            username: "Notch".into(),
            access_token: "secret-token".into(),
            refresh_token: Some("secret-refresh".into()),
            token_chain: vec![ChainedToken {
                hop: AuthHop::Xsts,
                token: "xsts-secret".into(),
                expires_at: None,
            }],
            expires_at: Utc::now() + expires_in,
            user_type: "msa".into(),
            xuid: None,
            client_id: None,
        }
    }

    #[test]
    fn refresh_is_due_within_skew() {
        let now = Utc::now();
        assert!(credential(Duration::minutes(3)).needs_refresh(now, default_refresh_skew()));
        assert!(!credential(Duration::hours(2)).needs_refresh(now, default_refresh_skew()));
        assert!(credential(Duration::minutes(-1)).is_expired(now));
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let rendered = format!("{:?}", credential(Duration::hours(1)));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("Notch"));
    }

    #[test]
    fn chained_tokens_are_looked_up_by_hop() {
        let c = credential(Duration::hours(1));
        assert_eq!(c.chained(AuthHop::Xsts), Some("xsts-secret"));
        assert_eq!(c.chained(AuthHop::XblAuthenticate), None);
    }

    #[test]
    fn unauthorized_without_body_means_reauth() {
        let err = unstructured_rejection(
            AuthProvider::Microsoft,
            AuthHop::XblAuthenticate,
            reqwest::StatusCode::UNAUTHORIZED,
            "",
        );
        match err {
            LauncherError::AuthRejected { reason, code, .. } => {
                assert_eq!(reason, AuthRejection::ReauthRequired);
                assert_eq!(code, "HTTP 401");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
