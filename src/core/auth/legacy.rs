// ─── Legacy Provider ───
// Yggdrasil-style username/password service. One exchange yields the access
// token and profile; validate/invalidate/signout answer 204 on success.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::error::{AuthRejection, LauncherError, LauncherResult};

use super::broker::RefreshProvider;
use super::{decode, send, AuthHop, AuthProvider, Credential};

/// The service issues no expiry; tokens are re-validated after this long.
const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_token: String,
    #[serde(default)]
    client_token: Option<String>,
    selected_profile: Option<ProfileRef>,
    #[serde(default)]
    user: Option<UserRef>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProfileRef {
    id: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct UserRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenPair<'a> {
    access_token: &'a str,
    client_token: &'a str,
}

pub struct LegacyAuth {
    client: Client,
    base_url: String,
    client_token: String,
}

impl LegacyAuth {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self::with_client_token(client, base_url, Uuid::new_v4().simple().to_string())
    }

    /// Reuse a client token persisted from an earlier session.
    pub fn with_client_token(client: Client, base_url: &str, client_token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_token,
        }
    }

    pub fn client_token(&self) -> &str {
        &self.client_token
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Exchange username and password for a session.
    pub async fn authenticate(&self, username: &str, password: &str) -> LauncherResult<Credential> {
        info!("Authenticating legacy account");
        let body = json!({
            "agent": { "name": "Minecraft", "version": 1 },
            "username": username,
            "password": password,
            "clientToken": self.client_token,
            "requestUser": true,
        });
        let session = self
            .session_call(AuthHop::Authenticate, "authenticate", &body)
            .await?;
        self.credential_from(AuthHop::Authenticate, session, None)
    }

    /// New access token for the same profile; everything else is carried over.
    pub async fn refresh(&self, credential: &Credential) -> LauncherResult<Credential> {
        debug!("Refreshing legacy session for {}", credential.username);
        let body = json!({
            "accessToken": credential.access_token,
            "clientToken": self.client_token,
            "requestUser": true,
        });
        let session = self.session_call(AuthHop::Refresh, "refresh", &body).await?;
        self.credential_from(AuthHop::Refresh, session, Some(credential))
    }

    /// Whether the service still accepts `access_token`.
    pub async fn validate(&self, access_token: &str) -> LauncherResult<bool> {
        let (status, body) = self
            .post(AuthHop::Validate, "validate", &self.pair(access_token))
            .await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Ok(false),
            _ => Err(rejection(AuthHop::Validate, status, &body)),
        }
    }

    pub async fn invalidate(&self, access_token: &str) -> LauncherResult<()> {
        let (status, body) = self
            .post(AuthHop::Invalidate, "invalidate", &self.pair(access_token))
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(rejection(AuthHop::Invalidate, status, &body))
        }
    }

    /// Invalidate every token of the account.
    pub async fn signout(&self, username: &str, password: &str) -> LauncherResult<()> {
        let body = json!({ "username": username, "password": password });
        let (status, body) = self.post(AuthHop::Signout, "signout", &body).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(rejection(AuthHop::Signout, status, &body))
        }
    }

    fn pair<'a>(&'a self, access_token: &'a str) -> TokenPair<'a> {
        TokenPair {
            access_token,
            client_token: &self.client_token,
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        hop: AuthHop,
        path: &str,
        body: &B,
    ) -> LauncherResult<(StatusCode, String)> {
        let request = self
            .client
            .post(self.endpoint(path))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);
        send(AuthProvider::Legacy, hop, request).await
    }

    async fn session_call(
        &self,
        hop: AuthHop,
        path: &str,
        body: &serde_json::Value,
    ) -> LauncherResult<SessionResponse> {
        let (status, raw) = self.post(hop, path, body).await?;
        if !status.is_success() {
            return Err(rejection(hop, status, &raw));
        }
        decode(AuthProvider::Legacy, hop, raw)
    }

    fn credential_from(
        &self,
        hop: AuthHop,
        session: SessionResponse,
        previous: Option<&Credential>,
    ) -> LauncherResult<Credential> {
        if let Some(echoed) = &session.client_token {
            if echoed != &self.client_token {
                debug!("Service echoed a different client token");
            }
        }

        let (identity_id, username) = match (session.selected_profile, previous) {
            (Some(profile), _) => (profile.id, profile.name),
            (None, Some(prev)) => (prev.identity_id.clone(), prev.username.clone()),
            (None, None) => {
                return Err(LauncherError::AuthRejected {
                    provider: AuthProvider::Legacy,
                    hop,
                    code: "NoProfile".into(),
                    message: "account has no game profile".into(),
                    reason: AuthRejection::AccountMissing,
                })
            }
        };

        Ok(Credential {
            provider: AuthProvider::Legacy,
            identity_id,
            username,
            access_token: session.access_token,
            refresh_token: None,
            token_chain: Vec::new(),
            expires_at: Utc::now() + Duration::hours(TOKEN_LIFETIME_HOURS),
            user_type: "mojang".into(),
            xuid: None,
            client_id: session
                .user
                .map(|u| u.id)
                .or_else(|| previous.and_then(|p| p.client_id.clone())),
        })
    }
}

#[async_trait]
impl RefreshProvider for LegacyAuth {
    fn provider(&self) -> AuthProvider {
        AuthProvider::Legacy
    }

    async fn refresh(&self, credential: &Credential) -> LauncherResult<Credential> {
        LegacyAuth::refresh(self, credential).await
    }
}

/// `{error, errorMessage}` bodies become structured rejections; a rejected
/// token (`ForbiddenOperationException` on a token call) needs a new login.
fn rejection(hop: AuthHop, status: StatusCode, raw: &str) -> LauncherError {
    let Ok(body) = serde_json::from_str::<ErrorBody>(raw) else {
        return super::unstructured_rejection(AuthProvider::Legacy, hop, status, raw);
    };

    let token_call = matches!(hop, AuthHop::Refresh | AuthHop::Validate | AuthHop::Invalidate);
    let reason = if token_call && body.error == "ForbiddenOperationException" {
        AuthRejection::ReauthRequired
    } else {
        AuthRejection::Other
    };

    LauncherError::AuthRejected {
        provider: AuthProvider::Legacy,
        hop,
        code: body.error,
        message: body.error_message,
        reason,
    }
}
