// ─── Microsoft Provider ───
// Four sequential exchanges, each consuming the previous result:
//   OAuth code/refresh token → Xbox Live user token → XSTS token → game token.
// A failure at any hop stops the chain and the error names the hop.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::core::config::Endpoints;
use crate::core::error::{AuthRejection, LauncherError, LauncherResult};

use super::broker::RefreshProvider;
use super::{decode, send, unstructured_rejection, AuthHop, AuthProvider, ChainedToken, Credential};

const PROVIDER: AuthProvider = AuthProvider::Microsoft;
const XBL_RELYING_PARTY: &str = "http://auth.xboxlive.com";
const GAME_RELYING_PARTY: &str = "rp://api.minecraftservices.com/";
const PRODUCT_ENTITLEMENT: &str = "product_minecraft";
const GAME_ENTITLEMENT: &str = "game_minecraft";

// ── Wire types ──────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XboxResponse {
    token: String,
    #[serde(default)]
    not_after: Option<DateTime<Utc>>,
    display_claims: DisplayClaims,
}

#[derive(Debug, Deserialize)]
struct DisplayClaims {
    xui: Vec<XuiClaim>,
}

#[derive(Debug, Deserialize)]
struct XuiClaim {
    uhs: String,
    #[serde(default)]
    xid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XboxError {
    #[serde(rename = "XErr")]
    xerr: u64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    redirect: Option<String>,
}

/// Token issued by the Xbox Live or XSTS endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XboxToken {
    pub token: String,
    pub user_hash: String,
    pub xuid: Option<String>,
    pub not_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameProfile {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Entitlements {
    #[serde(default)]
    items: Vec<Entitlement>,
}

#[derive(Debug, Deserialize)]
struct Entitlement {
    name: String,
}

/// Map an XSTS `XErr` code to the account problem it reports.
pub fn classify_xerr(xerr: u64) -> Option<AuthRejection> {
    match xerr {
        2148916233 => Some(AuthRejection::AccountMissing),
        2148916235 => Some(AuthRejection::RegionUnavailable),
        2148916236 | 2148916237 => Some(AuthRejection::AdultVerificationRequired),
        2148916238 => Some(AuthRejection::ChildAccount),
        _ => None,
    }
}

// ── Client ──────────────────────────────────────────

pub struct MicrosoftAuth {
    client: Client,
    endpoints: Endpoints,
}

impl MicrosoftAuth {
    pub fn new(client: Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    /// Browser URL that starts the authorization-code flow.
    pub fn authorize_url(&self, state: &str) -> LauncherResult<String> {
        let url = reqwest::Url::parse_with_params(
            &self.endpoints.oauth_authorize,
            &[
                ("client_id", self.endpoints.oauth_client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.endpoints.oauth_redirect_uri.as_str()),
                ("scope", self.endpoints.oauth_scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| LauncherError::Other(format!("Invalid authorize endpoint: {e}")))?;
        Ok(url.to_string())
    }

    // ── Hop (a): OAuth token endpoint ───────────────

    pub async fn exchange_code(&self, code: &str) -> LauncherResult<OAuthTokens> {
        self.oauth_token(&[
            ("client_id", self.endpoints.oauth_client_id.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.endpoints.oauth_redirect_uri.as_str()),
            ("scope", self.endpoints.oauth_scope.as_str()),
        ])
        .await
    }

    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> LauncherResult<OAuthTokens> {
        self.oauth_token(&[
            ("client_id", self.endpoints.oauth_client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("redirect_uri", self.endpoints.oauth_redirect_uri.as_str()),
            ("scope", self.endpoints.oauth_scope.as_str()),
        ])
        .await
    }

    async fn oauth_token(&self, form: &[(&str, &str)]) -> LauncherResult<OAuthTokens> {
        let hop = AuthHop::OAuthToken;
        let request = self
            .client
            .post(&self.endpoints.oauth_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form);
        let (status, body) = send(PROVIDER, hop, request).await?;

        if !status.is_success() {
            let Ok(error) = serde_json::from_str::<OAuthError>(&body) else {
                return Err(unstructured_rejection(PROVIDER, hop, status, &body));
            };
            let reason = match error.error.as_str() {
                "invalid_grant" | "interaction_required" => AuthRejection::ReauthRequired,
                _ => AuthRejection::Other,
            };
            return Err(LauncherError::AuthRejected {
                provider: PROVIDER,
                hop,
                code: error.error,
                message: error.error_description,
                reason,
            });
        }
        decode(PROVIDER, hop, body)
    }

    // ── Hop (b): Xbox Live user token ───────────────

    pub async fn xbl_authenticate(&self, oauth_access_token: &str) -> LauncherResult<XboxToken> {
        let body = json!({
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": format!("d={oauth_access_token}"),
            },
            "RelyingParty": XBL_RELYING_PARTY,
            "TokenType": "JWT",
        });
        self.xbox_call(AuthHop::XblAuthenticate, &self.endpoints.xbl_authenticate, &body)
            .await
    }

    // ── Hop (c): XSTS ───────────────────────────────

    pub async fn xsts_authorize(&self, xbl_token: &str) -> LauncherResult<XboxToken> {
        let body = json!({
            "Properties": {
                "SandboxId": "RETAIL",
                "UserTokens": [xbl_token],
            },
            "RelyingParty": GAME_RELYING_PARTY,
            "TokenType": "JWT",
        });
        self.xbox_call(AuthHop::Xsts, &self.endpoints.xsts_authorize, &body)
            .await
    }

    async fn xbox_call(
        &self,
        hop: AuthHop,
        url: &str,
        body: &serde_json::Value,
    ) -> LauncherResult<XboxToken> {
        let request = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("x-xbl-contract-version", "1")
            .json(body);
        let (status, raw) = send(PROVIDER, hop, request).await?;

        if !status.is_success() {
            return Err(xbox_rejection(hop, status, &raw));
        }

        let response: XboxResponse = decode(PROVIDER, hop, raw.clone())?;
        let Some(claim) = response.display_claims.xui.into_iter().next() else {
            return Err(LauncherError::AuthProtocol {
                provider: PROVIDER,
                hop,
                raw_body: raw,
            });
        };
        Ok(XboxToken {
            token: response.token,
            user_hash: claim.uhs,
            xuid: claim.xid,
            not_after: response.not_after,
        })
    }

    // ── Hop (d): game service ───────────────────────

    pub async fn game_login(&self, user_hash: &str, xsts_token: &str) -> LauncherResult<GameToken> {
        let hop = AuthHop::GameLogin;
        let request = self
            .client
            .post(&self.endpoints.game_login)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({ "identityToken": format!("XBL3.0 x={user_hash};{xsts_token}") }));
        let (status, body) = send(PROVIDER, hop, request).await?;
        if !status.is_success() {
            return Err(service_rejection(hop, status, &body));
        }
        decode(PROVIDER, hop, body)
    }

    // ── Read-only game service calls ────────────────

    /// True only when both the product and the game entitlement are present.
    pub async fn verify_ownership(&self, access_token: &str) -> LauncherResult<bool> {
        let hop = AuthHop::Entitlements;
        let request = self
            .client
            .get(&self.endpoints.entitlements)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json");
        let (status, body) = send(PROVIDER, hop, request).await?;
        if !status.is_success() {
            return Err(service_rejection(hop, status, &body));
        }

        let entitlements: Entitlements = decode(PROVIDER, hop, body)?;
        let has = |name: &str| entitlements.items.iter().any(|item| item.name == name);
        Ok(has(PRODUCT_ENTITLEMENT) && has(GAME_ENTITLEMENT))
    }

    pub async fn fetch_profile(&self, access_token: &str) -> LauncherResult<GameProfile> {
        let hop = AuthHop::Profile;
        let request = self
            .client
            .get(&self.endpoints.profile)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json");
        let (status, body) = send(PROVIDER, hop, request).await?;
        if !status.is_success() {
            return Err(service_rejection(hop, status, &body));
        }
        decode(PROVIDER, hop, body)
    }

    // ── Composed flows ──────────────────────────────

    /// Complete login from an authorization code.
    pub async fn login_with_code(&self, code: &str) -> LauncherResult<Credential> {
        info!("Signing in with Microsoft authorization code");
        let tokens = self.exchange_code(code).await?;
        self.complete(tokens).await
    }

    /// Re-run the chain from a stored refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> LauncherResult<Credential> {
        info!("Refreshing Microsoft session");
        let tokens = self.exchange_refresh_token(refresh_token).await?;
        self.complete(tokens).await
    }

    async fn complete(&self, tokens: OAuthTokens) -> LauncherResult<Credential> {
        let xbl = self.xbl_authenticate(&tokens.access_token).await?;
        debug!("Xbox Live token acquired");
        let xsts = self.xsts_authorize(&xbl.token).await?;
        debug!("XSTS token acquired");
        let game = self.game_login(&xsts.user_hash, &xsts.token).await?;
        debug!("Game service token acquired");
        let profile = self.fetch_profile(&game.access_token).await?;
        info!("Signed in as {}", profile.name);

        Ok(Credential {
            provider: PROVIDER,
            identity_id: profile.id,
            username: profile.name,
            access_token: game.access_token,
            refresh_token: Some(tokens.refresh_token),
            token_chain: vec![
                ChainedToken {
                    hop: AuthHop::XblAuthenticate,
                    token: xbl.token,
                    expires_at: xbl.not_after,
                },
                ChainedToken {
                    hop: AuthHop::Xsts,
                    token: xsts.token,
                    expires_at: xsts.not_after,
                },
            ],
            expires_at: Utc::now() + Duration::seconds(game.expires_in.max(0)),
            user_type: "msa".into(),
            xuid: xsts.xuid,
            client_id: Some(self.endpoints.oauth_client_id.clone()),
        })
    }
}

#[async_trait]
impl RefreshProvider for MicrosoftAuth {
    fn provider(&self) -> AuthProvider {
        PROVIDER
    }

    async fn refresh(&self, credential: &Credential) -> LauncherResult<Credential> {
        let Some(refresh_token) = credential.refresh_token.as_deref() else {
            return Err(LauncherError::AuthRejected {
                provider: PROVIDER,
                hop: AuthHop::OAuthToken,
                code: "missing_refresh_token".into(),
                message: "credential carries no refresh token".into(),
                reason: AuthRejection::ReauthRequired,
            });
        };
        MicrosoftAuth::refresh(self, refresh_token).await
    }
}

/// XSTS/XBL failures carry `{XErr, Message, Redirect}`. Known codes name an
/// account problem; a bare 401 only asks for a new sign-in.
fn xbox_rejection(hop: AuthHop, status: StatusCode, raw: &str) -> LauncherError {
    let Ok(error) = serde_json::from_str::<XboxError>(raw) else {
        return unstructured_rejection(PROVIDER, hop, status, raw);
    };

    let reason = match classify_xerr(error.xerr) {
        Some(reason) => reason,
        None if status == StatusCode::UNAUTHORIZED => AuthRejection::ReauthRequired,
        None => AuthRejection::Other,
    };
    let message = match (error.message.is_empty(), error.redirect) {
        (true, Some(redirect)) => redirect,
        _ => error.message,
    };

    LauncherError::AuthRejected {
        provider: PROVIDER,
        hop,
        code: error.xerr.to_string(),
        message,
        reason,
    }
}

fn service_rejection(hop: AuthHop, status: StatusCode, raw: &str) -> LauncherError {
    let Ok(error) = serde_json::from_str::<ServiceError>(raw) else {
        return unstructured_rejection(PROVIDER, hop, status, raw);
    };
    let code = error
        .error_type
        .or(error.error)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let reason = if status == StatusCode::UNAUTHORIZED {
        AuthRejection::ReauthRequired
    } else {
        AuthRejection::Other
    };
    LauncherError::AuthRejected {
        provider: PROVIDER,
        hop,
        code,
        message: error.error_message.unwrap_or_default(),
        reason,
    }
}
