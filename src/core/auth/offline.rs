use chrono::{Duration, Utc};
use md5::{Digest, Md5};
use uuid::Uuid;

use super::{AuthProvider, Credential};

const OFFLINE_NAMESPACE: &str = "OfflinePlayer:";
const DEFAULT_USERNAME: &str = "Player";

impl Credential {
    /// Local-only identity. The id is the name-based UUID servers assign to
    /// offline players, so worlds and inventories stay attached to the name.
    pub fn offline(username: &str) -> Self {
        let username = match username.trim() {
            "" => DEFAULT_USERNAME,
            trimmed => trimmed,
        };

        Self {
            provider: AuthProvider::Offline,
            identity_id: offline_identity(username).simple().to_string(),
            username: username.to_string(),
            access_token: "0".into(),
            refresh_token: None,
            token_chain: Vec::new(),
            expires_at: Utc::now() + Duration::days(365 * 100),
            user_type: "legacy".into(),
            xuid: None,
            client_id: None,
        }
    }
}

/// MD5 of `OfflinePlayer:<name>` with the version-3 and RFC 4122 variant bits set.
pub(crate) fn offline_identity(username: &str) -> Uuid {
    let digest = Md5::digest(format!("{OFFLINE_NAMESPACE}{username}").as_bytes());
    let mut bytes = [0_u8; 16];
    bytes.copy_from_slice(&digest);
    bytes[6] = (bytes[6] & 0x0f) | 0x30;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_deterministic_version_3() {
        let a = offline_identity("Steve");
        let b = offline_identity("Steve");
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 3);
        assert_ne!(a, offline_identity("Alex"));
    }

    #[test]
    fn offline_credential_never_needs_refresh() {
        let credential = Credential::offline("  Steve ");
        assert_eq!(credential.username, "Steve");
        assert_eq!(credential.access_token, "0");
        assert_eq!(credential.identity_id.len(), 32);
        assert!(!credential.needs_refresh(Utc::now(), Duration::minutes(5)));
    }

    #[test]
    fn blank_name_falls_back() {
        assert_eq!(Credential::offline("   ").username, "Player");
    }
}
