use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

use super::{default_refresh_skew, AuthProvider, Credential};

/// Provider able to trade a stored credential for a fresh one.
#[async_trait]
pub trait RefreshProvider: Send + Sync {
    fn provider(&self) -> AuthProvider;

    async fn refresh(&self, credential: &Credential) -> LauncherResult<Credential>;
}

type Slot = Arc<AsyncMutex<Option<Credential>>>;

/// Serialises refreshes per (provider, identity).
///
/// Two refreshes racing for the same account would each consume the refresh
/// token and invalidate the other's result, so the second caller waits and
/// then reuses whatever the first one obtained.
pub struct CredentialBroker {
    providers: HashMap<AuthProvider, Arc<dyn RefreshProvider>>,
    slots: Mutex<HashMap<(AuthProvider, String), Slot>>,
    skew: Duration,
}

impl Default for CredentialBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBroker {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            slots: Mutex::new(HashMap::new()),
            skew: default_refresh_skew(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn RefreshProvider>) -> Self {
        self.providers.insert(provider.provider(), provider);
        self
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    fn slot(&self, key: (AuthProvider, String)) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots.entry(key).or_default().clone()
    }

    /// Return `credential` unchanged while it is fresh, otherwise refresh it.
    pub async fn ensure_fresh(&self, credential: &Credential) -> LauncherResult<Credential> {
        if !credential.needs_refresh(Utc::now(), self.skew) {
            return Ok(credential.clone());
        }

        let slot = self.slot(credential.key());
        let mut latest = slot.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(current) = latest.as_ref() {
            if !current.needs_refresh(Utc::now(), self.skew) {
                debug!("Reusing credential refreshed by a concurrent caller");
                return Ok(current.clone());
            }
        }

        let provider = self.providers.get(&credential.provider).ok_or_else(|| {
            LauncherError::Other(format!("No refresh provider for {}", credential.provider))
        })?;

        let source = latest.clone().unwrap_or_else(|| credential.clone());
        info!("Refreshing {} credential for {}", source.provider, source.username);
        let refreshed = provider.refresh(&source).await?;
        *latest = Some(refreshed.clone());
        Ok(refreshed)
    }

    /// Forget any refreshed state for the account (logout).
    pub fn discard(&self, credential: &Credential) {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots.remove(&credential.key());
    }
}
