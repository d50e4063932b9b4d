use std::sync::Arc;

use crate::{
    admin::{AdminAuth, AdminAuthError, directory::AdminDirectory},
    clock::{Clock, SystemClock},
    config::Config,
    dashboard::UserDashboard,
    onboarding::{Notifier, Onboarding},
    session::{SessionError, SessionManager},
    storage::{Storage, Store},
};

/// Everything the managers share, built once at startup.
pub struct Ledger<S> {
    store: Store<S>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl<S: Storage> Ledger<S> {
    pub fn new(storage: S, config: Config) -> Self {
        Self::with_clock(storage, config, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: S, config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Store::new(storage, config.key_prefix.clone()),
            clock,
            config,
        }
    }

    pub fn store(&self) -> &Store<S> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn sessions(&self) -> SessionManager<'_, S> {
        SessionManager::new(&self.store, self.clock(), self.config.session_ttl)
    }

    pub fn admin(&self) -> AdminAuth<'_, S> {
        AdminAuth::new(
            &self.store,
            self.clock(),
            self.config.admin_credentials.as_ref(),
            self.config.admin_session_ttl,
        )
    }

    /// Admin operations, available only while an admin session is active.
    pub fn directory(&self) -> Result<AdminDirectory<'_, S>, AdminAuthError> {
        let session = self.admin().require_session()?;
        Ok(AdminDirectory::new(&self.store, self.clock(), session))
    }

    /// The signed-in holder's dashboard, available only while a user session is active.
    pub fn dashboard(&self) -> Result<UserDashboard<'_, S>, SessionError> {
        let session = self.sessions().require_session()?;
        let wallet_id = session
            .wallet_id()
            .ok_or(SessionError::NotSignedIn)?
            .to_string();
        Ok(UserDashboard::new(&self.store, self.clock(), wallet_id))
    }

    pub fn onboarding<'a>(&'a self, notifier: &'a dyn Notifier) -> Onboarding<'a, S> {
        Onboarding::new(&self.store, self.clock(), notifier)
    }
}
