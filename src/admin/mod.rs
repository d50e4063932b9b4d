use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    config::AdminCredentials,
    session::{SessionRecord, SessionState, SessionSubject},
    storage::{Storage, StorageError, Store, keys},
};

pub mod directory;

pub const FAILED_ATTEMPT_CAPACITY: usize = 10;
pub const ACCESS_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdminLogEntry {
    pub action: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub admin: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedAdminAttempt {
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum AdminAuthError {
    #[error("Please enter both Admin ID and Password")]
    MissingCredentials,
    #[error("Admin sign-in is not configured")]
    NotConfigured,
    #[error("Invalid admin credentials")]
    InvalidCredentials,
    #[error("Admin is not signed in")]
    NotSignedIn,
    #[error("Admin session expired, please sign in again")]
    SessionExpired,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Appends to the bounded admin access log.
pub(crate) fn record_action<S: Storage>(
    store: &Store<S>,
    session: Option<&SessionRecord>,
    now: DateTime<Utc>,
    action: &str,
    details: String,
) -> Result<(), StorageError> {
    let entry = AdminLogEntry {
        action: action.to_string(),
        details,
        timestamp: now,
        admin: session
            .and_then(SessionRecord::admin_username)
            .unwrap_or("System")
            .to_string(),
        session_id: session.map(|s| s.session_id.clone()),
    };
    store.push_bounded(keys::ADMIN_LOGS, entry, ACCESS_LOG_CAPACITY)
}

pub struct AdminAuth<'a, S> {
    store: &'a Store<S>,
    clock: &'a dyn Clock,
    credentials: Option<&'a AdminCredentials>,
    ttl: Duration,
}

impl<'a, S: Storage> AdminAuth<'a, S> {
    pub fn new(
        store: &'a Store<S>,
        clock: &'a dyn Clock,
        credentials: Option<&'a AdminCredentials>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            credentials,
            ttl,
        }
    }

    pub fn sign_in(
        &self,
        username: &str,
        password: &str,
        vault_pin: Option<&str>,
    ) -> Result<SessionRecord, AdminAuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AdminAuthError::MissingCredentials);
        }
        let now = self.clock.now();

        let Some(credentials) = self.credentials else {
            self.record_failure(username, now, "admin sign-in not configured")?;
            return Err(AdminAuthError::NotConfigured);
        };
        let pin_ok = match credentials.vault_pin.as_deref() {
            Some(expected) => vault_pin == Some(expected),
            None => true,
        };
        if username != credentials.username || password != credentials.password || !pin_ok {
            self.record_failure(username, now, "invalid credentials")?;
            return Err(AdminAuthError::InvalidCredentials);
        }

        let session = SessionRecord::new(
            SessionSubject::Admin {
                username: username.to_string(),
            },
            "admin_sess_",
            now,
            self.ttl,
        );
        self.store.write(keys::ADMIN_SESSION, &session)?;
        record_action(
            self.store,
            Some(&session),
            now,
            "LOGIN",
            format!("Admin {username} logged in"),
        )?;
        info!(username, session_id = %session.session_id, "admin signed in");
        Ok(session)
    }

    fn record_failure(
        &self,
        username: &str,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), StorageError> {
        warn!(username, reason, "rejected admin sign-in");
        self.store.push_bounded(
            keys::ADMIN_FAILED_ATTEMPTS,
            FailedAdminAttempt {
                username: username.to_string(),
                timestamp: now,
                reason: reason.to_string(),
            },
            FAILED_ATTEMPT_CAPACITY,
        )
    }

    pub fn check_session(&self) -> Result<SessionState, AdminAuthError> {
        let Some(session) = self.store.read::<SessionRecord>(keys::ADMIN_SESSION)? else {
            return Ok(SessionState::Absent);
        };
        if session.admin_username().is_none() {
            self.store.remove(keys::ADMIN_SESSION)?;
            return Ok(SessionState::Absent);
        }
        if session.is_expired(self.clock.now()) {
            info!(session_id = %session.session_id, "admin session expired");
            self.store.remove(keys::ADMIN_SESSION)?;
            return Ok(SessionState::Expired);
        }
        Ok(SessionState::Active(session))
    }

    pub fn require_session(&self) -> Result<SessionRecord, AdminAuthError> {
        match self.check_session()? {
            SessionState::Active(session) => Ok(session),
            SessionState::Expired => Err(AdminAuthError::SessionExpired),
            SessionState::Absent => Err(AdminAuthError::NotSignedIn),
        }
    }

    pub fn logout(&self) -> Result<(), AdminAuthError> {
        if let Some(session) = self.store.read::<SessionRecord>(keys::ADMIN_SESSION)? {
            let username = session.admin_username().unwrap_or("unknown").to_string();
            record_action(
                self.store,
                Some(&session),
                self.clock.now(),
                "LOGOUT",
                format!("Admin {username} logged out"),
            )?;
            info!(username, "admin signed out");
        }
        self.store.remove(keys::ADMIN_SESSION)?;
        Ok(())
    }

    pub fn access_log(&self) -> Result<Vec<AdminLogEntry>, AdminAuthError> {
        Ok(self.store.load_collection(keys::ADMIN_LOGS)?.items)
    }

    pub fn failed_attempts(&self) -> Result<Vec<FailedAdminAttempt>, AdminAuthError> {
        Ok(self.store.load_collection(keys::ADMIN_FAILED_ATTEMPTS)?.items)
    }
}
