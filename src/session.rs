use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    ids,
    storage::{Storage, StorageError, Store, keys},
    wallet::{WalletDirectory, WalletRecord},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SessionSubject {
    Wallet { wallet_id: String },
    Admin { username: String },
}

/// Shared shape of user and admin sessions; each lives under its own key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(flatten)]
    pub subject: SessionSubject,
    pub session_id: String,
    pub login_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(subject: SessionSubject, id_prefix: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            subject,
            session_id: ids::time_based(id_prefix, now),
            login_time: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn wallet_id(&self) -> Option<&str> {
        match &self.subject {
            SessionSubject::Wallet { wallet_id } => Some(wallet_id),
            SessionSubject::Admin { .. } => None,
        }
    }

    pub fn admin_username(&self) -> Option<&str> {
        match &self.subject {
            SessionSubject::Admin { username } => Some(username),
            SessionSubject::Wallet { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Active(SessionRecord),
    /// The record had expired and has been cleared.
    Expired,
    Absent,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active(_))
    }

    pub fn into_active(self) -> Option<SessionRecord> {
        match self {
            SessionState::Active(session) => Some(session),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Please enter both Wallet ID and Password")]
    MissingCredentials,
    /// Deliberately the same for unknown id, wrong password and inactive wallet.
    #[error("Invalid Wallet ID or Password")]
    InvalidCredentials,
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Session expired, please sign in again")]
    SessionExpired,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Sign-in, session check and logout for wallet holders.
pub struct SessionManager<'a, S> {
    store: &'a Store<S>,
    clock: &'a dyn Clock,
    ttl: Duration,
}

impl<'a, S: Storage> SessionManager<'a, S> {
    pub fn new(store: &'a Store<S>, clock: &'a dyn Clock, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn sign_in(&self, wallet_id: &str, password: &str) -> Result<WalletRecord, SessionError> {
        if wallet_id.is_empty() || password.is_empty() {
            return Err(SessionError::MissingCredentials);
        }
        let now = self.clock.now();
        let wallet = self
            .store
            .update_collection(keys::USERS, |wallets: &mut Vec<WalletRecord>| -> Result<_, SessionError> {
                let wallet = wallets
                    .iter_mut()
                    .find(|w| w.matches_credentials(wallet_id, password))
                    .ok_or(SessionError::InvalidCredentials)?;
                wallet.last_login = Some(now);
                Ok(wallet.clone())
            })
            .inspect_err(|err| {
                if matches!(err, SessionError::InvalidCredentials) {
                    warn!(wallet_id, "rejected sign-in");
                }
            })?;

        let session = SessionRecord::new(
            SessionSubject::Wallet {
                wallet_id: wallet.wallet_id.clone(),
            },
            "sess_",
            now,
            self.ttl,
        );
        self.store.write(keys::SESSION, &session)?;
        info!(wallet_id, session_id = %session.session_id, "signed in");
        Ok(wallet)
    }

    pub fn check_session(&self) -> Result<SessionState, SessionError> {
        let Some(session) = self.store.read::<SessionRecord>(keys::SESSION)? else {
            return Ok(SessionState::Absent);
        };
        if session.is_expired(self.clock.now()) {
            info!(session_id = %session.session_id, "session expired");
            self.store.remove(keys::SESSION)?;
            return Ok(SessionState::Expired);
        }
        let wallets = self.store.load_collection::<WalletRecord>(keys::USERS)?;
        let usable = session
            .wallet_id()
            .and_then(|id| wallets.items.find_wallet(id))
            .is_some_and(WalletRecord::is_active);
        if !usable {
            info!(session_id = %session.session_id, "dropping session for missing or inactive wallet");
            self.store.remove(keys::SESSION)?;
            return Ok(SessionState::Absent);
        }
        Ok(SessionState::Active(session))
    }

    pub fn require_session(&self) -> Result<SessionRecord, SessionError> {
        match self.check_session()? {
            SessionState::Active(session) => Ok(session),
            SessionState::Expired => Err(SessionError::SessionExpired),
            SessionState::Absent => Err(SessionError::NotSignedIn),
        }
    }

    pub fn logout(&self) -> Result<(), SessionError> {
        self.store.remove(keys::SESSION)?;
        info!("signed out");
        Ok(())
    }
}
