use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    request::{PendingRequest, RequestError},
    storage::{Storage, StorageError, Store, keys},
    wallet::{WalletDirectory, WalletRecord},
};

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("Wallet `{wallet_id}` no longer exists, signed out")]
    WalletMissing { wallet_id: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What the dashboard shows after a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub wallet: WalletRecord,
    pub pending: Vec<PendingRequest>,
}

/// The signed-in wallet holder's view: balance, history and request submission.
///
/// Requests only enter the pending queue. Balance changes come exclusively
/// from admin actions, which the holder sees on the next [`UserDashboard::refresh`].
pub struct UserDashboard<'a, S> {
    store: &'a Store<S>,
    clock: &'a dyn Clock,
    wallet_id: String,
}

impl<'a, S: Storage> UserDashboard<'a, S> {
    pub(crate) fn new(store: &'a Store<S>, clock: &'a dyn Clock, wallet_id: String) -> Self {
        Self {
            store,
            clock,
            wallet_id,
        }
    }

    pub fn wallet_id(&self) -> &str {
        &self.wallet_id
    }

    fn directory(&self) -> Result<(WalletRecord, Vec<WalletRecord>), DashboardError> {
        let wallets = self.store.load_collection::<WalletRecord>(keys::USERS)?.items;
        match wallets.find_wallet(&self.wallet_id) {
            Some(wallet) => Ok((wallet.clone(), wallets)),
            None => {
                warn!(wallet_id = %self.wallet_id, "signed-in wallet vanished");
                self.store.remove(keys::SESSION)?;
                Err(DashboardError::WalletMissing {
                    wallet_id: self.wallet_id.clone(),
                })
            }
        }
    }

    pub fn current_wallet(&self) -> Result<WalletRecord, DashboardError> {
        Ok(self.directory()?.0)
    }

    fn enqueue(&self, request: PendingRequest) -> Result<PendingRequest, DashboardError> {
        info!(
            wallet_id = %self.wallet_id,
            request_id = %request.id,
            kind = %request.kind(),
            amount = %request.amount,
            "request submitted"
        );
        self.store.update_collection(
            keys::PENDING_REQUESTS,
            |requests: &mut Vec<PendingRequest>| -> Result<_, DashboardError> {
                requests.push(request.clone());
                Ok(request)
            },
        )
    }

    pub fn request_deposit(
        &self,
        amount: Decimal,
        method: &str,
    ) -> Result<PendingRequest, DashboardError> {
        let wallet = self.current_wallet()?;
        let request = PendingRequest::deposit(&wallet, amount, method, self.clock.now())?;
        self.enqueue(request)
    }

    pub fn request_withdrawal(
        &self,
        amount: Decimal,
        bank_account: &str,
    ) -> Result<PendingRequest, DashboardError> {
        let wallet = self.current_wallet()?;
        let request = PendingRequest::withdrawal(&wallet, amount, bank_account, self.clock.now())?;
        self.enqueue(request)
    }

    pub fn request_transfer(
        &self,
        recipient: &str,
        amount: Decimal,
        note: &str,
    ) -> Result<PendingRequest, DashboardError> {
        let (wallet, wallets) = self.directory()?;
        let request =
            PendingRequest::transfer(&wallet, &wallets, recipient, amount, note, self.clock.now())?;
        self.enqueue(request)
    }

    /// Requests this wallet submitted or receives.
    pub fn my_requests(&self) -> Result<Vec<PendingRequest>, DashboardError> {
        let requests = self
            .store
            .load_collection::<PendingRequest>(keys::PENDING_REQUESTS)?
            .items;
        Ok(requests
            .into_iter()
            .filter(|r| r.involves(&self.wallet_id))
            .collect())
    }

    /// Re-reads everything from storage; called on every poll tick.
    pub fn refresh(&self) -> Result<DashboardSnapshot, DashboardError> {
        Ok(DashboardSnapshot {
            wallet: self.current_wallet()?,
            pending: self.my_requests()?,
        })
    }
}
