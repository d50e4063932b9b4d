use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    request::{PendingRequest, RequestDetails},
    session::SessionRecord,
    storage::{Storage, StorageError, Store, keys},
    wallet::{
        BalanceEffect, NewWallet, TransactionKind, TransactionRecord, WalletDirectory, WalletError,
        WalletRecord, WalletStatus,
    },
};

use super::record_action;

const ADMIN_NOTE: &str = "Added via admin dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Missing required field `{0}`")]
    MissingField(&'static str),
    #[error("Wallet ID `{wallet_id}` already exists")]
    DuplicateWalletId { wallet_id: String },
    #[error("User `{wallet_id}` not found")]
    WalletNotFound { wallet_id: String },
    #[error("Please enter a valid amount")]
    InvalidAmount,
    #[error("Deletion was not confirmed")]
    NotConfirmed,
    #[error("Pending request `{request_id}` not found")]
    RequestNotFound { request_id: String },
    #[error(transparent)]
    Funds(#[from] WalletError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryStats {
    pub total_users: usize,
    pub total_balance: Decimal,
    pub active_users: usize,
}

fn not_found(wallet_id: &str) -> DirectoryError {
    DirectoryError::WalletNotFound {
        wallet_id: wallet_id.to_string(),
    }
}

/// Administrative operations over the wallet directory and the request queue.
///
/// Only reachable through an active admin session (see [`crate::ledger::Ledger::directory`]);
/// every mutation is written to the admin access log.
pub struct AdminDirectory<'a, S> {
    store: &'a Store<S>,
    clock: &'a dyn Clock,
    session: SessionRecord,
}

impl<'a, S: Storage> AdminDirectory<'a, S> {
    pub(crate) fn new(store: &'a Store<S>, clock: &'a dyn Clock, session: SessionRecord) -> Self {
        Self {
            store,
            clock,
            session,
        }
    }

    pub fn session(&self) -> &SessionRecord {
        &self.session
    }

    fn audit(&self, action: &str, details: String) -> Result<(), StorageError> {
        info!(action, %details, "admin action");
        record_action(
            self.store,
            Some(&self.session),
            self.clock.now(),
            action,
            details,
        )
    }

    fn update_wallet<R>(
        &self,
        wallet_id: &str,
        f: impl FnOnce(&mut WalletRecord) -> Result<R, DirectoryError>,
    ) -> Result<R, DirectoryError> {
        self.store.update_collection(
            keys::USERS,
            |wallets: &mut Vec<WalletRecord>| -> Result<R, DirectoryError> {
                let wallet = wallets
                    .find_wallet_mut(wallet_id)
                    .ok_or_else(|| not_found(wallet_id))?;
                f(wallet)
            },
        )
    }

    pub fn create_user(&self, fields: NewWallet) -> Result<WalletRecord, DirectoryError> {
        if fields.wallet_id.trim().is_empty() {
            return Err(DirectoryError::MissingField("walletId"));
        }
        if fields.password.is_empty() {
            return Err(DirectoryError::MissingField("password"));
        }
        if fields.full_name.trim().is_empty() {
            return Err(DirectoryError::MissingField("fullName"));
        }
        let record = WalletRecord::new(fields, self.clock.now());
        let created = self.store.update_collection(
            keys::USERS,
            |wallets: &mut Vec<WalletRecord>| -> Result<_, DirectoryError> {
                if wallets.find_wallet(&record.wallet_id).is_some() {
                    return Err(DirectoryError::DuplicateWalletId {
                        wallet_id: record.wallet_id.clone(),
                    });
                }
                wallets.push(record.clone());
                Ok(record)
            },
        )?;
        self.audit(
            "CREATE_USER",
            format!("Created wallet {}", created.wallet_id),
        )?;
        Ok(created)
    }

    pub fn list_users(&self) -> Result<Vec<WalletRecord>, DirectoryError> {
        Ok(self.store.load_collection(keys::USERS)?.items)
    }

    pub fn get_user(&self, wallet_id: &str) -> Result<WalletRecord, DirectoryError> {
        self.list_users()?
            .into_iter()
            .find(|w| w.wallet_id == wallet_id)
            .ok_or_else(|| not_found(wallet_id))
    }

    pub fn stats(&self) -> Result<DirectoryStats, DirectoryError> {
        let wallets = self.list_users()?;
        Ok(DirectoryStats {
            total_users: wallets.len(),
            total_balance: wallets.iter().map(|w| w.balance).sum(),
            active_users: wallets.iter().filter(|w| w.is_active()).count(),
        })
    }

    /// Overwrites the balance. No transaction is recorded.
    pub fn set_balance(
        &self,
        wallet_id: &str,
        new_balance: Decimal,
    ) -> Result<WalletRecord, DirectoryError> {
        let wallet = self.update_wallet(wallet_id, |wallet| {
            wallet.balance = new_balance;
            Ok(wallet.clone())
        })?;
        self.audit(
            "UPDATE_BALANCE",
            format!("Balance of {wallet_id} set to {new_balance:.2} SYP"),
        )?;
        Ok(wallet)
    }

    /// Books a completed transaction. Withdrawals are not checked against the balance.
    pub fn append_transaction(
        &self,
        wallet_id: &str,
        kind: TransactionKind,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<TransactionRecord, DirectoryError> {
        if amount <= Decimal::ZERO {
            return Err(DirectoryError::InvalidAmount);
        }
        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("{kind} transaction"));
        let now = self.clock.now();
        let transaction = self.update_wallet(wallet_id, |wallet| {
            let transaction =
                TransactionRecord::completed(kind, amount, description, ADMIN_NOTE, now);
            wallet.book(transaction.clone(), kind.default_effect());
            Ok(transaction)
        })?;
        self.audit(
            "ADD_TRANSACTION",
            format!("{kind} of {amount} SYP added for {wallet_id}"),
        )?;
        Ok(transaction)
    }

    pub fn set_status(
        &self,
        wallet_id: &str,
        status: WalletStatus,
    ) -> Result<WalletRecord, DirectoryError> {
        let wallet = self.update_wallet(wallet_id, |wallet| {
            wallet.status = status;
            Ok(wallet.clone())
        })?;
        self.audit("SET_STATUS", format!("Wallet {wallet_id} is now {status}"))?;
        Ok(wallet)
    }

    /// Irreversibly removes the wallet.
    pub fn delete_user(
        &self,
        wallet_id: &str,
        confirmation: Confirmation,
    ) -> Result<WalletRecord, DirectoryError> {
        if confirmation != Confirmation::Confirmed {
            return Err(DirectoryError::NotConfirmed);
        }
        let removed = self.store.update_collection(
            keys::USERS,
            |wallets: &mut Vec<WalletRecord>| -> Result<_, DirectoryError> {
                let index = wallets
                    .iter()
                    .position(|w| w.wallet_id == wallet_id)
                    .ok_or_else(|| not_found(wallet_id))?;
                Ok(wallets.remove(index))
            },
        )?;
        self.audit("DELETE_USER", format!("Deleted wallet {wallet_id}"))?;
        Ok(removed)
    }

    pub fn pending_requests(&self) -> Result<Vec<PendingRequest>, DirectoryError> {
        Ok(self.store.load_collection(keys::PENDING_REQUESTS)?.items)
    }

    fn drain_request(&self, request_id: &str) -> Result<(usize, PendingRequest), DirectoryError> {
        self.store.update_collection(
            keys::PENDING_REQUESTS,
            |requests: &mut Vec<PendingRequest>| -> Result<_, DirectoryError> {
                let index = requests
                    .iter()
                    .position(|r| r.id == request_id)
                    .ok_or_else(|| DirectoryError::RequestNotFound {
                        request_id: request_id.to_string(),
                    })?;
                Ok((index, requests.remove(index)))
            },
        )
    }

    fn requeue(&self, index: usize, request: PendingRequest) -> Result<(), StorageError> {
        self.store.update_collection(
            keys::PENDING_REQUESTS,
            |requests: &mut Vec<PendingRequest>| -> Result<(), StorageError> {
                requests.insert(index.min(requests.len()), request);
                Ok(())
            },
        )
    }

    fn book_request(&self, request: &PendingRequest) -> Result<(), DirectoryError> {
        let now = self.clock.now();
        let note = format!("Approved request {}", request.id);
        let amount = request.amount;

        self.store.update_collection(
            keys::USERS,
            |wallets: &mut Vec<WalletRecord>| -> Result<(), DirectoryError> {
                match &request.details {
                    RequestDetails::Deposit { wallet_id, method } => {
                        let wallet = wallets
                            .find_wallet_mut(wallet_id)
                            .ok_or_else(|| not_found(wallet_id))?;
                        wallet.book(
                            TransactionRecord::completed(
                                TransactionKind::Deposit,
                                amount,
                                format!("Deposit via {method}"),
                                note.clone(),
                                now,
                            ),
                            BalanceEffect::Credit,
                        );
                    }
                    RequestDetails::Withdrawal {
                        wallet_id,
                        bank_account,
                    } => {
                        let wallet = wallets
                            .find_wallet_mut(wallet_id)
                            .ok_or_else(|| not_found(wallet_id))?;
                        wallet.ensure_funds(amount)?;
                        wallet.book(
                            TransactionRecord::completed(
                                TransactionKind::Withdrawal,
                                amount,
                                format!("Withdrawal to bank account {bank_account}"),
                                note.clone(),
                                now,
                            ),
                            BalanceEffect::Debit,
                        );
                    }
                    RequestDetails::Transfer {
                        from_wallet_id,
                        to_wallet_id,
                        note: user_note,
                    } => {
                        if wallets.find_wallet(to_wallet_id).is_none() {
                            return Err(not_found(to_wallet_id));
                        }
                        let sender = wallets
                            .find_wallet_mut(from_wallet_id)
                            .ok_or_else(|| not_found(from_wallet_id))?;
                        sender.ensure_funds(amount)?;
                        let suffix = if user_note.is_empty() {
                            String::new()
                        } else {
                            format!(" ({user_note})")
                        };
                        sender.book(
                            TransactionRecord::completed(
                                TransactionKind::Transfer,
                                amount,
                                format!("Transfer to {to_wallet_id}{suffix}"),
                                note.clone(),
                                now,
                            ),
                            BalanceEffect::Debit,
                        );
                        if let Some(recipient) = wallets.find_wallet_mut(to_wallet_id) {
                            recipient.book(
                                TransactionRecord::completed(
                                    TransactionKind::Transfer,
                                    amount,
                                    format!("Transfer from {from_wallet_id}{suffix}"),
                                    note.clone(),
                                    now,
                                ),
                                BalanceEffect::Credit,
                            );
                        }
                    }
                }
                Ok(())
            },
        )
    }

    /// Takes the request off the queue, then books it against the directory.
    ///
    /// Only the caller whose drain succeeds books anything, so a request is
    /// booked at most once. Funds are checked at approval time; when booking
    /// fails the request goes back to its place in the queue.
    pub fn approve_request(&self, request_id: &str) -> Result<PendingRequest, DirectoryError> {
        let (index, request) = self.drain_request(request_id)?;
        if let Err(err) = self.book_request(&request) {
            warn!(request_id, %err, "approval failed, returning request to the queue");
            self.requeue(index, request)?;
            return Err(err);
        }
        self.audit(
            "APPROVE_REQUEST",
            format!(
                "Approved {} of {} SYP for {}",
                request.kind(),
                request.amount,
                request.owner()
            ),
        )?;
        Ok(request)
    }

    /// Removes the request from the queue without booking anything.
    pub fn reject_request(&self, request_id: &str) -> Result<PendingRequest, DirectoryError> {
        let (_, drained) = self.drain_request(request_id)?;
        self.audit(
            "REJECT_REQUEST",
            format!(
                "Rejected {} of {} SYP for {}",
                drained.kind(),
                drained.amount,
                drained.owner()
            ),
        )?;
        Ok(drained)
    }
}
