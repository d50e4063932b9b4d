use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids;

pub const CURRENCY: &str = "SYP";

pub type WalletId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
}

/// How a booked transaction moves the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    Credit,
    Debit,
    Unchanged,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
        }
    }

    /// Effect of an admin-added transaction of this kind. Transfers carry no implied direction.
    pub fn default_effect(self) -> BalanceEffect {
        match self {
            TransactionKind::Deposit => BalanceEffect::Credit,
            TransactionKind::Withdrawal => BalanceEffect::Debit,
            TransactionKind::Transfer => BalanceEffect::Unchanged,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WalletStatus::Active => "active",
            WalletStatus::Inactive => "inactive",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown value `{0}`")]
pub struct UnknownVariant(pub String);

impl FromStr for TransactionKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" | "withdraw" => Ok(TransactionKind::Withdrawal),
            "transfer" => Ok(TransactionKind::Transfer),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

impl FromStr for WalletStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(WalletStatus::Active),
            "inactive" => Ok(WalletStatus::Inactive),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    /// Same value as the wallet id.
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub status: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub admin_notes: String,
}

impl TransactionRecord {
    pub fn completed(
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
        admin_notes: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ids::time_based("", now),
            kind,
            amount,
            status: "completed".to_string(),
            description: description.into(),
            timestamp: now,
            admin_notes: admin_notes.into(),
        }
    }
}

/// Fields an admin supplies when creating a wallet.
#[derive(Debug, Clone, Default)]
pub struct NewWallet {
    pub wallet_id: String,
    pub password: String,
    pub full_name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum WalletError {
    #[error("Insufficient balance: {available} SYP available, {requested} SYP requested")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub wallet_id: WalletId,
    pub password: String,
    pub user_data: Profile,
    pub balance: Decimal,
    pub currency: String,
    pub status: WalletStatus,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    /// Newest first.
    pub transactions: Vec<TransactionRecord>,
}

impl WalletRecord {
    pub fn new(fields: NewWallet, now: DateTime<Utc>) -> Self {
        Self {
            user_data: Profile {
                full_name: fields.full_name,
                phone: fields.phone,
                email: fields.email,
                username: fields.wallet_id.clone(),
            },
            wallet_id: fields.wallet_id,
            password: fields.password,
            balance: Decimal::ZERO,
            currency: CURRENCY.to_string(),
            status: WalletStatus::Active,
            created_at: now,
            last_login: None,
            transactions: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WalletStatus::Active
    }

    pub fn matches_credentials(&self, wallet_id: &str, password: &str) -> bool {
        self.wallet_id == wallet_id && self.password == password && self.is_active()
    }

    pub fn ensure_funds(&self, amount: Decimal) -> Result<(), WalletError> {
        if amount > self.balance {
            Err(WalletError::InsufficientFunds {
                available: self.balance,
                requested: amount,
            })
        } else {
            Ok(())
        }
    }

    /// Puts the transaction at the front of the log and moves the balance.
    /// No funds check happens here; callers that need one use [`WalletRecord::ensure_funds`].
    pub fn book(&mut self, transaction: TransactionRecord, effect: BalanceEffect) {
        match effect {
            BalanceEffect::Credit => self.balance += transaction.amount,
            BalanceEffect::Debit => self.balance -= transaction.amount,
            BalanceEffect::Unchanged => {}
        }
        self.transactions.insert(0, transaction);
    }
}

/// Lookup helpers over the persisted wallet array.
pub trait WalletDirectory {
    fn find_wallet(&self, wallet_id: &str) -> Option<&WalletRecord>;
    fn find_wallet_mut(&mut self, wallet_id: &str) -> Option<&mut WalletRecord>;
}

impl WalletDirectory for Vec<WalletRecord> {
    fn find_wallet(&self, wallet_id: &str) -> Option<&WalletRecord> {
        self.iter().find(|w| w.wallet_id == wallet_id)
    }

    fn find_wallet_mut(&mut self, wallet_id: &str) -> Option<&mut WalletRecord> {
        self.iter_mut().find(|w| w.wallet_id == wallet_id)
    }
}
