use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ids,
    wallet::{TransactionKind, WalletDirectory, WalletError, WalletRecord},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum RequestDetails {
    Deposit {
        wallet_id: String,
        method: String,
    },
    Withdrawal {
        wallet_id: String,
        bank_account: String,
    },
    Transfer {
        from_wallet_id: String,
        to_wallet_id: String,
        note: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub id: String,
    #[serde(flatten)]
    pub details: RequestDetails,
    pub amount: Decimal,
    pub status: RequestStatus,
    pub timestamp: DateTime<Utc>,
    pub user_note: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("Please enter a valid amount")]
    InvalidAmount,
    #[error("Please select a payment method")]
    MethodRequired,
    #[error("Please enter your bank account number")]
    BankAccountRequired,
    #[error("Please enter recipient wallet ID")]
    RecipientRequired,
    #[error("Recipient wallet ID not found")]
    RecipientNotFound { wallet_id: String },
    #[error(transparent)]
    Funds(#[from] WalletError),
}

fn ensure_positive(amount: Decimal) -> Result<(), RequestError> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(RequestError::InvalidAmount)
    }
}

impl PendingRequest {
    pub fn kind(&self) -> TransactionKind {
        match self.details {
            RequestDetails::Deposit { .. } => TransactionKind::Deposit,
            RequestDetails::Withdrawal { .. } => TransactionKind::Withdrawal,
            RequestDetails::Transfer { .. } => TransactionKind::Transfer,
        }
    }

    /// The wallet that submitted the request.
    pub fn owner(&self) -> &str {
        match &self.details {
            RequestDetails::Deposit { wallet_id, .. }
            | RequestDetails::Withdrawal { wallet_id, .. } => wallet_id,
            RequestDetails::Transfer { from_wallet_id, .. } => from_wallet_id,
        }
    }

    pub fn involves(&self, wallet_id: &str) -> bool {
        match &self.details {
            RequestDetails::Transfer {
                from_wallet_id,
                to_wallet_id,
                ..
            } => from_wallet_id == wallet_id || to_wallet_id == wallet_id,
            _ => self.owner() == wallet_id,
        }
    }

    pub fn deposit(
        wallet: &WalletRecord,
        amount: Decimal,
        method: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, RequestError> {
        ensure_positive(amount)?;
        let method = method.trim();
        if method.is_empty() {
            return Err(RequestError::MethodRequired);
        }
        Ok(Self {
            id: ids::time_based("dep_", now),
            user_note: format!("Deposit request via {method}"),
            details: RequestDetails::Deposit {
                wallet_id: wallet.wallet_id.clone(),
                method: method.to_string(),
            },
            amount,
            status: RequestStatus::Pending,
            timestamp: now,
        })
    }

    /// The balance check is advisory: nothing is reserved, so several
    /// withdrawals may together exceed the balance.
    pub fn withdrawal(
        wallet: &WalletRecord,
        amount: Decimal,
        bank_account: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, RequestError> {
        ensure_positive(amount)?;
        wallet.ensure_funds(amount)?;
        let bank_account = bank_account.trim();
        if bank_account.is_empty() {
            return Err(RequestError::BankAccountRequired);
        }
        Ok(Self {
            id: ids::time_based("withdraw_", now),
            user_note: format!("Withdrawal to bank account {bank_account}"),
            details: RequestDetails::Withdrawal {
                wallet_id: wallet.wallet_id.clone(),
                bank_account: bank_account.to_string(),
            },
            amount,
            status: RequestStatus::Pending,
            timestamp: now,
        })
    }

    pub fn transfer(
        wallet: &WalletRecord,
        directory: &impl WalletDirectory,
        recipient: &str,
        amount: Decimal,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, RequestError> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(RequestError::RecipientRequired);
        }
        ensure_positive(amount)?;
        wallet.ensure_funds(amount)?;
        if directory.find_wallet(recipient).is_none() {
            return Err(RequestError::RecipientNotFound {
                wallet_id: recipient.to_string(),
            });
        }
        Ok(Self {
            id: ids::time_based("transfer_", now),
            user_note: format!("Transfer to {recipient}"),
            details: RequestDetails::Transfer {
                from_wallet_id: wallet.wallet_id.clone(),
                to_wallet_id: recipient.to_string(),
                note: note.to_string(),
            },
            amount,
            status: RequestStatus::Pending,
            timestamp: now,
        })
    }
}
