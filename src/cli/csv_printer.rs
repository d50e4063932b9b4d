use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    admin::AdminLogEntry,
    request::{PendingRequest, RequestDetails},
    wallet::{TransactionKind, TransactionRecord, WalletRecord, WalletStatus},
};

#[derive(Debug, Serialize)]
pub struct WalletRow<'a> {
    pub wallet_id: &'a str,
    pub full_name: &'a str,
    pub phone: &'a str,
    pub email: &'a str,
    pub balance: Decimal,
    pub status: WalletStatus,
    pub last_login: Option<DateTime<Utc>>,
    pub transactions: usize,
}

impl<'a> From<&'a WalletRecord> for WalletRow<'a> {
    fn from(wallet: &'a WalletRecord) -> Self {
        Self {
            wallet_id: &wallet.wallet_id,
            full_name: &wallet.user_data.full_name,
            phone: &wallet.user_data.phone,
            email: &wallet.user_data.email,
            balance: wallet.balance,
            status: wallet.status,
            last_login: wallet.last_login,
            transactions: wallet.transactions.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionRow<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub status: &'a str,
    pub description: &'a str,
    pub timestamp: DateTime<Utc>,
}

impl<'a> From<&'a TransactionRecord> for TransactionRow<'a> {
    fn from(tx: &'a TransactionRecord) -> Self {
        Self {
            id: &tx.id,
            kind: tx.kind,
            amount: tx.amount,
            status: &tx.status,
            description: &tx.description,
            timestamp: tx.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestRow<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub wallet: &'a str,
    /// Method, bank account or recipient, depending on the type.
    pub target: &'a str,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub note: &'a str,
}

impl<'a> From<&'a PendingRequest> for RequestRow<'a> {
    fn from(request: &'a PendingRequest) -> Self {
        let target = match &request.details {
            RequestDetails::Deposit { method, .. } => method,
            RequestDetails::Withdrawal { bank_account, .. } => bank_account,
            RequestDetails::Transfer { to_wallet_id, .. } => to_wallet_id,
        };
        Self {
            id: &request.id,
            kind: request.kind(),
            wallet: request.owner(),
            target,
            amount: request.amount,
            timestamp: request.timestamp,
            note: &request.user_note,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogRow<'a> {
    pub timestamp: DateTime<Utc>,
    pub admin: &'a str,
    pub action: &'a str,
    pub details: &'a str,
}

impl<'a> From<&'a AdminLogEntry> for LogRow<'a> {
    fn from(entry: &'a AdminLogEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            admin: &entry.admin,
            action: &entry.action,
            details: &entry.details,
        }
    }
}

pub fn print_rows<W, T>(output: &mut W, rows: impl Iterator<Item = T>) -> Result<()>
where
    W: Write,
    T: Serialize,
{
    let mut writer = Writer::from_writer(output);
    for row in rows {
        writer.serialize(row).context("Failed to write CSV row")?;
    }
    writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}
