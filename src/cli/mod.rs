//! Command-line surface over [`Ledger`]. Lives in the library so integration
//! tests can drive it without spawning the binary.

use std::{io::Write, path::PathBuf, thread};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crate::{
    admin::directory::Confirmation,
    currency::Basket,
    ledger::Ledger,
    onboarding::{Notifier, PersonalInfo, WalletRequest},
    session::SessionState,
    storage::Storage,
    wallet::{NewWallet, TransactionKind, WalletStatus},
};
use csv_printer::{LogRow, RequestRow, TransactionRow, WalletRow, print_rows};

pub mod csv_printer;

#[derive(Debug, Parser)]
#[command(name = "ugarit-wallet", version, about = "Local Ugarit wallet ledger")]
pub struct Cli {
    /// Directory holding the persisted records (overrides UGARIT_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in to a wallet
    SignIn { wallet_id: String, password: String },
    SignOut,
    /// Show whether a wallet session is active
    Status,
    /// Balance, pending requests and transaction history
    Balance,
    /// Ask the operator to credit the wallet
    Deposit {
        amount: Decimal,
        #[arg(long)]
        method: String,
    },
    /// Ask the operator to pay out to a bank account
    Withdraw {
        amount: Decimal,
        #[arg(long)]
        bank_account: String,
    },
    /// Ask the operator to move funds to another wallet
    Transfer {
        recipient: String,
        amount: Decimal,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Pending requests involving the signed-in wallet
    Requests,
    /// Refresh the dashboard on the configured poll interval
    Watch {
        /// Stop after this many refreshes
        #[arg(long)]
        ticks: Option<u32>,
    },
    /// Submit a wallet application
    Apply {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        id_type: String,
        #[arg(long)]
        id_number: String,
        #[arg(long)]
        agree_terms: bool,
    },
    /// Ask the operator for a new wallet and receive a temporary id
    RequestWallet {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long, default_value = "")]
        plan: String,
    },
    /// Show the reference basket and what an amount of UGR buys
    Basket {
        #[arg(long, default_value = "1")]
        ugr: Decimal,
    },
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    SignIn {
        username: String,
        password: String,
        #[arg(long)]
        vault_pin: Option<String>,
    },
    SignOut,
    /// Totals across the directory
    Stats,
    CreateUser {
        #[arg(long)]
        wallet_id: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    ListUsers,
    GetUser {
        wallet_id: String,
    },
    /// Overwrite a balance without recording a transaction
    SetBalance {
        wallet_id: String,
        #[arg(allow_negative_numbers = true)]
        amount: Decimal,
    },
    AddTransaction {
        wallet_id: String,
        kind: TransactionKind,
        amount: Decimal,
        #[arg(long)]
        description: Option<String>,
    },
    SetStatus {
        wallet_id: String,
        status: WalletStatus,
    },
    DeleteUser {
        wallet_id: String,
        /// Confirm the irreversible deletion
        #[arg(long)]
        yes: bool,
    },
    Requests,
    Approve {
        request_id: String,
    },
    Reject {
        request_id: String,
    },
    /// Access log and failed sign-in attempts
    Logs,
}

pub struct Service<'w, S, W: 'w> {
    pub ledger: Ledger<S>,
    pub output: &'w mut W,
    pub notifier: Box<dyn Notifier>,
}

impl<'w, S, W> Service<'w, S, W>
where
    S: Storage,
    W: Write + 'w,
{
    pub fn run(self, command: Command) -> Result<()> {
        let Service {
            ledger,
            output,
            notifier,
        } = self;
        match command {
            Command::SignIn {
                wallet_id,
                password,
            } => {
                let delay = ledger.config().sign_in_delay;
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                let wallet = ledger.sessions().sign_in(&wallet_id, &password)?;
                writeln!(
                    output,
                    "Welcome {}. Signed in to wallet {}",
                    wallet.user_data.full_name, wallet.wallet_id
                )?;
            }
            Command::SignOut => {
                ledger.sessions().logout()?;
                writeln!(output, "Signed out")?;
            }
            Command::Status => match ledger.sessions().check_session()? {
                SessionState::Active(session) => writeln!(
                    output,
                    "Signed in as {} until {}",
                    session.wallet_id().unwrap_or_default(),
                    session.expires_at.to_rfc3339()
                )?,
                SessionState::Expired => writeln!(output, "Session expired")?,
                SessionState::Absent => writeln!(output, "Not signed in")?,
            },
            Command::Balance => {
                let snapshot = ledger.dashboard()?.refresh()?;
                writeln!(output, "Wallet: {}", snapshot.wallet.wallet_id)?;
                writeln!(output, "Name: {}", snapshot.wallet.user_data.full_name)?;
                writeln!(output, "Balance: {:.2} SYP", snapshot.wallet.balance)?;
                writeln!(output, "Pending requests: {}", snapshot.pending.len())?;
                print_rows(
                    output,
                    snapshot.wallet.transactions.iter().map(TransactionRow::from),
                )?;
            }
            Command::Deposit { amount, method } => {
                let request = ledger.dashboard()?.request_deposit(amount, &method)?;
                writeln!(
                    output,
                    "Deposit request {} submitted for {amount} SYP. Admin will process it shortly.",
                    request.id
                )?;
            }
            Command::Withdraw {
                amount,
                bank_account,
            } => {
                let request = ledger
                    .dashboard()?
                    .request_withdrawal(amount, &bank_account)?;
                writeln!(
                    output,
                    "Withdrawal request {} submitted for {amount} SYP. Admin will process it within 24 hours.",
                    request.id
                )?;
            }
            Command::Transfer {
                recipient,
                amount,
                note,
            } => {
                let request = ledger
                    .dashboard()?
                    .request_transfer(&recipient, amount, &note)?;
                writeln!(
                    output,
                    "Transfer request {} submitted for {amount} SYP to {recipient}. Admin will process it shortly.",
                    request.id
                )?;
            }
            Command::Requests => {
                let requests = ledger.dashboard()?.my_requests()?;
                print_rows(output, requests.iter().map(RequestRow::from))?;
            }
            Command::Watch { ticks } => {
                let dashboard = ledger.dashboard()?;
                let interval = ledger.config().poll_interval;
                let mut tick = 0u32;
                loop {
                    let snapshot = dashboard.refresh()?;
                    writeln!(
                        output,
                        "[{}] {}: {:.2} SYP, {} pending",
                        ledger.clock().now().to_rfc3339(),
                        snapshot.wallet.wallet_id,
                        snapshot.wallet.balance,
                        snapshot.pending.len()
                    )?;
                    output.flush()?;
                    tick += 1;
                    if ticks.is_some_and(|limit| tick >= limit) {
                        break;
                    }
                    thread::sleep(interval);
                }
            }
            Command::Apply {
                full_name,
                email,
                phone,
                address,
                id_type,
                id_number,
                agree_terms,
            } => {
                let application = ledger.onboarding(notifier.as_ref()).submit_application(
                    PersonalInfo {
                        full_name,
                        email,
                        phone,
                        address,
                        id_type,
                        id_number,
                    },
                    agree_terms,
                )?;
                writeln!(
                    output,
                    "Application {} submitted. Admin will contact you within 24 hours.",
                    application.id
                )?;
            }
            Command::RequestWallet {
                full_name,
                phone,
                email,
                city,
                plan,
            } => {
                let temp_id = ledger
                    .onboarding(notifier.as_ref())
                    .request_wallet(WalletRequest {
                        full_name,
                        phone,
                        email,
                        city,
                        plan,
                    })?;
                writeln!(
                    output,
                    "Wallet request sent! Admin will contact you within 24 hours. Your temporary ID: {temp_id}"
                )?;
            }
            Command::Basket { ugr } => {
                let basket = Basket::standard();
                writeln!(output, "1 UGR = {} basic-need units", basket.total_value()?.normalize())?;
                writeln!(output, "{ugr} UGR buys: {}", basket.describe_goods(ugr)?)?;
                print_rows(output, basket.items.iter())?;
            }
            Command::Admin(command) => run_admin(&ledger, output, command)?,
        }
        Ok(())
    }
}

fn run_admin<S: Storage, W: Write>(
    ledger: &Ledger<S>,
    output: &mut W,
    command: AdminCommand,
) -> Result<()> {
    match command {
        AdminCommand::SignIn {
            username,
            password,
            vault_pin,
        } => {
            let session = ledger
                .admin()
                .sign_in(&username, &password, vault_pin.as_deref())?;
            writeln!(
                output,
                "Admin {username} signed in until {}",
                session.expires_at.to_rfc3339()
            )?;
        }
        AdminCommand::SignOut => {
            ledger.admin().logout()?;
            writeln!(output, "Admin signed out")?;
        }
        AdminCommand::Stats => {
            let stats = ledger.directory()?.stats()?;
            writeln!(output, "Total users: {}", stats.total_users)?;
            writeln!(output, "Total balance: {:.2} SYP", stats.total_balance)?;
            writeln!(output, "Active users: {}", stats.active_users)?;
        }
        AdminCommand::CreateUser {
            wallet_id,
            password,
            full_name,
            phone,
            email,
        } => {
            let wallet = ledger.directory()?.create_user(NewWallet {
                wallet_id,
                password,
                full_name,
                phone,
                email,
            })?;
            writeln!(output, "User {} created successfully", wallet.wallet_id)?;
        }
        AdminCommand::ListUsers => {
            let wallets = ledger.directory()?.list_users()?;
            print_rows(output, wallets.iter().map(WalletRow::from))?;
        }
        AdminCommand::GetUser { wallet_id } => {
            let wallet = ledger.directory()?.get_user(&wallet_id)?;
            print_rows(output, std::iter::once(WalletRow::from(&wallet)))?;
        }
        AdminCommand::SetBalance { wallet_id, amount } => {
            let wallet = ledger.directory()?.set_balance(&wallet_id, amount)?;
            writeln!(
                output,
                "Balance updated to {:.2} SYP for {}",
                wallet.balance, wallet.wallet_id
            )?;
        }
        AdminCommand::AddTransaction {
            wallet_id,
            kind,
            amount,
            description,
        } => {
            ledger.directory()?.append_transaction(
                &wallet_id,
                kind,
                amount,
                description.as_deref(),
            )?;
            writeln!(output, "{kind} of {amount} SYP added for {wallet_id}")?;
        }
        AdminCommand::SetStatus { wallet_id, status } => {
            ledger.directory()?.set_status(&wallet_id, status)?;
            writeln!(output, "Wallet {wallet_id} is now {status}")?;
        }
        AdminCommand::DeleteUser { wallet_id, yes } => {
            let confirmation = if yes {
                Confirmation::Confirmed
            } else {
                Confirmation::Declined
            };
            ledger
                .directory()?
                .delete_user(&wallet_id, confirmation)
                .with_context(|| format!("User {wallet_id} was not deleted, pass --yes to confirm"))?;
            writeln!(output, "User {wallet_id} deleted successfully")?;
        }
        AdminCommand::Requests => {
            let requests = ledger.directory()?.pending_requests()?;
            print_rows(output, requests.iter().map(RequestRow::from))?;
        }
        AdminCommand::Approve { request_id } => {
            let request = ledger.directory()?.approve_request(&request_id)?;
            writeln!(
                output,
                "Approved {} of {} SYP for {}",
                request.kind(),
                request.amount,
                request.owner()
            )?;
        }
        AdminCommand::Reject { request_id } => {
            let request = ledger.directory()?.reject_request(&request_id)?;
            writeln!(output, "Rejected request {}", request.id)?;
        }
        AdminCommand::Logs => {
            let admin = ledger.admin();
            admin.require_session()?;
            print_rows(output, admin.access_log()?.iter().map(LogRow::from))?;
            let failed = admin.failed_attempts()?;
            writeln!(output, "Failed sign-in attempts: {}", failed.len())?;
            for attempt in &failed {
                writeln!(
                    output,
                    "{} {} ({})",
                    attempt.timestamp.to_rfc3339(),
                    attempt.username,
                    attempt.reason
                )?;
            }
        }
    }
    Ok(())
}
