use std::{
    str::from_utf8,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use ugarit_ledger::{
    admin::{
        AdminAuthError,
        directory::{Confirmation, DirectoryError},
    },
    clock::ManualClock,
    config::{AdminCredentials, Config},
    dashboard::DashboardError,
    ledger::Ledger,
    request::{RequestDetails, RequestError},
    session::{SessionError, SessionState},
    storage::{Storage, StorageError, keys, memory::InMemoryStorage},
    wallet::{NewWallet, TransactionKind, WalletError, WalletRecord, WalletStatus},
};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn config() -> Config {
    Config {
        admin_credentials: Some(AdminCredentials {
            username: "operator".to_string(),
            password: "s3cret".to_string(),
            vault_pin: None,
        }),
        ..Config::default()
    }
}

fn ledger_on<S: Storage>(storage: S) -> (Ledger<S>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let ledger = Ledger::with_clock(storage, config(), clock.clone());
    (ledger, clock)
}

/// Signs the operator in, creates the wallets with the given balances and signs out again.
fn seed<S: Storage>(ledger: &Ledger<S>, wallets: &[(&str, &str, &str)]) {
    ledger.admin().sign_in("operator", "s3cret", None).unwrap();
    let directory = ledger.directory().unwrap();
    for (wallet_id, password, balance) in wallets {
        directory
            .create_user(NewWallet {
                wallet_id: wallet_id.to_string(),
                password: password.to_string(),
                full_name: format!("Holder {wallet_id}"),
                ..Default::default()
            })
            .unwrap();
        directory.set_balance(wallet_id, dec(balance)).unwrap();
    }
    ledger.admin().logout().unwrap();
}

fn seeded() -> (Ledger<InMemoryStorage>, Arc<ManualClock>) {
    let (ledger, clock) = ledger_on(InMemoryStorage::default());
    seed(
        &ledger,
        &[
            ("UG001", "pw1", "0"),
            ("UG002", "pw2", "100"),
            ("UG003", "pw3", "50"),
            ("UG004", "pw4", "10"),
        ],
    );
    (ledger, clock)
}

fn wallet<S: Storage>(ledger: &Ledger<S>, wallet_id: &str) -> Option<WalletRecord> {
    ledger
        .store()
        .load_collection::<WalletRecord>(keys::USERS)
        .unwrap()
        .items
        .into_iter()
        .find(|w| w.wallet_id == wallet_id)
}

#[test]
fn sign_in_stamps_last_login() {
    let (ledger, clock) = seeded();
    clock.advance(Duration::minutes(5));

    let signed_in = ledger.sessions().sign_in("UG001", "pw1").unwrap();
    assert_eq!(signed_in.last_login, Some(start() + Duration::minutes(5)));
    assert_eq!(
        wallet(&ledger, "UG001").unwrap().last_login,
        Some(start() + Duration::minutes(5))
    );

    let session = ledger
        .sessions()
        .check_session()
        .unwrap()
        .into_active()
        .unwrap();
    assert_eq!(session.wallet_id(), Some("UG001"));
    assert_eq!(session.expires_at, start() + Duration::minutes(5) + Duration::hours(24));

    clock.advance(Duration::minutes(5));
    assert!(ledger.sessions().sign_in("UG001", "wrong").is_err());
    assert_eq!(
        wallet(&ledger, "UG001").unwrap().last_login,
        Some(start() + Duration::minutes(5))
    );
}

#[test]
fn wrong_password_leaves_no_session() {
    let (ledger, _) = seeded();
    let err = ledger.sessions().sign_in("UG001", "nope").unwrap_err();
    assert_eq!(err.to_string(), "Invalid Wallet ID or Password");
    assert_eq!(
        ledger.sessions().check_session().unwrap(),
        SessionState::Absent
    );
    assert!(wallet(&ledger, "UG001").unwrap().last_login.is_none());
}

#[test]
fn overdrawn_withdrawal_is_not_queued() {
    let (ledger, _) = seeded();
    ledger.sessions().sign_in("UG002", "pw2").unwrap();

    let err = ledger
        .dashboard()
        .unwrap()
        .request_withdrawal(dec("150"), "IBAN123")
        .unwrap_err();
    assert!(matches!(
        err,
        DashboardError::Request(RequestError::Funds(WalletError::InsufficientFunds { .. }))
    ));
    assert_eq!(
        err.to_string(),
        "Insufficient balance: 100 SYP available, 150 SYP requested"
    );
    assert!(ledger.dashboard().unwrap().my_requests().unwrap().is_empty());
}

#[test]
fn withdrawal_request_keeps_balance_until_approved() {
    let (ledger, _) = seeded();
    ledger.sessions().sign_in("UG003", "pw3").unwrap();

    let dashboard = ledger.dashboard().unwrap();
    let request = dashboard.request_withdrawal(dec("30"), "IBAN456").unwrap();
    assert!(request.id.starts_with("withdraw_"));
    assert_eq!(
        request.details,
        RequestDetails::Withdrawal {
            wallet_id: "UG003".to_string(),
            bank_account: "IBAN456".to_string(),
        }
    );

    let snapshot = dashboard.refresh().unwrap();
    assert_eq!(snapshot.wallet.balance, dec("50"));
    assert!(snapshot.wallet.transactions.is_empty());
    assert_eq!(snapshot.pending, vec![request]);
}

#[test]
fn deleted_wallet_cannot_be_found_or_signed_into() {
    let (ledger, _) = seeded();
    ledger.sessions().sign_in("UG004", "pw4").unwrap();

    ledger.admin().sign_in("operator", "s3cret", None).unwrap();
    let directory = ledger.directory().unwrap();
    directory
        .delete_user("UG004", Confirmation::Confirmed)
        .unwrap();
    assert!(directory.get_user("UG004").is_err());
    assert_eq!(directory.stats().unwrap().total_users, 3);

    // the open session goes with the wallet
    assert!(matches!(
        ledger.dashboard().err(),
        Some(SessionError::NotSignedIn)
    ));
    assert!(matches!(
        ledger.sessions().sign_in("UG004", "pw4").unwrap_err(),
        SessionError::InvalidCredentials
    ));
}

#[test]
fn deposit_then_withdraw_round_trip() {
    let (ledger, _) = seeded();
    ledger.sessions().sign_in("UG001", "pw1").unwrap();
    let deposit = ledger
        .dashboard()
        .unwrap()
        .request_deposit(dec("75.50"), "cash")
        .unwrap();

    ledger.admin().sign_in("operator", "s3cret", None).unwrap();
    ledger.directory().unwrap().approve_request(&deposit.id).unwrap();

    let withdrawal = ledger
        .dashboard()
        .unwrap()
        .request_withdrawal(dec("25.50"), "IBAN789")
        .unwrap();
    ledger
        .directory()
        .unwrap()
        .approve_request(&withdrawal.id)
        .unwrap();

    let snapshot = ledger.dashboard().unwrap().refresh().unwrap();
    assert_eq!(snapshot.wallet.balance, dec("50"));
    assert!(snapshot.pending.is_empty());
    let kinds: Vec<_> = snapshot.wallet.transactions.iter().map(|t| t.kind).collect();
    assert_eq!(kinds, [TransactionKind::Withdrawal, TransactionKind::Deposit]);
    assert_eq!(snapshot.wallet.transactions[1].description, "Deposit via cash");

    let actions: Vec<_> = ledger
        .admin()
        .access_log()
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions.iter().filter(|a| *a == "APPROVE_REQUEST").count(), 2);
}

#[test]
fn admin_deposit_then_withdrawal_restores_balance() {
    let (ledger, _) = seeded();
    ledger.admin().sign_in("operator", "s3cret", None).unwrap();
    let directory = ledger.directory().unwrap();
    let before = directory.get_user("UG002").unwrap().balance;

    directory
        .append_transaction("UG002", TransactionKind::Deposit, dec("12.34"), None)
        .unwrap();
    directory
        .append_transaction("UG002", TransactionKind::Withdrawal, dec("12.34"), None)
        .unwrap();

    let after = directory.get_user("UG002").unwrap();
    assert_eq!(after.balance, before);
    assert_eq!(after.transactions.len(), 2);
}

#[test]
fn transfer_to_unknown_wallet_is_refused() {
    let (ledger, _) = seeded();
    ledger.sessions().sign_in("UG002", "pw2").unwrap();
    let dashboard = ledger.dashboard().unwrap();

    assert!(matches!(
        dashboard
            .request_transfer("UG999", dec("10"), "")
            .unwrap_err(),
        DashboardError::Request(RequestError::RecipientNotFound { .. })
    ));
    let request = dashboard.request_transfer("UG003", dec("10"), "gift").unwrap();

    // both sides see the request
    ledger.sessions().sign_in("UG003", "pw3").unwrap();
    assert_eq!(
        ledger.dashboard().unwrap().my_requests().unwrap(),
        vec![request]
    );
}

#[test]
fn created_user_defaults() {
    let (ledger, _) = seeded();
    ledger.admin().sign_in("operator", "s3cret", None).unwrap();
    let directory = ledger.directory().unwrap();

    let created = directory
        .create_user(NewWallet {
            wallet_id: "UG010".to_string(),
            password: "pw10".to_string(),
            full_name: "New Holder".to_string(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(created.balance, Decimal::ZERO);
    assert_eq!(created.currency, "SYP");
    assert_eq!(created.status, WalletStatus::Active);
    assert_eq!(created.created_at, start());
    assert_eq!(created.user_data.username, "UG010");

    assert!(
        directory
            .create_user(NewWallet {
                wallet_id: "UG010".to_string(),
                password: "other".to_string(),
                full_name: "Someone Else".to_string(),
                ..Default::default()
            })
            .is_err()
    );
    assert_eq!(directory.get_user("UG010").unwrap().password, "pw10");
}

#[test]
fn expired_session_is_cleared() {
    let (ledger, clock) = seeded();
    ledger.sessions().sign_in("UG001", "pw1").unwrap();
    clock.advance(Duration::hours(24));

    assert_eq!(
        ledger.sessions().check_session().unwrap(),
        SessionState::Expired
    );
    assert!(
        ledger
            .store()
            .read::<serde_json::Value>(keys::SESSION)
            .unwrap()
            .is_none()
    );
    assert!(matches!(
        ledger.dashboard().err(),
        Some(SessionError::NotSignedIn)
    ));
}

#[test]
fn directory_requires_admin_session() {
    let (ledger, clock) = seeded();
    assert!(matches!(
        ledger.directory().err(),
        Some(AdminAuthError::NotSignedIn)
    ));

    assert!(matches!(
        ledger.admin().sign_in("operator", "guess", None).unwrap_err(),
        AdminAuthError::InvalidCredentials
    ));
    assert_eq!(ledger.admin().failed_attempts().unwrap().len(), 1);

    ledger.admin().sign_in("operator", "s3cret", None).unwrap();
    assert!(ledger.directory().is_ok());
    clock.advance(Duration::hours(8));
    assert!(matches!(
        ledger.directory().err(),
        Some(AdminAuthError::SessionExpired)
    ));
}

#[test]
fn admin_sign_in_without_configured_credentials() {
    let ledger = Ledger::new(InMemoryStorage::default(), Config::default());
    assert!(matches!(
        ledger.admin().sign_in("admin", "admin", None).unwrap_err(),
        AdminAuthError::NotConfigured
    ));
}

#[test]
fn concurrent_writers_conflict() {
    let shared = Arc::new(InMemoryStorage::default());
    let (first, _) = ledger_on(shared.clone());
    let (second, _) = ledger_on(shared.clone());
    seed(&first, &[("UG001", "pw1", "0")]);

    let mut stale = first
        .store()
        .load_collection::<WalletRecord>(keys::USERS)
        .unwrap();
    second.sessions().sign_in("UG001", "pw1").unwrap();

    stale.items[0].balance = dec("999");
    assert!(matches!(
        first.store().save_collection(keys::USERS, &mut stale),
        Err(StorageError::Conflict { .. })
    ));
    // the sign-in from the other writer survives
    assert!(wallet(&first, "UG001").unwrap().last_login.is_some());
    assert_eq!(wallet(&first, "UG001").unwrap().balance, Decimal::ZERO);
}

/// Runs `hook` once, right after the first write to `trigger` lands.
struct InterleavedStorage {
    inner: Arc<InMemoryStorage>,
    trigger: &'static str,
    hook: Mutex<Option<Box<dyn FnOnce()>>>,
}

impl Storage for InterleavedStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.set(key, value)?;
        if key == self.trigger {
            let hook = self.hook.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

#[test]
fn interleaved_approvals_book_once() {
    let shared = Arc::new(InMemoryStorage::default());
    let (other, _) = ledger_on(shared.clone());
    seed(&other, &[("UG001", "pw1", "0")]);
    other.sessions().sign_in("UG001", "pw1").unwrap();
    let request = other
        .dashboard()
        .unwrap()
        .request_deposit(dec("100"), "cash")
        .unwrap();
    other.admin().sign_in("operator", "s3cret", None).unwrap();

    let second: Arc<Mutex<Option<Result<String, DirectoryError>>>> = Arc::default();
    let hook: Box<dyn FnOnce()> = {
        let id = request.id.clone();
        let second = second.clone();
        Box::new(move || {
            let outcome = other
                .directory()
                .unwrap()
                .approve_request(&id)
                .map(|r| r.id);
            *second.lock().unwrap() = Some(outcome);
        })
    };
    let (first, _) = ledger_on(InterleavedStorage {
        inner: shared.clone(),
        trigger: "ugarit_pending_requests_rev",
        hook: Mutex::new(Some(hook)),
    });

    let approved = first.directory().unwrap().approve_request(&request.id).unwrap();
    assert_eq!(approved.id, request.id);
    assert!(matches!(
        second.lock().unwrap().take(),
        Some(Err(DirectoryError::RequestNotFound { .. }))
    ));

    let (checker, _) = ledger_on(shared);
    let credited = wallet(&checker, "UG001").unwrap();
    assert_eq!(credited.balance, dec("100"));
    assert_eq!(credited.transactions.len(), 1);
}

#[test]
fn corrupt_directory_reads_as_empty() {
    let storage = InMemoryStorage::default();
    storage.set("ugarit_users", "{not json").unwrap();
    let (ledger, _) = ledger_on(storage);

    assert!(matches!(
        ledger.sessions().sign_in("UG001", "pw1").unwrap_err(),
        SessionError::InvalidCredentials
    ));
    ledger.admin().sign_in("operator", "s3cret", None).unwrap();
    assert!(ledger.directory().unwrap().list_users().unwrap().is_empty());
}

mod cli {
    use std::path::Path;

    use clap::Parser;
    use ugarit_ledger::{
        cli::{Cli, Service},
        onboarding::NoopNotifier,
        storage::file::FileStorage,
    };

    use super::*;

    fn run(dir: &Path, args: &[&str]) -> anyhow::Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("ugarit-wallet").chain(args.iter().copied()))?;
        let mut output = Vec::new();
        let service = Service {
            ledger: Ledger::new(FileStorage::open(dir)?, config()),
            output: &mut output,
            notifier: Box::new(NoopNotifier),
        };
        service.run(cli.command)?;
        Ok(from_utf8(&output)?.to_string())
    }

    #[test]
    fn admin_and_holder_session() {
        let dir = tempfile::tempdir().unwrap();
        let dir = dir.path();

        assert!(run(dir, &["admin", "list-users"]).is_err());
        run(dir, &["admin", "sign-in", "operator", "s3cret"]).unwrap();
        let created = run(
            dir,
            &[
                "admin",
                "create-user",
                "--wallet-id",
                "UG003",
                "--password",
                "pw3",
                "--full-name",
                "Rana Haddad",
            ],
        )
        .unwrap();
        assert_eq!(created, "User UG003 created successfully\n");
        run(dir, &["admin", "set-balance", "UG003", "50"]).unwrap();

        let listed = run(dir, &["admin", "list-users"]).unwrap();
        let mut lines = listed.lines();
        assert_eq!(
            lines.next(),
            Some("wallet_id,full_name,phone,email,balance,status,last_login,transactions")
        );
        assert_eq!(lines.next(), Some("UG003,Rana Haddad,,,50,active,,0"));

        assert_eq!(
            run(dir, &["status"]).unwrap(),
            "Not signed in\n"
        );
        run(dir, &["sign-in", "UG003", "pw3"]).unwrap();
        let submitted = run(dir, &["withdraw", "30", "--bank-account", "IBAN456"]).unwrap();
        assert!(submitted.starts_with("Withdrawal request withdraw_"));
        assert!(run(dir, &["withdraw", "80", "--bank-account", "IBAN456"]).is_err());

        let balance = run(dir, &["balance"]).unwrap();
        assert!(balance.contains("Balance: 50.00 SYP"));
        assert!(balance.contains("Pending requests: 1"));

        let watched = run(dir, &["watch", "--ticks", "1"]).unwrap();
        assert_eq!(watched.lines().count(), 1);
        assert!(watched.contains("UG003: 50.00 SYP, 1 pending"));

        assert!(run(dir, &["admin", "delete-user", "UG003"]).is_err());
        run(dir, &["admin", "delete-user", "UG003", "--yes"]).unwrap();
        assert!(run(dir, &["balance"]).is_err());
        assert!(dir.join("ugarit_users.json").exists());
    }

    #[test]
    fn application_form() {
        let dir = tempfile::tempdir().unwrap();
        let args = [
            "apply",
            "--full-name",
            "Rana Haddad",
            "--email",
            "rana@example.com",
            "--phone",
            "+963900000000",
            "--address",
            "Latakia",
            "--id-type",
            "passport",
            "--id-number",
            "N0101",
        ];
        assert!(run(dir.path(), &args).is_err());

        let mut agreed = args.to_vec();
        agreed.push("--agree-terms");
        let out = run(dir.path(), &agreed).unwrap();
        assert!(out.starts_with("Application APP-"));
        assert!(dir.path().join("ugarit_applications.json").exists());
    }

    #[test]
    fn wallet_request_form() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(
            dir.path(),
            &[
                "request-wallet",
                "--full-name",
                "Rana Haddad",
                "--phone",
                "+963900000000",
                "--email",
                "rana@example.com",
                "--city",
                "Latakia",
                "--plan",
                "basic",
            ],
        )
        .unwrap();
        let temp_id = out.trim_end().rsplit(' ').next().unwrap();
        assert!(out.starts_with("Wallet request sent!"));
        assert!(temp_id.starts_with("UG"));
        let stored = std::fs::read_to_string(dir.path().join("ugarit_temp_wallet_id.json")).unwrap();
        assert!(stored.contains(temp_id));

        assert!(run(
            dir.path(),
            &["request-wallet", "--full-name", "Rana", "--phone", "1", "--email", "nope"],
        )
        .is_err());
    }

    #[test]
    fn basket_listing() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(dir.path(), &["basket", "--ugr", "0.5"]).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("1 UGR = 1.44 basic-need units"));
        assert_eq!(
            lines.next(),
            Some("0.5 UGR buys: 0.22 1 liter Drinking Water + 0.48 1 kWh Electricity + 0.12 1 liter Fuel")
        );
        assert_eq!(lines.next(), Some("name,quantity,price,weight"));
        assert_eq!(lines.next(), Some("Rice,1 kg,2.50,0.25"));
        assert_eq!(lines.count(), 5);
    }
}
