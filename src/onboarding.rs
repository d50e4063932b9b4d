use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    ids,
    storage::{Storage, StorageError, Store, keys},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub id_type: String,
    pub id_number: String,
}

/// The short "request a wallet" form. Nothing is stored except the temporary id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub city: String,
    pub plan: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
}

/// A wallet application from the public onboarding form. It never becomes a wallet by itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub personal_info: PersonalInfo,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationLogEntry {
    pub application_id: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub user_email: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum OnboardingError {
    #[error("Please fill in all required fields correctly: missing {0}")]
    MissingField(&'static str),
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("You must agree to the Terms of Service and Privacy Policy.")]
    TermsNotAccepted,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] OnboardingError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum WalletRequestError {
    #[error(transparent)]
    Invalid(#[from] OnboardingError),
    #[error("Failed to submit request. Please contact @UgaritAdmin directly.")]
    Relay(#[source] NotifyError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub enum Notification<'a> {
    NewApplication {
        application: &'a Application,
        visitor_id: &'a str,
    },
    WalletRequest {
        request: &'a WalletRequest,
        submitted_at: DateTime<Utc>,
        visitor_id: &'a str,
    },
}

impl Notification<'_> {
    pub fn message(&self) -> String {
        match self {
            Notification::NewApplication {
                application,
                visitor_id,
            } => {
                let info = &application.personal_info;
                format!(
                    "New WALLET_APPLICATION {}\nName: {}\nPhone: {}\nEmail: {}\nTime: {}\nIP: {}\nSession: {visitor_id}",
                    application.id,
                    info.full_name,
                    info.phone,
                    info.email,
                    application.submitted_at.to_rfc3339(),
                    application.ip,
                )
            }
            Notification::WalletRequest {
                request,
                submitted_at,
                visitor_id,
            } => format!(
                "New WALLET_CREATION\nName: {}\nPhone: {}\nEmail: {}\nCity: {}\nPlan: {}\nTime: {}\nIP: unknown\nSession: {visitor_id}",
                request.full_name,
                request.phone,
                request.email,
                request.city,
                request.plan,
                submitted_at.to_rfc3339(),
            ),
        }
    }
}

#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Operator notification channel. Delivery is best-effort.
pub trait Notifier {
    fn notify(&self, notification: &Notification<'_>) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of relaying them anywhere.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification<'_>) -> Result<(), NotifyError> {
        info!(text = %notification.message(), "operator notification");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: &Notification<'_>) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// `local@domain.tld` with no whitespace and a single `@`.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .char_indices()
            .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

fn require(fields: &[(&'static str, &str)]) -> Result<(), OnboardingError> {
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((name, _)) => Err(OnboardingError::MissingField(*name)),
        None => Ok(()),
    }
}

fn validate(info: &PersonalInfo, agreed_to_terms: bool) -> Result<(), OnboardingError> {
    require(&[
        ("fullName", info.full_name.as_str()),
        ("email", info.email.as_str()),
        ("phone", info.phone.as_str()),
        ("address", info.address.as_str()),
        ("idType", info.id_type.as_str()),
        ("idNumber", info.id_number.as_str()),
    ])?;
    if !is_valid_email(info.email.trim()) {
        return Err(OnboardingError::InvalidEmail);
    }
    if !agreed_to_terms {
        return Err(OnboardingError::TermsNotAccepted);
    }
    Ok(())
}

fn application_id(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().to_string();
    let tail = &millis[millis.len().saturating_sub(6)..];
    format!("APP-{tail}-{}", ids::random_suffix(5).to_uppercase())
}

fn temp_wallet_id(now: DateTime<Utc>) -> String {
    format!(
        "UG{}{}",
        now.timestamp_millis(),
        ids::random_suffix(5).to_uppercase()
    )
}

pub struct Onboarding<'a, S> {
    store: &'a Store<S>,
    clock: &'a dyn Clock,
    notifier: &'a dyn Notifier,
}

impl<'a, S: Storage> Onboarding<'a, S> {
    pub fn new(store: &'a Store<S>, clock: &'a dyn Clock, notifier: &'a dyn Notifier) -> Self {
        Self {
            store,
            clock,
            notifier,
        }
    }

    /// The anonymous per-install id, created on first use.
    pub fn visitor_id(&self) -> Result<String, StorageError> {
        if let Some(id) = self.store.read::<String>(keys::VISITOR_ID)? {
            return Ok(id);
        }
        let id = ids::time_based("USER_", self.clock.now());
        self.store.write(keys::VISITOR_ID, &id)?;
        Ok(id)
    }

    pub fn submit_application(
        &self,
        personal_info: PersonalInfo,
        agreed_to_terms: bool,
    ) -> Result<Application, SubmitError> {
        validate(&personal_info, agreed_to_terms)?;
        let now = self.clock.now();
        let application = Application {
            id: application_id(now),
            personal_info,
            status: ApplicationStatus::Pending,
            submitted_at: now,
            ip: "unknown".to_string(),
        };

        self.store.update_collection(
            keys::APPLICATIONS,
            |applications: &mut Vec<Application>| -> Result<(), StorageError> {
                applications.push(application.clone());
                Ok(())
            },
        )?;
        self.store.update_collection(
            keys::APPLICATION_LOGS,
            |logs: &mut Vec<ApplicationLogEntry>| -> Result<(), StorageError> {
                logs.push(ApplicationLogEntry {
                    application_id: application.id.clone(),
                    action: "SUBMITTED".to_string(),
                    timestamp: now,
                    user_email: application.personal_info.email.clone(),
                });
                Ok(())
            },
        )?;
        info!(application_id = %application.id, "application submitted");

        let visitor_id = self.visitor_id()?;
        let notification = Notification::NewApplication {
            application: &application,
            visitor_id: &visitor_id,
        };
        if let Err(err) = self.notifier.notify(&notification) {
            warn!(%err, application_id = %application.id, "operator was not notified");
        }
        Ok(application)
    }

    pub fn applications(&self) -> Result<Vec<Application>, StorageError> {
        Ok(self.store.load_collection(keys::APPLICATIONS)?.items)
    }

    /// Relays a wallet request to the operator and hands back a temporary id.
    ///
    /// Unlike applications, delivery failure is reported: the operator is the
    /// only place the request ends up.
    pub fn request_wallet(&self, request: WalletRequest) -> Result<String, WalletRequestError> {
        require(&[
            ("fullName", request.full_name.as_str()),
            ("phone", request.phone.as_str()),
            ("email", request.email.as_str()),
        ])?;
        if !is_valid_email(request.email.trim()) {
            return Err(OnboardingError::InvalidEmail.into());
        }
        let now = self.clock.now();
        let visitor_id = self.visitor_id()?;
        self.notifier
            .notify(&Notification::WalletRequest {
                request: &request,
                submitted_at: now,
                visitor_id: &visitor_id,
            })
            .map_err(WalletRequestError::Relay)?;

        let id = temp_wallet_id(now);
        self.store.write(keys::TEMP_WALLET_ID, &id)?;
        info!(temp_wallet_id = %id, "wallet request relayed");
        Ok(id)
    }

    /// The id handed out by the last successful [`Onboarding::request_wallet`].
    pub fn temp_wallet_id(&self) -> Result<Option<String>, StorageError> {
        self.store.read(keys::TEMP_WALLET_ID)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::{clock::ManualClock, storage::memory::InMemoryStorage};

    fn info() -> PersonalInfo {
        PersonalInfo {
            full_name: "Rana Haddad".to_string(),
            email: "rana@example.com".to_string(),
            phone: "+963900000000".to_string(),
            address: "Latakia".to_string(),
            id_type: "national_id".to_string(),
            id_number: "0101".to_string(),
        }
    }

    #[derive(Default)]
    struct Recording(RefCell<Vec<String>>);

    impl Notifier for Recording {
        fn notify(&self, notification: &Notification<'_>) -> Result<(), NotifyError> {
            self.0.borrow_mut().push(notification.message());
            Ok(())
        }
    }

    struct Failing;

    impl Notifier for Failing {
        fn notify(&self, _notification: &Notification<'_>) -> Result<(), NotifyError> {
            Err(NotifyError("relay unreachable".to_string()))
        }
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@b.c"));
        assert!(is_valid_email("first.last@mail.example.org"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@.c"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("@b.c"));
        assert!(!is_valid_email("a b@c.d"));
        assert!(!is_valid_email("a@b@c.d"));
    }

    #[test]
    fn validation_errors() {
        let store = Store::new(InMemoryStorage::default(), "ugarit_");
        let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let onboarding = Onboarding::new(&store, &clock, &NoopNotifier);

        let err = onboarding
            .submit_application(
                PersonalInfo {
                    phone: " ".to_string(),
                    ..info()
                },
                true,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Invalid(OnboardingError::MissingField("phone"))
        ));
        assert!(matches!(
            onboarding
                .submit_application(
                    PersonalInfo {
                        email: "nope".to_string(),
                        ..info()
                    },
                    true
                )
                .unwrap_err(),
            SubmitError::Invalid(OnboardingError::InvalidEmail)
        ));
        assert!(matches!(
            onboarding.submit_application(info(), false).unwrap_err(),
            SubmitError::Invalid(OnboardingError::TermsNotAccepted)
        ));
        assert!(onboarding.applications().unwrap().is_empty());
    }

    #[test]
    fn submission_is_stored_logged_and_notified() {
        let store = Store::new(InMemoryStorage::default(), "ugarit_");
        let clock = ManualClock::new(DateTime::from_timestamp_millis(1_700_000_123_456).unwrap());
        let notifier = Recording::default();
        let onboarding = Onboarding::new(&store, &clock, &notifier);

        let application = onboarding.submit_application(info(), true).unwrap();
        assert!(application.id.starts_with("APP-123456-"));
        assert_eq!(application.id.len(), "APP-123456-".len() + 5);
        assert_eq!(application.status, ApplicationStatus::Pending);
        assert_eq!(onboarding.applications().unwrap(), vec![application.clone()]);

        let logs = store
            .load_collection::<ApplicationLogEntry>(keys::APPLICATION_LOGS)
            .unwrap()
            .items;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].user_email, "rana@example.com");

        let messages = notifier.0.borrow();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Rana Haddad"));
        assert!(messages[0].contains(&onboarding.visitor_id().unwrap()));
    }

    #[test]
    fn notifier_failure_is_swallowed() {
        let store = Store::new(InMemoryStorage::default(), "ugarit_");
        let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let onboarding = Onboarding::new(&store, &clock, &Failing);
        assert!(onboarding.submit_application(info(), true).is_ok());
        assert_eq!(onboarding.applications().unwrap().len(), 1);
    }

    fn wallet_request() -> WalletRequest {
        WalletRequest {
            full_name: "Rana Haddad".to_string(),
            phone: "+963900000000".to_string(),
            email: "rana@example.com".to_string(),
            city: "Latakia".to_string(),
            plan: "basic".to_string(),
        }
    }

    #[test]
    fn wallet_request_hands_out_temp_id() {
        let store = Store::new(InMemoryStorage::default(), "ugarit_");
        let clock = ManualClock::new(DateTime::from_timestamp_millis(1_700_000_123_456).unwrap());
        let notifier = Recording::default();
        let onboarding = Onboarding::new(&store, &clock, &notifier);

        let id = onboarding.request_wallet(wallet_request()).unwrap();
        assert!(id.starts_with("UG1700000123456"));
        assert_eq!(id.len(), "UG1700000123456".len() + 5);
        assert_eq!(onboarding.temp_wallet_id().unwrap(), Some(id));
        assert!(onboarding.applications().unwrap().is_empty());

        let messages = notifier.0.borrow();
        assert!(messages[0].starts_with("New WALLET_CREATION"));
        assert!(messages[0].contains("City: Latakia"));
        assert!(messages[0].contains("Plan: basic"));
    }

    #[test]
    fn wallet_request_reports_relay_failure() {
        let store = Store::new(InMemoryStorage::default(), "ugarit_");
        let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let onboarding = Onboarding::new(&store, &clock, &Failing);

        let err = onboarding.request_wallet(wallet_request()).unwrap_err();
        assert!(matches!(err, WalletRequestError::Relay(_)));
        assert_eq!(
            err.to_string(),
            "Failed to submit request. Please contact @UgaritAdmin directly."
        );
        assert_eq!(onboarding.temp_wallet_id().unwrap(), None);

        assert!(matches!(
            onboarding
                .request_wallet(WalletRequest {
                    city: String::new(),
                    phone: String::new(),
                    ..wallet_request()
                })
                .unwrap_err(),
            WalletRequestError::Invalid(OnboardingError::MissingField("phone"))
        ));
    }

    #[test]
    fn visitor_id_is_stable() {
        let store = Store::new(InMemoryStorage::default(), "ugarit_");
        let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let onboarding = Onboarding::new(&store, &clock, &NoopNotifier);
        let first = onboarding.visitor_id().unwrap();
        assert!(first.starts_with("USER_1700000000000_"));
        assert_eq!(onboarding.visitor_id().unwrap(), first);
    }
}
