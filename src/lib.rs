/// Wallet records, transactions and the balance rules shared by every surface.
pub mod wallet;

/// Deposit, withdrawal and transfer requests waiting for an operator.
/// Submitting a request never moves money by itself.
pub mod request;

/// Wallet holder sign-in and session lifetime.
pub mod session;

/// Operator sign-in, the access log, and the wallet directory operations
/// that only an authenticated operator may run.
pub mod admin;

/// The signed-in holder's view.
pub mod dashboard;

/// Public application form. Applications are stored for the operator
/// and never create wallets on their own.
pub mod onboarding;

/// UGR basket valuation: what one UGR buys and how its value moves.
pub mod currency;

/// Key/value persistence with per-collection revision tokens, plus the
/// in-memory and file backed implementations.
///
/// NOTE: every record lives under one prefixed key, so a collection is
/// always rewritten as a whole.
pub mod storage;

/// Entry point tying storage, clock and config together.
pub mod ledger;

pub mod clock;
pub mod config;
pub mod ids;

/// Command-line surface. Kept in the library so integration tests can
/// drive it directly.
pub mod cli;
