use chrono::{DateTime, Utc};
use uuid::Uuid;

/// `<prefix><epoch millis>_<random>`, e.g. `dep_1700000000000_3f9c2a1b0`.
pub fn time_based(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}{}_{}", now.timestamp_millis(), random_suffix(9))
}

pub fn random_suffix(len: usize) -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(len.min(32));
    hex
}
