use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::fmt::round_cents;

/// Hex characters kept from the SHA-256 digest.
pub const FINGERPRINT_LEN: usize = 32;

const DELIMITER: &str = "|";

pub fn normalize_description(description: &str) -> String {
    description.trim().to_lowercase()
}

/// Identity hash over date, amount in whole pence and normalized description.
/// The reference stays out: the feed often omits it while the statement
/// carries it.
pub fn fingerprint(date: NaiveDate, amount: f64, description: &str) -> String {
    let amount = round_cents(amount);
    let payload = [
        date.format("%Y-%m-%d").to_string(),
        format!("{amount:.2}"),
        normalize_description(description),
    ]
    .join(DELIMITER);
    digest(&payload)
}

/// Fingerprint stored for the `occurrence`-th identical line in one batch.
/// The first occurrence keeps the plain fingerprint.
pub fn occurrence_fingerprint(base: &str, occurrence: usize) -> String {
    if occurrence <= 1 {
        base.to_string()
    } else {
        digest(&format!("{base}#{occurrence}"))
    }
}

fn digest(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    hex
}
