use rusqlite::Connection;
use tracing::info;

use crate::categorizer::classify_or_default;
use crate::dedup::{DedupContext, Decision};
use crate::error::{Result, TallyError};
use crate::fmt::round_cents;
use crate::models::{Candidate, Classification, NewTransaction, Status};
use crate::store;

pub const MANUAL_TAG: &str = "manual";

/// Record a hand-entered transaction. It passes the same duplicate gate as
/// feed and CSV rows; `force` only switches off the fuzzy tier.
pub fn add_manual(
    conn: &Connection,
    mut candidate: Candidate,
    classification: Option<Classification>,
    force: bool,
) -> Result<i64> {
    if candidate.description.trim().is_empty() {
        return Err(TallyError::InvalidInput("description is required".into()));
    }
    candidate.amount = round_cents(candidate.amount);
    let mut dedup = DedupContext::load(conn)?;
    if force {
        dedup = dedup.without_fuzzy();
    }
    let fingerprint = dedup.fingerprint_for(&candidate);
    if let Decision::Reject(reason) = dedup.decide(conn, &fingerprint, &candidate)? {
        return Err(TallyError::Duplicate(reason.to_string()));
    }

    let classification = match classification {
        Some(c) => c,
        None => classify_or_default(&candidate, &store::list_rules(conn)?).0,
    };
    let record = NewTransaction {
        candidate,
        classification,
        status: Status::Cleared,
        tags: vec![MANUAL_TAG.to_string()],
    };
    let id = store::insert_transaction(conn, &record, &fingerprint)?;
    info!(id, "Added manual transaction");
    Ok(id)
}
