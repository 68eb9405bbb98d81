use std::collections::{HashMap, HashSet};

use rusqlite::Connection;

use crate::error::Result;
use crate::exclusions;
use crate::fingerprint::{fingerprint, normalize_description, occurrence_fingerprint};
use crate::fmt::money;
use crate::models::Candidate;
use crate::store;

/// Inclusive date tolerance, in days, for the fuzzy tier.
pub const FUZZY_WINDOW_DAYS: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Excluded,
    ExactMatch,
    FuzzyMatch { date: String, description: String, amount: f64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excluded => write!(f, "excluded by user"),
            Self::ExactMatch => write!(f, "exact match, already imported"),
            Self::FuzzyMatch { date, description, amount } => write!(
                f,
                "possible duplicate of {date} {description} {}",
                money(*amount)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept,
    Reject(SkipReason),
}

/// Snapshot state for one ingestion run.
///
/// `persisted` and `excluded` are loaded once and never grow during the run.
/// `batch` collects fingerprints accepted so far, which the fuzzy tier must
/// not match against (a row would otherwise collide with itself or its own
/// siblings once written).
pub struct DedupContext {
    persisted: HashSet<String>,
    excluded: HashSet<String>,
    batch: HashSet<String>,
    occurrences: HashMap<String, usize>,
    skip_fuzzy: bool,
}

impl DedupContext {
    pub fn load(conn: &Connection) -> Result<Self> {
        Ok(Self::new(
            store::list_all_fingerprints(conn)?,
            exclusions::list_excluded(conn)?,
        ))
    }

    pub fn new(persisted: HashSet<String>, excluded: HashSet<String>) -> Self {
        Self {
            persisted,
            excluded,
            batch: HashSet::new(),
            occurrences: HashMap::new(),
            skip_fuzzy: false,
        }
    }

    /// Disable the fuzzy tier. Used for manual entry with `--force`.
    pub fn without_fuzzy(mut self) -> Self {
        self.skip_fuzzy = true;
        self
    }

    /// Fingerprint to store for `candidate`. The n-th identical candidate
    /// seen in this run gets the n-th occurrence fingerprint, so repeated
    /// line items stay unique in storage and re-runs reproduce them.
    pub fn fingerprint_for(&mut self, candidate: &Candidate) -> String {
        let base = fingerprint(candidate.date, candidate.amount, &candidate.description);
        let seen = self.occurrences.entry(base.clone()).or_insert(0);
        *seen += 1;
        occurrence_fingerprint(&base, *seen)
    }

    pub fn decide(&mut self, conn: &Connection, fingerprint: &str, candidate: &Candidate) -> Result<Decision> {
        if self.excluded.contains(fingerprint) {
            return Ok(Decision::Reject(SkipReason::Excluded));
        }
        if self.persisted.contains(fingerprint) {
            return Ok(Decision::Reject(SkipReason::ExactMatch));
        }
        if !self.skip_fuzzy {
            if let Some(existing) = store::find_fuzzy_duplicate(
                conn,
                candidate.date,
                candidate.amount,
                &normalize_description(&candidate.description),
                &self.batch,
            )? {
                return Ok(Decision::Reject(SkipReason::FuzzyMatch {
                    date: existing.date.format("%Y-%m-%d").to_string(),
                    description: existing.description,
                    amount: existing.amount,
                }));
            }
        }
        self.batch.insert(fingerprint.to_string());
        Ok(Decision::Accept)
    }

    /// Undo an accept whose write failed, so the fingerprint does not shield
    /// a stored record from the fuzzy tier.
    pub fn forget(&mut self, fingerprint: &str) {
        self.batch.remove(fingerprint);
    }

    pub fn accepted(&self) -> usize {
        self.batch.len()
    }
}
