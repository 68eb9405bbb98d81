use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::categorizer::classify_or_default;
use crate::dedup::{DedupContext, Decision};
use crate::error::Result;
use crate::fmt::round_cents;
use crate::models::{Candidate, NewTransaction, Status};
use crate::store;

/// Provenance tag on every row accepted from a statement upload.
pub const CSV_BACKFILL_TAG: &str = "csv-backfill";

/// Row errors returned to the caller; the rest are only counted.
pub const MAX_REPORTED_ERRORS: usize = 10;

// Date, Counter Party, Reference, Type, Amount [, Balance, Spending Category, Notes]
const MIN_COLUMNS: usize = 5;
const COL_DATE: usize = 0;
const COL_COUNTERPARTY: usize = 1;
const COL_REFERENCE: usize = 2;
const COL_AMOUNT: usize = 4;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace([',', '"', '£'], "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| round_cents(-v));
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite()).map(round_cents)
}

pub fn parse_date_dmy(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let d: u32 = parts[0].parse().ok()?;
    let m: u32 = parts[1].parse().ok()?;
    let y: i32 = parts[2].parse().ok()?;
    if parts[2].len() != 4 {
        return None;
    }
    NaiveDate::from_ymd_opt(y, m, d)
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn is_header(record: &StringRecord) -> bool {
    record
        .get(COL_DATE)
        .is_some_and(|f| f.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case("date"))
}

/// Normalize one statement line into a candidate, or describe why it can't be.
pub fn parse_row(record: &StringRecord) -> std::result::Result<Candidate, String> {
    if record.len() < MIN_COLUMNS {
        return Err(format!(
            "expected at least {MIN_COLUMNS} columns, found {}",
            record.len()
        ));
    }
    let raw_date = &record[COL_DATE];
    let date = parse_date_dmy(raw_date).ok_or_else(|| format!("invalid date '{}'", raw_date.trim()))?;
    let raw_amount = &record[COL_AMOUNT];
    let amount = parse_amount(raw_amount).ok_or_else(|| format!("invalid amount '{}'", raw_amount.trim()))?;
    let description = record[COL_COUNTERPARTY].trim().to_string();
    if description.is_empty() {
        return Err("missing counter party".to_string());
    }
    let reference = Some(record[COL_REFERENCE].trim())
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    Ok(Candidate {
        date,
        description,
        merchant: None,
        reference,
        amount,
    })
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub line: usize,
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub categorized: usize,
    pub total: usize,
    pub failed: usize,
    /// At most `MAX_REPORTED_ERRORS` messages.
    pub errors: Vec<String>,
    pub error_count: usize,
    pub skipped_details: Vec<SkippedRow>,
    pub batch_id: i64,
}

impl ImportResult {
    fn row_error(&mut self, line: usize, message: impl std::fmt::Display) {
        self.error_count += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(format!("Line {line}: {message}"));
        }
    }
}

pub fn import_file(conn: &Connection, file_path: &Path) -> Result<ImportResult> {
    let data = std::fs::read(file_path)?;
    let filename = file_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    import_csv(conn, data.as_slice(), filename, Some(compute_checksum(&data)))
}

/// Import statement rows. Each row stands alone: a bad row is recorded and
/// the rest of the file still imports.
pub fn import_csv<R: Read>(
    conn: &Connection,
    reader: R,
    filename: &str,
    checksum: Option<String>,
) -> Result<ImportResult> {
    let rules = store::list_rules(conn)?;
    let mut dedup = DedupContext::load(conn)?;

    conn.execute(
        "INSERT INTO imports (filename, checksum) VALUES (?1, ?2)",
        rusqlite::params![filename, checksum],
    )?;
    let batch_id = conn.last_insert_rowid();
    let batch_tag = format!("import:{batch_id}");

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut result = ImportResult {
        batch_id,
        ..Default::default()
    };
    let mut dates: Vec<NaiveDate> = Vec::new();
    let mut first = true;

    for (index, record) in rdr.records().enumerate() {
        // File line where the record starts; records can span lines.
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map_or(index + 1, |p| p.line() as usize);
                result.total += 1;
                result.row_error(line, e);
                continue;
            }
        };
        let line = record.position().map_or(index + 1, |p| p.line() as usize);
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if first {
            first = false;
            if is_header(&record) {
                continue;
            }
        }
        result.total += 1;

        let candidate = match parse_row(&record) {
            Ok(c) => c,
            Err(message) => {
                result.row_error(line, message);
                continue;
            }
        };

        let fingerprint = dedup.fingerprint_for(&candidate);
        let decision = match dedup.decide(conn, &fingerprint, &candidate) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(line, error = %e, "Duplicate check failed");
                result.failed += 1;
                result.row_error(line, format!("duplicate check failed: {e}"));
                continue;
            }
        };
        match decision {
            Decision::Reject(reason) => {
                debug!(line, %reason, "Skipped row");
                result.skipped += 1;
                result.skipped_details.push(SkippedRow {
                    line,
                    date: candidate.date,
                    description: candidate.description,
                    amount: candidate.amount,
                    reason: reason.to_string(),
                });
            }
            Decision::Accept => {
                let (classification, matched) = classify_or_default(&candidate, &rules);
                let date = candidate.date;
                let record = NewTransaction {
                    candidate,
                    classification,
                    status: Status::Cleared,
                    tags: vec![CSV_BACKFILL_TAG.to_string(), batch_tag.clone()],
                };
                match store::insert_transaction(conn, &record, &fingerprint) {
                    Ok(_) => {
                        result.imported += 1;
                        if matched {
                            result.categorized += 1;
                        }
                        dates.push(date);
                    }
                    Err(e) => {
                        warn!(line, error = %e, "Insert failed");
                        dedup.forget(&fingerprint);
                        result.failed += 1;
                        result.row_error(line, format!("could not save: {e}"));
                    }
                }
            }
        }
    }

    conn.execute(
        "UPDATE imports SET record_count = ?1, imported_count = ?2, date_range_start = ?3, date_range_end = ?4 \
         WHERE id = ?5",
        rusqlite::params![
            result.total as i64,
            result.imported as i64,
            dates.iter().min(),
            dates.iter().max(),
            batch_id,
        ],
    )?;

    info!(
        filename,
        imported = result.imported,
        skipped = result.skipped,
        errors = result.error_count,
        "CSV import finished"
    );
    Ok(result)
}
