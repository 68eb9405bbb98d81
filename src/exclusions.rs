use std::collections::HashSet;

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, TallyError};
use crate::fingerprint::fingerprint;
use crate::models::ExclusionEntry;
use crate::store;

/// Descriptive fields kept next to an excluded fingerprint.
#[derive(Debug, Clone)]
pub struct ExclusionMeta<'a> {
    pub amount: f64,
    pub date: NaiveDate,
    pub description: &'a str,
    pub reason: Option<&'a str>,
}

pub fn is_excluded(conn: &Connection, fingerprint: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM exclusions WHERE fingerprint = ?1")?;
    Ok(stmt.exists([fingerprint])?)
}

/// Register `fingerprint`. Excluding an already excluded fingerprint keeps
/// the original entry.
pub fn exclude(conn: &Connection, fingerprint: &str, meta: &ExclusionMeta) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO exclusions (fingerprint, amount, date, description, reason) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![fingerprint, meta.amount, meta.date, meta.description, meta.reason],
    )?;
    Ok(())
}

pub fn list_excluded(conn: &Connection) -> Result<HashSet<String>> {
    store::list_excluded_fingerprints(conn)
}

pub fn list_entries(conn: &Connection) -> Result<Vec<ExclusionEntry>> {
    let mut stmt = conn.prepare(
        "SELECT fingerprint, amount, date, description, reason, created_at \
         FROM exclusions ORDER BY created_at, date",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ExclusionEntry {
                fingerprint: row.get(0)?,
                amount: row.get(1)?,
                date: row.get(2)?,
                description: row.get(3)?,
                reason: row.get(4)?,
                created_at: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn remove(conn: &Connection, fingerprint: &str) -> Result<bool> {
    let removed = conn.execute("DELETE FROM exclusions WHERE fingerprint = ?1", [fingerprint])?;
    Ok(removed > 0)
}

pub struct DeleteResult {
    pub description: String,
    pub excluded_fingerprint: Option<String>,
}

/// Delete a transaction, optionally registering its fingerprint so no sync
/// or import brings it back.
pub fn delete_transaction(
    conn: &Connection,
    id: i64,
    never_reimport: bool,
    reason: Option<&str>,
) -> Result<DeleteResult> {
    let txn = store::get_transaction(conn, id)?
        .ok_or_else(|| TallyError::NotFound(format!("transaction {id}")))?;

    let excluded_fingerprint = if never_reimport {
        let fp = txn
            .fingerprint
            .clone()
            .unwrap_or_else(|| fingerprint(txn.date, txn.amount, &txn.description));
        exclude(
            conn,
            &fp,
            &ExclusionMeta {
                amount: txn.amount,
                date: txn.date,
                description: &txn.description,
                reason,
            },
        )?;
        Some(fp)
    } else {
        None
    };

    store::delete_transaction(conn, id)?;
    info!(id, excluded = excluded_fingerprint.is_some(), "Deleted transaction");

    Ok(DeleteResult {
        description: txn.description,
        excluded_fingerprint,
    })
}
