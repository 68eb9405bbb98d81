use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::dedup::FUZZY_WINDOW_DAYS;
use crate::error::Result;
use crate::fingerprint::normalize_description;
use crate::fmt::round_cents;
use crate::models::{Classification, NewTransaction, Rule, Status, Transaction, TransactionUpdate};

const TXN_COLUMNS: &str = "id, date, description, merchant, reference, amount, txn_type, \
                           business_type, category, status, fingerprint";

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        date: row.get(1)?,
        description: row.get(2)?,
        merchant: row.get(3)?,
        reference: row.get(4)?,
        amount: row.get(5)?,
        classification: Classification {
            txn_type: row.get(6)?,
            business_type: row.get(7)?,
            category: row.get(8)?,
        },
        status: row.get(9)?,
        tags: Vec::new(),
        fingerprint: row.get(10)?,
    })
}

fn tags_for(conn: &Connection, transaction_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT tag FROM transaction_tags WHERE transaction_id = ?1 ORDER BY tag",
    )?;
    let tags = stmt
        .query_map([transaction_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(tags)
}

pub fn list_all_fingerprints(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT fingerprint FROM transactions WHERE fingerprint IS NOT NULL")?;
    let set = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<String>, _>>()?;
    Ok(set)
}

pub fn list_excluded_fingerprints(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT fingerprint FROM exclusions")?;
    let set = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<String>, _>>()?;
    Ok(set)
}

/// Look for a stored record with the same amount and normalized description
/// dated within the fuzzy window of `date`. Records whose fingerprint is in
/// `exclude` (the current batch) are ignored.
pub fn find_fuzzy_duplicate(
    conn: &Connection,
    date: NaiveDate,
    amount: f64,
    description: &str,
    exclude: &HashSet<String>,
) -> Result<Option<Transaction>> {
    let from = date - Duration::days(FUZZY_WINDOW_DAYS);
    let to = date + Duration::days(FUZZY_WINDOW_DAYS);
    let wanted = normalize_description(description);

    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {TXN_COLUMNS} FROM transactions \
         WHERE date BETWEEN ?1 AND ?2 AND ABS(amount - ?3) < 0.005 \
         ORDER BY date, id"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![from, to, round_cents(amount)], row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows.into_iter().find(|txn| {
        normalize_description(&txn.description) == wanted
            && !txn
                .fingerprint
                .as_ref()
                .is_some_and(|fp| exclude.contains(fp))
    }))
}

pub fn insert_transaction(conn: &Connection, record: &NewTransaction, fingerprint: &str) -> Result<i64> {
    let c = &record.candidate;
    conn.execute(
        "INSERT INTO transactions (date, description, merchant, reference, amount, txn_type, \
         business_type, category, status, fingerprint) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            c.date,
            c.description,
            c.merchant,
            c.reference,
            round_cents(c.amount),
            record.classification.txn_type,
            record.classification.business_type,
            record.classification.category,
            record.status,
            fingerprint,
        ],
    )?;
    let id = conn.last_insert_rowid();
    for tag in &record.tags {
        conn.execute(
            "INSERT OR IGNORE INTO transaction_tags (transaction_id, tag) VALUES (?1, ?2)",
            rusqlite::params![id, tag],
        )?;
    }
    Ok(id)
}

/// Apply the set fields of `update`. Returns whether a row changed.
pub fn update_transaction(conn: &Connection, id: i64, update: &TransactionUpdate) -> Result<bool> {
    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(reference) = &update.reference {
        sets.push("reference = ?");
        values.push(Box::new(reference.clone()));
    }
    if let Some(txn_type) = update.txn_type {
        sets.push("txn_type = ?");
        values.push(Box::new(txn_type));
    }
    if let Some(business_type) = update.business_type {
        sets.push("business_type = ?");
        values.push(Box::new(business_type));
    }
    if let Some(category) = &update.category {
        sets.push("category = ?");
        values.push(Box::new(category.clone()));
    }
    if let Some(status) = update.status {
        sets.push("status = ?");
        values.push(Box::new(status));
    }
    if let Some(fingerprint) = &update.fingerprint {
        sets.push("fingerprint = ?");
        values.push(Box::new(fingerprint.clone()));
    }
    if sets.is_empty() {
        return Ok(false);
    }

    values.push(Box::new(id));
    let sql = format!("UPDATE transactions SET {} WHERE id = ?", sets.join(", "));
    let changed = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
    Ok(changed > 0)
}

pub fn list_rules(conn: &Connection) -> Result<Vec<Rule>> {
    let mut stmt = conn.prepare(
        "SELECT id, keyword, txn_type, business_type, category, position \
         FROM rules ORDER BY position, id",
    )?;
    let rules = stmt
        .query_map([], |row| {
            Ok(Rule {
                id: row.get(0)?,
                keyword: row.get(1)?,
                classification: Classification {
                    txn_type: row.get(2)?,
                    business_type: row.get(3)?,
                    category: row.get(4)?,
                },
                position: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rules)
}

pub fn list_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    let mut tag_stmt = conn.prepare("SELECT transaction_id, tag FROM transaction_tags ORDER BY tag")?;
    let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
    let tag_rows = tag_stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for (id, tag) in tag_rows {
        tags.entry(id).or_default().push(tag);
    }

    let mut stmt = conn.prepare(&format!("SELECT {TXN_COLUMNS} FROM transactions ORDER BY date, id"))?;
    let mut rows = stmt
        .query_map([], row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for txn in &mut rows {
        txn.tags = tags.remove(&txn.id).unwrap_or_default();
    }
    Ok(rows)
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Option<Transaction>> {
    let txn = conn
        .query_row(
            &format!("SELECT {TXN_COLUMNS} FROM transactions WHERE id = ?1"),
            [id],
            row_to_transaction,
        )
        .optional()?;
    match txn {
        Some(mut txn) => {
            txn.tags = tags_for(conn, id)?;
            Ok(Some(txn))
        }
        None => Ok(None),
    }
}

pub fn delete_transaction(conn: &Connection, id: i64) -> Result<bool> {
    conn.execute("DELETE FROM transaction_tags WHERE transaction_id = ?1", [id])?;
    let deleted = conn.execute("DELETE FROM transactions WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

#[cfg(test)]
pub fn find_by_tag(conn: &Connection, tag: &str) -> Result<Option<Transaction>> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT transaction_id FROM transaction_tags WHERE tag = ?1 ORDER BY transaction_id LIMIT 1",
            [tag],
            |row| row.get(0),
        )
        .optional()?;
    match id {
        Some(id) => get_transaction(conn, id),
        None => Ok(None),
    }
}

/// A stored row reachable through a durable source correlation tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlated {
    pub id: i64,
    pub status: Status,
    pub reference: Option<String>,
}

/// Map every tag starting with `prefix` to the row it is attached to.
/// Keys keep the full tag text.
pub fn correlation_index(conn: &Connection, prefix: &str) -> Result<HashMap<String, Correlated>> {
    let mut stmt = conn.prepare(
        "SELECT tt.tag, t.id, t.status, t.reference \
         FROM transaction_tags tt JOIN transactions t ON t.id = tt.transaction_id \
         WHERE substr(tt.tag, 1, length(?1)) = ?1",
    )?;
    let rows = stmt
        .query_map([prefix], |row| {
            Ok((
                row.get::<_, String>(0)?,
                Correlated {
                    id: row.get(1)?,
                    status: row.get(2)?,
                    reference: row.get(3)?,
                },
            ))
        })?
        .collect::<std::result::Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

pub fn list_unfingerprinted(conn: &Connection) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TXN_COLUMNS} FROM transactions WHERE fingerprint IS NULL ORDER BY date, id"
    ))?;
    let rows = stmt
        .query_map([], row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::models::Candidate;

    pub fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub fn candidate(d: &str, description: &str, amount: f64) -> Candidate {
        Candidate {
            date: date(d),
            description: description.to_string(),
            merchant: None,
            reference: None,
            amount,
        }
    }

    /// Insert with the plain fingerprint and default classification.
    pub fn seed(conn: &Connection, d: &str, description: &str, amount: f64) -> i64 {
        let c = candidate(d, description, amount);
        let fp = fingerprint(c.date, c.amount, &c.description);
        let record = NewTransaction {
            classification: Classification::default_for_amount(amount),
            candidate: c,
            status: Status::Cleared,
            tags: Vec::new(),
        };
        insert_transaction(conn, &record, &fp).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::db::test_db;
    use crate::fingerprint::fingerprint;
    use crate::models::{BusinessType, TxnType};

    #[test]
    fn test_insert_and_list() {
        let (_dir, conn) = test_db();
        let c = candidate("2024-04-06", "Tesco", -42.5);
        let fp = fingerprint(c.date, c.amount, &c.description);
        let record = NewTransaction {
            candidate: c,
            classification: Classification::default_for_amount(-42.5),
            status: Status::Pending,
            tags: vec!["feed:abc".to_string(), "csv-backfill".to_string()],
        };
        let id = insert_transaction(&conn, &record, &fp).unwrap();

        let all = list_transactions(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].date, date("2024-04-06"));
        assert_eq!(all[0].amount, -42.5);
        assert_eq!(all[0].status, Status::Pending);
        assert_eq!(all[0].tags, vec!["csv-backfill".to_string(), "feed:abc".to_string()]);
        assert_eq!(all[0].fingerprint.as_deref(), Some(fp.as_str()));
        assert!(list_all_fingerprints(&conn).unwrap().contains(&fp));
    }

    #[test]
    fn test_insert_duplicate_fingerprint_fails() {
        let (_dir, conn) = test_db();
        seed(&conn, "2024-04-06", "Tesco", -42.5);
        let c = candidate("2024-04-06", "TESCO ", -42.5);
        let fp = fingerprint(c.date, c.amount, &c.description);
        let record = NewTransaction {
            candidate: c,
            classification: Classification::default_for_amount(-42.5),
            status: Status::Cleared,
            tags: Vec::new(),
        };
        assert!(insert_transaction(&conn, &record, &fp).is_err());
    }

    #[test]
    fn test_fuzzy_window_is_inclusive_one_day() {
        let (_dir, conn) = test_db();
        seed(&conn, "2024-04-06", "Tesco", -42.5);
        let none = HashSet::new();
        for d in ["2024-04-05", "2024-04-06", "2024-04-07"] {
            assert!(find_fuzzy_duplicate(&conn, date(d), -42.5, "tesco", &none).unwrap().is_some(), "{d}");
        }
        for d in ["2024-04-04", "2024-04-08"] {
            assert!(find_fuzzy_duplicate(&conn, date(d), -42.5, "Tesco", &none).unwrap().is_none(), "{d}");
        }
    }

    #[test]
    fn test_fuzzy_requires_same_amount_and_description() {
        let (_dir, conn) = test_db();
        seed(&conn, "2024-04-06", "Tesco", -42.5);
        let none = HashSet::new();
        assert!(find_fuzzy_duplicate(&conn, date("2024-04-07"), -42.51, "Tesco", &none).unwrap().is_none());
        assert!(find_fuzzy_duplicate(&conn, date("2024-04-07"), -42.5, "Sainsbury", &none).unwrap().is_none());
    }

    #[test]
    fn test_fuzzy_ignores_excluded_fingerprints() {
        let (_dir, conn) = test_db();
        seed(&conn, "2024-04-06", "Tesco", -42.5);
        let fp = fingerprint(date("2024-04-06"), -42.5, "Tesco");
        let batch: HashSet<String> = [fp].into_iter().collect();
        assert!(find_fuzzy_duplicate(&conn, date("2024-04-06"), -42.5, "Tesco", &batch).unwrap().is_none());
    }

    #[test]
    fn test_update_writes_only_given_fields() {
        let (_dir, conn) = test_db();
        let id = seed(&conn, "2024-04-06", "Tesco", -42.5);
        let update = TransactionUpdate {
            txn_type: Some(TxnType::Business),
            category: Some(Some("Office".to_string())),
            ..Default::default()
        };
        assert!(update_transaction(&conn, id, &update).unwrap());
        let txn = get_transaction(&conn, id).unwrap().unwrap();
        assert_eq!(txn.classification.txn_type, TxnType::Business);
        assert_eq!(txn.classification.business_type, Some(BusinessType::Expense));
        assert_eq!(txn.classification.category.as_deref(), Some("Office"));
        assert_eq!(txn.amount, -42.5);
        assert!(!update_transaction(&conn, id, &TransactionUpdate::default()).unwrap());
    }

    #[test]
    fn test_rules_listed_in_position_order() {
        let (_dir, conn) = test_db();
        conn.execute("INSERT INTO rules (keyword, txn_type, position) VALUES ('B', 'Personal', 2)", []).unwrap();
        conn.execute("INSERT INTO rules (keyword, txn_type, position) VALUES ('A', 'Business', 1)", []).unwrap();
        let rules = list_rules(&conn).unwrap();
        let keywords: Vec<&str> = rules.iter().map(|r| r.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["A", "B"]);
    }

    #[test]
    fn test_correlation_index_and_find_by_tag() {
        let (_dir, conn) = test_db();
        let id = seed(&conn, "2024-04-06", "Tesco", -42.5);
        conn.execute(
            "INSERT INTO transaction_tags (transaction_id, tag) VALUES (?1, 'feed:uid-1'), (?1, 'csv-backfill')",
            [id],
        )
        .unwrap();
        let index = correlation_index(&conn, "feed:").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index["feed:uid-1"].id, id);
        assert_eq!(find_by_tag(&conn, "feed:uid-1").unwrap().map(|t| t.id), Some(id));
        assert!(find_by_tag(&conn, "feed:missing").unwrap().is_none());
    }

    #[test]
    fn test_delete_transaction_removes_tags() {
        let (_dir, conn) = test_db();
        let id = seed(&conn, "2024-04-06", "Tesco", -42.5);
        conn.execute("INSERT INTO transaction_tags (transaction_id, tag) VALUES (?1, 'x')", [id]).unwrap();
        assert!(delete_transaction(&conn, id).unwrap());
        assert!(!delete_transaction(&conn, id).unwrap());
        let tags: i64 = conn.query_row("SELECT count(*) FROM transaction_tags", [], |r| r.get(0)).unwrap();
        assert_eq!(tags, 0);
    }
}
