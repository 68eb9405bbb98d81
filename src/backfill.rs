use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::Result;
use crate::feed::{FeedSource, FEED_TAG_PREFIX};
use crate::fingerprint::{fingerprint, occurrence_fingerprint};
use crate::models::{Account, TransactionUpdate};
use crate::store;

#[derive(Debug, Default, PartialEq)]
pub struct BackfillResult {
    pub updated: usize,
    pub total: usize,
    pub message: String,
}

/// Give every legacy row a fingerprint. A base fingerprint already held by
/// another row moves on to the next free occurrence fingerprint.
pub fn backfill_fingerprints(conn: &Connection) -> Result<BackfillResult> {
    let legacy = store::list_unfingerprinted(conn)?;
    let mut taken: HashSet<String> = store::list_all_fingerprints(conn)?;
    let mut result = BackfillResult {
        total: legacy.len(),
        ..Default::default()
    };

    for txn in &legacy {
        let base = fingerprint(txn.date, txn.amount, &txn.description);
        let mut occurrence = 1;
        let mut fp = base.clone();
        while taken.contains(&fp) {
            occurrence += 1;
            fp = occurrence_fingerprint(&base, occurrence);
        }
        let update = TransactionUpdate {
            fingerprint: Some(fp.clone()),
            ..Default::default()
        };
        match store::update_transaction(conn, txn.id, &update) {
            Ok(_) => {
                taken.insert(fp);
                result.updated += 1;
            }
            Err(e) => warn!(id = txn.id, error = %e, "Fingerprint backfill failed"),
        }
    }

    result.message = if result.total == 0 {
        "All transactions already have fingerprints".to_string()
    } else {
        format!("Fingerprinted {} of {} transaction(s)", result.updated, result.total)
    };
    info!(updated = result.updated, total = result.total, "Fingerprint backfill finished");
    Ok(result)
}

/// Re-read the feed window and copy references onto rows already correlated
/// to a feed item. Nothing but the reference is written.
pub fn backfill_references(
    conn: &Connection,
    source: &impl FeedSource,
    accounts: &[Account],
    since: DateTime<Utc>,
) -> Result<BackfillResult> {
    let correlated = store::correlation_index(conn, FEED_TAG_PREFIX)?;
    let mut result = BackfillResult::default();

    for account in accounts {
        let items = match source.fetch_changes(&account.account_uid, since) {
            Ok(items) => items,
            Err(e) => {
                warn!(account = %account.name, error = %e, "Feed fetch failed");
                continue;
            }
        };
        for item in &items {
            let Some(stored) = correlated.get(&item.correlation_tag()) else {
                continue;
            };
            result.total += 1;
            let Some(reference) = item.to_candidate().reference else {
                continue;
            };
            if stored.reference.as_deref() == Some(reference.as_str()) {
                continue;
            }
            let update = TransactionUpdate {
                reference: Some(reference),
                ..Default::default()
            };
            match store::update_transaction(conn, stored.id, &update) {
                Ok(true) => result.updated += 1,
                Ok(false) => {}
                Err(e) => warn!(id = stored.id, error = %e, "Reference backfill failed"),
            }
        }
    }

    result.message = format!(
        "Updated references on {} of {} matched transaction(s)",
        result.updated, result.total
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::dedup::{Decision, DedupContext, SkipReason};
    use crate::models::TxnType;
    use crate::store::test_support::{candidate, date, seed};
    use crate::sync::sync_accounts;
    use crate::sync::test_support::{account, item, StubFeed};

    fn insert_legacy(conn: &Connection, d: &str, description: &str, amount: f64) -> i64 {
        conn.execute(
            "INSERT INTO transactions (date, description, amount) VALUES (?1, ?2, ?3)",
            rusqlite::params![d, description, amount],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn test_backfill_fingerprints() {
        let (_dir, conn) = test_db();
        let id = insert_legacy(&conn, "2024-04-06", "Tesco", -42.5);
        let result = backfill_fingerprints(&conn).unwrap();
        assert_eq!(result.updated, 1);
        assert_eq!(result.total, 1);

        let txn = store::get_transaction(&conn, id).unwrap().unwrap();
        assert_eq!(txn.fingerprint, Some(fingerprint(date("2024-04-06"), -42.5, "Tesco")));

        // Once fingerprinted the legacy row shields against re-import.
        let mut dedup = DedupContext::load(&conn).unwrap();
        let c = candidate("2024-04-06", "TESCO", -42.5);
        let fp = dedup.fingerprint_for(&c);
        assert_eq!(
            dedup.decide(&conn, &fp, &c).unwrap(),
            Decision::Reject(SkipReason::ExactMatch)
        );
    }

    #[test]
    fn test_backfill_resolves_collisions() {
        let (_dir, conn) = test_db();
        seed(&conn, "2024-04-06", "Tesco", -42.5);
        let a = insert_legacy(&conn, "2024-04-06", "Tesco", -42.5);
        let b = insert_legacy(&conn, "2024-04-06", "tesco ", -42.5);
        let result = backfill_fingerprints(&conn).unwrap();
        assert_eq!(result.updated, 2);

        let base = fingerprint(date("2024-04-06"), -42.5, "Tesco");
        let fa = store::get_transaction(&conn, a).unwrap().unwrap().fingerprint.unwrap();
        let fb = store::get_transaction(&conn, b).unwrap().unwrap().fingerprint.unwrap();
        assert_eq!(fa, occurrence_fingerprint(&base, 2));
        assert_eq!(fb, occurrence_fingerprint(&base, 3));
    }

    #[test]
    fn test_backfill_fingerprints_nothing_to_do() {
        let (_dir, conn) = test_db();
        seed(&conn, "2024-04-06", "Tesco", -42.5);
        let result = backfill_fingerprints(&conn).unwrap();
        assert_eq!(result.updated, 0);
        assert_eq!(result.total, 0);
        assert_eq!(result.message, "All transactions already have fingerprints");
    }

    fn with_reference(uid: &str, reference: &str) -> crate::feed::FeedItem {
        let mut it = item(uid, "2024-04-06", 4250, "OUT", "Tesco", "SETTLED");
        it.reference = Some(reference.to_string());
        it
    }

    #[test]
    fn test_backfill_references_only_touches_reference() {
        let (_dir, conn) = test_db();
        let accounts = [account(1, "Current", "acc-1")];
        let first = StubFeed::default().with(
            "acc-1",
            vec![
                item("u1", "2024-04-06", 4250, "OUT", "Tesco", "SETTLED"),
                item("u2", "2024-04-07", 999, "OUT", "Netflix", "SETTLED"),
            ],
        );
        sync_accounts(&conn, &first, &accounts, Utc::now()).unwrap();
        let id = store::find_by_tag(&conn, "feed:u1").unwrap().unwrap().id;
        conn.execute("UPDATE transactions SET txn_type = 'Personal' WHERE id = ?1", [id]).unwrap();

        let later = StubFeed::default().with(
            "acc-1",
            vec![
                with_reference("u1", "CARD 1234"),
                item("u2", "2024-04-07", 999, "OUT", "Netflix", "SETTLED"),
                with_reference("u3", "unknown item"),
            ],
        );
        let result = backfill_references(&conn, &later, &accounts, Utc::now()).unwrap();
        assert_eq!(result.updated, 1);
        assert_eq!(result.total, 2);

        let txn = store::get_transaction(&conn, id).unwrap().unwrap();
        assert_eq!(txn.reference.as_deref(), Some("CARD 1234"));
        assert_eq!(txn.classification.txn_type, TxnType::Personal);
        assert!(store::find_by_tag(&conn, "feed:u3").unwrap().is_none());

        let again = backfill_references(&conn, &later, &accounts, Utc::now()).unwrap();
        assert_eq!(again.updated, 0);
    }

    #[test]
    fn test_backfill_references_skips_unreachable_accounts() {
        let (_dir, conn) = test_db();
        let feed = StubFeed::default();
        let result = backfill_references(&conn, &feed, &[account(1, "Broken", "acc-1")], Utc::now()).unwrap();
        assert_eq!(result, BackfillResult {
            updated: 0,
            total: 0,
            message: "Updated references on 0 of 0 matched transaction(s)".to_string(),
        });
    }
}
