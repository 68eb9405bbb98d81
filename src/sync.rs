use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::categorizer::classify_or_default;
use crate::dedup::{DedupContext, Decision};
use crate::error::Result;
use crate::feed::{FeedSource, FEED_TAG_PREFIX};
use crate::models::{Account, NewTransaction, Status};
use crate::reconciler::{initial_status, reconcile_status};
use crate::store::{self, Correlated};

#[derive(Debug, Default)]
pub struct SyncResult {
    pub imported: usize,
    pub status_updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_accounts: Vec<String>,
    pub message: String,
}

/// Items already correlated through their `feed:<uid>` tag only get their
/// status reconciled. New items go through the duplicate gate and the rules.
pub fn sync_accounts(
    conn: &Connection,
    source: &impl FeedSource,
    accounts: &[Account],
    since: DateTime<Utc>,
) -> Result<SyncResult> {
    let rules = store::list_rules(conn)?;
    let mut dedup = DedupContext::load(conn)?;
    let mut correlated = store::correlation_index(conn, FEED_TAG_PREFIX)?;
    let mut result = SyncResult::default();

    for account in accounts {
        let items = match source.fetch_changes(&account.account_uid, since) {
            Ok(items) => items,
            Err(e) => {
                warn!(account = %account.name, error = %e, "Feed fetch failed");
                result.failed_accounts.push(account.name.clone());
                continue;
            }
        };
        info!(account = %account.name, items = items.len(), "Syncing feed items");

        for item in &items {
            let tag = item.correlation_tag();

            if let Some(stored) = correlated.get_mut(&tag) {
                match reconcile_status(conn, stored, &item.status) {
                    Ok(true) => {
                        stored.status = Status::Cleared;
                        result.status_updated += 1;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(id = stored.id, error = %e, "Status update failed");
                        result.failed += 1;
                    }
                }
                continue;
            }

            let candidate = item.to_candidate();
            let fingerprint = dedup.fingerprint_for(&candidate);
            let decision = match dedup.decide(conn, &fingerprint, &candidate) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(uid = %item.feed_item_uid, error = %e, "Duplicate check failed");
                    result.failed += 1;
                    continue;
                }
            };
            match decision {
                Decision::Reject(reason) => {
                    debug!(uid = %item.feed_item_uid, %reason, "Skipped feed item");
                    result.skipped += 1;
                }
                Decision::Accept => {
                    let (classification, _) = classify_or_default(&candidate, &rules);
                    let status = initial_status(&item.status);
                    let record = NewTransaction {
                        candidate,
                        classification,
                        status,
                        tags: vec![tag.clone()],
                    };
                    match store::insert_transaction(conn, &record, &fingerprint) {
                        Ok(id) => {
                            result.imported += 1;
                            correlated.insert(
                                tag,
                                Correlated {
                                    id,
                                    status,
                                    reference: record.candidate.reference.clone(),
                                },
                            );
                        }
                        Err(e) => {
                            warn!(uid = %item.feed_item_uid, error = %e, "Insert failed");
                            dedup.forget(&fingerprint);
                            result.failed += 1;
                        }
                    }
                }
            }
        }
    }

    result.message = summary(&result);
    info!(
        accepted = dedup.accepted(),
        imported = result.imported,
        status_updated = result.status_updated,
        skipped = result.skipped,
        "Sync finished"
    );
    Ok(result)
}

fn summary(result: &SyncResult) -> String {
    let mut message = format!(
        "Imported {} new transaction(s), updated {} status(es), skipped {} duplicate(s)",
        result.imported, result.status_updated, result.skipped
    );
    if result.failed > 0 {
        message.push_str(&format!(", {} write(s) failed", result.failed));
    }
    if !result.failed_accounts.is_empty() {
        message.push_str(&format!("; could not reach feed for: {}", result.failed_accounts.join(", ")));
    }
    message
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;
    use crate::error::TallyError;
    use crate::feed::FeedItem;

    /// In-memory feed keyed by account uid. Unknown accounts fail like an
    /// unreachable upstream.
    #[derive(Default)]
    pub struct StubFeed {
        pub items: RefCell<HashMap<String, Vec<FeedItem>>>,
    }

    impl StubFeed {
        pub fn with(self, account_uid: &str, items: Vec<FeedItem>) -> Self {
            self.items.borrow_mut().insert(account_uid.to_string(), items);
            self
        }
    }

    impl FeedSource for StubFeed {
        fn fetch_changes(&self, account_uid: &str, _since: DateTime<Utc>) -> Result<Vec<FeedItem>> {
            self.items
                .borrow()
                .get(account_uid)
                .cloned()
                .ok_or(TallyError::Feed { status: 503, body: "unavailable".into() })
        }
    }

    pub fn item(uid: &str, date: &str, minor_units: i64, direction: &str, name: &str, status: &str) -> FeedItem {
        serde_json::from_value(serde_json::json!({
            "feedItemUid": uid,
            "transactionTime": format!("{date}T12:00:00.000Z"),
            "amount": { "currency": "GBP", "minorUnits": minor_units },
            "direction": direction,
            "counterPartyName": name,
            "status": status,
        }))
        .unwrap()
    }

    pub fn account(id: i64, name: &str, uid: &str) -> Account {
        Account { id, name: name.to_string(), account_uid: uid.to_string() }
    }
}
