use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, TallyError};
use crate::models::{Candidate, Classification, Rule, TransactionUpdate, TxnType};
use crate::store;

fn matches(rule: &Rule, candidate: &Candidate) -> bool {
    let keyword = rule.keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    let fields = [
        Some(candidate.description.as_str()),
        candidate.merchant.as_deref(),
        candidate.reference.as_deref(),
    ];
    fields
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&keyword))
}

/// First rule, in stored order, whose keyword appears in the description,
/// merchant or reference. Order is the contract: first match wins.
pub fn find_match<'a>(candidate: &Candidate, rules: &'a [Rule]) -> Option<&'a Rule> {
    rules.iter().find(|rule| matches(rule, candidate))
}

pub fn classify(candidate: &Candidate, rules: &[Rule]) -> Option<Classification> {
    find_match(candidate, rules).map(|rule| rule.classification.clone())
}

/// Rule classification, or the amount-driven default. The flag reports
/// whether a rule matched.
pub fn classify_or_default(candidate: &Candidate, rules: &[Rule]) -> (Classification, bool) {
    match classify(candidate, rules) {
        Some(classification) => (classification, true),
        None => (Classification::default_for_amount(candidate.amount), false),
    }
}

// ---------------------------------------------------------------------------
// Bulk apply
// ---------------------------------------------------------------------------

pub struct ApplyResult {
    pub updated: usize,
    pub message: String,
}

/// Re-run every rule over every stored transaction, writing only the fields
/// that differ. Split transactions keep their classification.
pub fn apply_rules_to_existing(conn: &Connection) -> Result<ApplyResult> {
    let rules = store::list_rules(conn)?;
    if rules.is_empty() {
        return Ok(ApplyResult {
            updated: 0,
            message: "No rules defined".to_string(),
        });
    }

    let mut updated = 0usize;
    for txn in store::list_transactions(conn)? {
        if txn.classification.txn_type == TxnType::Split {
            continue;
        }
        let Some(rule) = find_match(&txn.as_candidate(), &rules) else {
            continue;
        };
        let wanted = &rule.classification;
        let current = &txn.classification;
        let update = TransactionUpdate {
            txn_type: (wanted.txn_type != current.txn_type).then_some(wanted.txn_type),
            business_type: (wanted.business_type != current.business_type).then_some(wanted.business_type),
            category: (wanted.category != current.category).then(|| wanted.category.clone()),
            ..Default::default()
        };
        if update.is_empty() {
            continue;
        }
        if store::update_transaction(conn, txn.id, &update)? {
            debug!(id = txn.id, rule = rule.id, keyword = %rule.keyword, "Rule applied");
            updated += 1;
        }
    }

    Ok(ApplyResult {
        updated,
        message: format!("Updated {updated} transaction(s) from {} rule(s)", rules.len()),
    })
}

// ---------------------------------------------------------------------------
// Rule maintenance
// ---------------------------------------------------------------------------

/// Append a rule at the end of the order.
pub fn add_rule(conn: &Connection, keyword: &str, classification: &Classification) -> Result<i64> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Err(TallyError::InvalidInput("rule keyword must not be empty".into()));
    }
    let next: i64 = conn.query_row("SELECT COALESCE(MAX(position), 0) + 1 FROM rules", [], |r| r.get(0))?;
    conn.execute(
        "INSERT INTO rules (keyword, txn_type, business_type, category, position) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            keyword,
            classification.txn_type,
            classification.business_type,
            classification.category,
            next,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn delete_rule(conn: &Connection, id: i64) -> Result<Rule> {
    let rule = store::list_rules(conn)?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| TallyError::NotFound(format!("rule {id}")))?;
    conn.execute("DELETE FROM rules WHERE id = ?1", [id])?;
    renumber(conn, store::list_rules(conn)?.iter().map(|r| r.id))?;
    Ok(rule)
}

/// Move a rule to a 1-based position, shifting the others.
pub fn move_rule(conn: &Connection, id: i64, to_position: usize) -> Result<()> {
    let mut ids: Vec<i64> = store::list_rules(conn)?.iter().map(|r| r.id).collect();
    let from = ids
        .iter()
        .position(|&r| r == id)
        .ok_or_else(|| TallyError::NotFound(format!("rule {id}")))?;
    let target = to_position.clamp(1, ids.len()) - 1;
    let moved = ids.remove(from);
    ids.insert(target, moved);
    renumber(conn, ids.into_iter())
}

fn renumber(conn: &Connection, ids: impl Iterator<Item = i64>) -> Result<()> {
    for (i, id) in ids.enumerate() {
        conn.execute(
            "UPDATE rules SET position = ?1 WHERE id = ?2",
            rusqlite::params![i as i64 + 1, id],
        )?;
    }
    Ok(())
}
