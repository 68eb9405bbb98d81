use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::{open_db, parse_classification};
use crate::entry::add_manual;
use crate::error::{Result, TallyError};
use crate::exclusions::delete_transaction;
use crate::fmt::money;
use crate::models::{Candidate, Status};
use crate::store::list_transactions;

pub fn list(limit: usize) -> Result<()> {
    let (_, conn) = open_db()?;
    let txns = list_transactions(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Description", "Amount", "Type", "Category", "Status"]);
    for txn in txns.iter().rev().take(limit) {
        let status = match txn.status {
            Status::Pending => txn.status.as_str().yellow().to_string(),
            Status::Cleared => txn.status.as_str().to_string(),
        };
        table.add_row(vec![
            Cell::new(txn.id),
            Cell::new(txn.date),
            Cell::new(&txn.description),
            Cell::new(money(txn.amount)).set_alignment(CellAlignment::Right),
            Cell::new(txn.classification.txn_type),
            Cell::new(txn.classification.category.as_deref().unwrap_or("")),
            Cell::new(status),
        ]);
    }
    println!("Transactions ({} of {})\n{table}", txns.len().min(limit), txns.len());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn add(
    date: &str,
    description: &str,
    amount: f64,
    reference: Option<String>,
    merchant: Option<String>,
    txn_type: Option<&str>,
    business_type: Option<&str>,
    category: Option<&str>,
    force: bool,
) -> Result<()> {
    let (_, conn) = open_db()?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| TallyError::InvalidInput(format!("invalid date '{date}', expected YYYY-MM-DD")))?;
    let classification = txn_type
        .map(|t| parse_classification(t, business_type, category))
        .transpose()?;
    let candidate = Candidate {
        date,
        description: description.trim().to_string(),
        merchant,
        reference,
        amount,
    };
    let id = add_manual(&conn, candidate, classification, force)?;
    println!("Added transaction {id}: {date} {} {}", description.trim(), money(amount));
    Ok(())
}

pub fn delete(id: i64, exclude: bool, reason: Option<&str>) -> Result<()> {
    let (_, conn) = open_db()?;
    let result = delete_transaction(&conn, id, exclude, reason)?;
    match result.excluded_fingerprint {
        Some(fp) => println!("Deleted {id} ({}); excluded as {fp}", result.description),
        None => println!("Deleted {id} ({})", result.description),
    }
    Ok(())
}
