use comfy_table::{Cell, Table};

use crate::cli::open_db;
use crate::error::{Result, TallyError};
use crate::exclusions::{list_entries, remove as remove_exclusion};
use crate::fmt::money;

pub fn list() -> Result<()> {
    let (_, conn) = open_db()?;
    let entries = list_entries(&conn)?;
    if entries.is_empty() {
        println!("No excluded transactions.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Fingerprint", "Date", "Description", "Amount", "Reason", "Excluded"]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.fingerprint),
            Cell::new(entry.date),
            Cell::new(entry.description),
            Cell::new(money(entry.amount)),
            Cell::new(entry.reason.unwrap_or_default()),
            Cell::new(entry.created_at),
        ]);
    }
    println!("Exclusions\n{table}");
    Ok(())
}

pub fn remove(fingerprint: &str) -> Result<()> {
    let (_, conn) = open_db()?;
    if !remove_exclusion(&conn, fingerprint)? {
        return Err(TallyError::NotFound(format!("exclusion {fingerprint}")));
    }
    println!("Removed exclusion {fingerprint}");
    Ok(())
}
