use comfy_table::{Cell, Table};

use crate::accounts::{add_account, list_accounts};
use crate::cli::open_db;
use crate::error::Result;

pub fn add(name: &str, uid: &str) -> Result<()> {
    let (_, conn) = open_db()?;
    add_account(&conn, name, uid)?;
    println!("Added account: {name}");
    Ok(())
}

pub fn list() -> Result<()> {
    let (_, conn) = open_db()?;
    let accounts = list_accounts(&conn)?;
    if accounts.is_empty() {
        println!("No accounts. Add one with `tally accounts add <name> --uid <uid>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Feed UID"]);
    for account in accounts {
        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(account.name),
            Cell::new(account.account_uid),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}
