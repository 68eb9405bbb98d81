use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, TallyError};
use crate::models::Account;

pub fn add_account(conn: &Connection, name: &str, account_uid: &str) -> Result<i64> {
    let name = name.trim();
    let account_uid = account_uid.trim();
    if name.is_empty() || account_uid.is_empty() {
        return Err(TallyError::InvalidInput("account name and uid are required".into()));
    }
    if get_account(conn, name)?.is_some() {
        return Err(TallyError::Duplicate(format!("account '{name}' already exists")));
    }
    conn.execute(
        "INSERT INTO accounts (name, account_uid) VALUES (?1, ?2)",
        rusqlite::params![name, account_uid],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_accounts(conn: &Connection) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare("SELECT id, name, account_uid FROM accounts ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
                account_uid: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_account(conn: &Connection, name: &str) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            "SELECT id, name, account_uid FROM accounts WHERE name = ?1",
            [name],
            |row| {
                Ok(Account {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    account_uid: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(account)
}

/// Accounts to sync: the named one, or all of them.
pub fn select_accounts(conn: &Connection, name: Option<&str>) -> Result<Vec<Account>> {
    match name {
        Some(name) => get_account(conn, name)?
            .map(|a| vec![a])
            .ok_or_else(|| TallyError::UnknownAccount(name.to_string())),
        None => list_accounts(conn),
    }
}
