use crate::db::get_connection;
use crate::error::Result;
use crate::settings::{load_settings, settings_path};

pub fn run() -> Result<()> {
    let settings = load_settings()?;
    let db_path = settings.db_path();

    println!("Settings:   {}", settings_path().display());
    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Feed API:   {}", settings.feed.api_base);

    if db_path.exists() {
        let conn = get_connection(&db_path)?;
        let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };

        println!();
        println!("Accounts:       {}", count("SELECT count(*) FROM accounts")?);
        println!("Transactions:   {}", count("SELECT count(*) FROM transactions")?);
        println!("Pending:        {}", count("SELECT count(*) FROM transactions WHERE status = 'Pending'")?);
        println!("Unreviewed:     {}", count("SELECT count(*) FROM transactions WHERE txn_type = 'Unreviewed'")?);
        println!("Legacy rows:    {}", count("SELECT count(*) FROM transactions WHERE fingerprint IS NULL")?);
        println!("Rules:          {}", count("SELECT count(*) FROM rules")?);
        println!("Exclusions:     {}", count("SELECT count(*) FROM exclusions")?);
        println!("Imports:        {}", count("SELECT count(*) FROM imports")?);
    } else {
        println!();
        println!("Database not found. Run `tally init` to set up.");
    }

    Ok(())
}
