use chrono::Utc;

use crate::accounts::select_accounts;
use crate::backfill::{backfill_fingerprints, backfill_references};
use crate::cli::open_db;
use crate::error::Result;
use crate::feed::{lookback_start, FeedClient};

pub fn fingerprints() -> Result<()> {
    let (_, conn) = open_db()?;
    let result = backfill_fingerprints(&conn)?;
    println!("{}", result.message);
    Ok(())
}

pub fn references(account: Option<&str>, days: Option<i64>) -> Result<()> {
    let (settings, conn) = open_db()?;
    let accounts = select_accounts(&conn, account)?;
    let client = FeedClient::new(&settings.feed.api_base, &settings.feed_token()?)?;
    let since = lookback_start(Utc::now(), days.unwrap_or(settings.feed.lookback_days));
    let result = backfill_references(&conn, &client, &accounts, since)?;
    println!("{}", result.message);
    Ok(())
}
