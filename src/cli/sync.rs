use chrono::Utc;
use colored::Colorize;

use crate::accounts::select_accounts;
use crate::cli::open_db;
use crate::error::Result;
use crate::feed::{lookback_start, FeedClient};
use crate::sync::sync_accounts;

pub fn run(account: Option<&str>, days: Option<i64>) -> Result<()> {
    let (settings, conn) = open_db()?;
    let accounts = select_accounts(&conn, account)?;
    if accounts.is_empty() {
        println!("No accounts to sync. Add one with `tally accounts add <name> --uid <uid>`.");
        return Ok(());
    }

    let client = FeedClient::new(&settings.feed.api_base, &settings.feed_token()?)?;
    let since = lookback_start(Utc::now(), days.unwrap_or(settings.feed.lookback_days));
    let result = sync_accounts(&conn, &client, &accounts, since)?;

    if result.failed_accounts.is_empty() && result.failed == 0 {
        println!("{}", result.message);
    } else {
        println!("{}", result.message.yellow());
    }
    Ok(())
}
