pub mod accounts;
pub mod backfill;
pub mod exclusions;
pub mod import;
pub mod init;
pub mod rules;
pub mod status;
pub mod sync;
pub mod transactions;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::get_connection;
use crate::error::{Result, TallyError};
use crate::models::{BusinessType, Classification, TxnType};
use crate::settings::{load_settings, Settings};

/// Open the configured database. Fails instead of creating an empty one.
pub(crate) fn open_db() -> Result<(Settings, Connection)> {
    let settings = load_settings()?;
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(TallyError::Settings(format!(
            "database not found at {}; run `tally init` first",
            db_path.display()
        )));
    }
    let conn = get_connection(&db_path)?;
    Ok((settings, conn))
}

pub(crate) fn parse_classification(
    txn_type: &str,
    business_type: Option<&str>,
    category: Option<&str>,
) -> Result<Classification> {
    let txn_type: TxnType = txn_type.parse().map_err(TallyError::InvalidInput)?;
    let business_type = business_type
        .map(|b| b.parse::<BusinessType>())
        .transpose()
        .map_err(TallyError::InvalidInput)?;
    Ok(Classification {
        txn_type,
        business_type,
        category: category.map(str::trim).filter(|c| !c.is_empty()).map(str::to_string),
    })
}

#[derive(Parser)]
#[command(name = "tally", version, about = "Bank-feed and statement reconciliation for UK bookkeeping.")]
pub struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for tally data (default: ~/Documents/tally)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage bank-feed accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Import a CSV bank statement.
    Import {
        /// Path to the statement CSV
        file: String,
    },
    /// Pull recent items from the bank feed.
    Sync {
        /// Only sync this account
        #[arg(long)]
        account: Option<String>,
        /// Days to look back (max 90)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Manage categorization rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Manage the never-reimport list.
    Exclusions {
        #[command(subcommand)]
        command: ExclusionsCommands,
    },
    /// List, add and delete transactions.
    Transactions {
        #[command(subcommand)]
        command: TransactionsCommands,
    },
    /// Retrofit older rows.
    Backfill {
        #[command(subcommand)]
        command: BackfillCommands,
    },
    /// Show current database and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a bank-feed account.
    Add {
        /// Display name, e.g. 'Business Current'
        name: String,
        /// Account uid at the bank feed
        #[arg(long)]
        uid: String,
    },
    /// List all accounts.
    List,
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Append a rule. Earlier rules win.
    Add {
        /// Keyword matched against description, merchant and reference
        keyword: String,
        /// Business, Personal, Unreviewed or Split
        #[arg(long = "type")]
        txn_type: String,
        /// Income, Expense or Transfer
        #[arg(long = "business-type")]
        business_type: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// List rules in evaluation order.
    List,
    /// Delete a rule.
    Delete { id: i64 },
    /// Move a rule to a new 1-based position.
    Move { id: i64, position: usize },
    /// Re-run rules over stored transactions.
    Apply,
}

#[derive(Subcommand)]
pub enum ExclusionsCommands {
    /// List excluded fingerprints.
    List,
    /// Allow an excluded transaction to be imported again.
    Remove { fingerprint: String },
}

#[derive(Subcommand)]
pub enum TransactionsCommands {
    /// List transactions, newest first.
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Enter a transaction by hand.
    Add {
        /// Date: YYYY-MM-DD
        #[arg(long)]
        date: String,
        description: String,
        /// Signed amount; negative for money out
        #[arg(allow_negative_numbers = true)]
        amount: f64,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        merchant: Option<String>,
        /// Classify explicitly instead of by rules
        #[arg(long = "type")]
        txn_type: Option<String>,
        #[arg(long = "business-type")]
        business_type: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Skip the near-duplicate check
        #[arg(long)]
        force: bool,
    },
    /// Delete a transaction.
    Delete {
        id: i64,
        /// Never import this transaction again
        #[arg(long)]
        exclude: bool,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum BackfillCommands {
    /// Fingerprint rows created before fingerprinting existed.
    Fingerprints,
    /// Copy feed references onto already-synced rows.
    References {
        #[arg(long)]
        account: Option<String>,
        #[arg(long)]
        days: Option<i64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_negative_amount_parses() {
        let cli = Cli::try_parse_from([
            "tally", "transactions", "add", "--date", "2024-04-06", "Tesco", "-42.50",
        ])
        .unwrap();
        match cli.command {
            Commands::Transactions {
                command: TransactionsCommands::Add { amount, .. },
            } => assert_eq!(amount, -42.5),
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_parse_classification() {
        let c = parse_classification("business", Some("expense"), Some(" Software ")).unwrap();
        assert_eq!(c.txn_type, TxnType::Business);
        assert_eq!(c.business_type, Some(BusinessType::Expense));
        assert_eq!(c.category.as_deref(), Some("Software"));
        assert!(parse_classification("nonsense", None, None).is_err());
        assert!(parse_classification("Personal", Some("loan"), None).is_err());
    }
}
