mod accounts;
mod backfill;
mod categorizer;
mod cli;
mod db;
mod dedup;
mod entry;
mod error;
mod exclusions;
mod feed;
mod fingerprint;
mod fmt;
mod importer;
mod models;
mod reconciler;
mod settings;
mod store;
mod sync;

use clap::Parser;
use tracing_subscriber::{fmt as log_fmt, prelude::*, EnvFilter};

use cli::{
    AccountsCommands, BackfillCommands, Cli, Commands, ExclusionsCommands, RulesCommands,
    TransactionsCommands,
};

fn main() {
    let cli = Cli::parse();

    // RUST_LOG > --verbose > warnings only
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(log_fmt::layer().with_target(false).with_writer(std::io::stderr).compact())
        .init();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add { name, uid } => cli::accounts::add(&name, &uid),
            AccountsCommands::List => cli::accounts::list(),
        },
        Commands::Import { file } => cli::import::run(&file),
        Commands::Sync { account, days } => cli::sync::run(account.as_deref(), days),
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                keyword,
                txn_type,
                business_type,
                category,
            } => cli::rules::add(&keyword, &txn_type, business_type.as_deref(), category.as_deref()),
            RulesCommands::List => cli::rules::list(),
            RulesCommands::Delete { id } => cli::rules::delete(id),
            RulesCommands::Move { id, position } => cli::rules::move_to(id, position),
            RulesCommands::Apply => cli::rules::apply(),
        },
        Commands::Exclusions { command } => match command {
            ExclusionsCommands::List => cli::exclusions::list(),
            ExclusionsCommands::Remove { fingerprint } => cli::exclusions::remove(&fingerprint),
        },
        Commands::Transactions { command } => match command {
            TransactionsCommands::List { limit } => cli::transactions::list(limit),
            TransactionsCommands::Add {
                date,
                description,
                amount,
                reference,
                merchant,
                txn_type,
                business_type,
                category,
                force,
            } => cli::transactions::add(
                &date,
                &description,
                amount,
                reference,
                merchant,
                txn_type.as_deref(),
                business_type.as_deref(),
                category.as_deref(),
                force,
            ),
            TransactionsCommands::Delete { id, exclude, reason } => {
                cli::transactions::delete(id, exclude, reason.as_deref())
            }
        },
        Commands::Backfill { command } => match command {
            BackfillCommands::Fingerprints => cli::backfill::fingerprints(),
            BackfillCommands::References { account, days } => {
                cli::backfill::references(account.as_deref(), days)
            }
        },
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
