use std::path::PathBuf;

use colored::Colorize;

use crate::cli::open_db;
use crate::error::Result;
use crate::fmt::money;
use crate::importer::import_file;

pub fn run(file: &str) -> Result<()> {
    let file_path = PathBuf::from(file);
    let (_, conn) = open_db()?;

    let result = import_file(&conn, &file_path)?;

    println!(
        "{} imported, {} skipped, {} categorized ({} rows)",
        result.imported, result.skipped, result.categorized, result.total
    );
    for skip in &result.skipped_details {
        println!(
            "  {} {} {} {}: {}",
            "skip".yellow(),
            skip.date,
            skip.description,
            money(skip.amount),
            skip.reason
        );
    }
    if result.error_count > 0 {
        println!("{}", format!("{} row error(s)", result.error_count).red());
        for error in &result.errors {
            println!("  {error}");
        }
        if result.error_count > result.errors.len() {
            println!("  ... and {} more", result.error_count - result.errors.len());
        }
    }
    if result.failed > 0 {
        println!("{}", format!("{} row(s) could not be saved", result.failed).red());
    }
    Ok(())
}
