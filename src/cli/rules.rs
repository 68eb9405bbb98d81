use comfy_table::{Cell, Table};

use crate::categorizer::{add_rule, apply_rules_to_existing, delete_rule, move_rule};
use crate::cli::{open_db, parse_classification};
use crate::error::Result;
use crate::store::list_rules;

pub fn add(keyword: &str, txn_type: &str, business_type: Option<&str>, category: Option<&str>) -> Result<()> {
    let (_, conn) = open_db()?;
    let classification = parse_classification(txn_type, business_type, category)?;
    let id = add_rule(&conn, keyword, &classification)?;
    println!(
        "Added rule {id}: '{}' \u{2192} {}",
        keyword.trim(),
        classification.category.as_deref().unwrap_or(classification.txn_type.as_str())
    );
    Ok(())
}

pub fn list() -> Result<()> {
    let (_, conn) = open_db()?;
    let rules = list_rules(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["#", "ID", "Keyword", "Type", "Business Type", "Category"]);
    for (i, rule) in rules.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(rule.id),
            Cell::new(&rule.keyword),
            Cell::new(rule.classification.txn_type),
            Cell::new(rule.classification.business_type.map(|b| b.as_str()).unwrap_or("")),
            Cell::new(rule.classification.category.as_deref().unwrap_or("")),
        ]);
    }
    println!("Rules (first match wins)\n{table}");
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let (_, conn) = open_db()?;
    let rule = delete_rule(&conn, id)?;
    println!("Deleted rule {id}: '{}'", rule.keyword);
    Ok(())
}

pub fn move_to(id: i64, position: usize) -> Result<()> {
    let (_, conn) = open_db()?;
    move_rule(&conn, id, position)?;
    println!("Moved rule {id} to position {position}");
    Ok(())
}

pub fn apply() -> Result<()> {
    let (_, conn) = open_db()?;
    let result = apply_rules_to_existing(&conn)?;
    println!("{}", result.message);
    Ok(())
}
