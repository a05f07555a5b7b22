//! Classify command handler

use anyhow::Result;
use colored::*;
use strata_core::domain::target::TargetExpr;

/// Prints the classification of each expression
///
/// Every expression is reported; the command fails afterwards if any of
/// them was invalid.
pub fn handle_classify(expressions: &[String]) -> Result<()> {
    let mut invalid = 0;

    for raw in expressions {
        match TargetExpr::classify(raw) {
            Ok(expr) => println!("{} {} {}", "✓".green(), raw.bold(), kind(&expr).cyan()),
            Err(e) => {
                invalid += 1;
                println!("{} {} {}", "✗".red(), raw.bold(), e.to_string().red());
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} invalid target expression(s)", invalid);
    }
    Ok(())
}

fn kind(expr: &TargetExpr) -> String {
    match expr {
        TargetExpr::Approval => "approval".to_string(),
        TargetExpr::AccountId(_) => "account id".to_string(),
        TargetExpr::OuId(_) => "ou id".to_string(),
        TargetExpr::OuPath {
            recursive: true, ..
        } => "ou path (recursive)".to_string(),
        TargetExpr::OuPath { .. } => "ou path".to_string(),
        TargetExpr::Tags(_) => "tags".to_string(),
        TargetExpr::RegionOnly => "regions only".to_string(),
    }
}
