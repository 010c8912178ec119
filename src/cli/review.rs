use std::collections::{HashMap, HashSet};

use colored::Colorize;
use comfy_table::{Cell, Table};
use rusqlite::params;

use crate::db;
use crate::error::Result;
use crate::fmt::money;
use crate::reconcile::DUPLICATE_TAG;

pub fn list(user: Option<i64>) -> Result<()> {
    let ledger = super::open_ledger()?;
    let user_id = super::resolve_user(&ledger, user)?;

    let flagged = db::list_review_transactions(ledger.conn(), user_id)?;
    if flagged.is_empty() {
        println!("No transactions need review.");
        return Ok(());
    }

    let account_names: HashMap<i64, String> = db::list_accounts(ledger.conn(), user_id)?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();

    let mut stmt = ledger.conn().prepare(
        "SELECT tt.transaction_id FROM transaction_tags tt \
         JOIN tags t ON t.id = tt.tag_id \
         WHERE t.user_id = ?1 AND t.name = ?2",
    )?;
    let duplicates: HashSet<i64> = stmt
        .query_map(params![user_id, DUPLICATE_TAG], |r| r.get(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Account", "Type", "Amount", "Description", "Flags"]);
    for txn in &flagged {
        let account = txn
            .account_id
            .and_then(|id| account_names.get(&id).cloned())
            .unwrap_or_default();
        let mut flags = Vec::new();
        if duplicates.contains(&txn.id) {
            flags.push("duplicate".yellow().to_string());
        }
        if txn.account_id.is_none() {
            flags.push("unattached".red().to_string());
        }
        table.add_row(vec![
            Cell::new(txn.id),
            Cell::new(txn.transaction_date),
            Cell::new(account),
            Cell::new(txn.transaction_type.as_str()),
            Cell::new(money(txn.amount)),
            Cell::new(txn.description.clone().unwrap_or_default()),
            Cell::new(flags.join(", ")),
        ]);
    }
    println!("Needs review ({})\n{table}", flagged.len());
    Ok(())
}
