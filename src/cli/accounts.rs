use comfy_table::{Cell, Table};
use rust_decimal::Decimal;

use crate::db;
use crate::error::{PassbookError, Result};
use crate::fmt::money;
use crate::models::AccountType;
use crate::snapshot::latest_snapshot;

pub fn add(
    name: &str,
    account_type: &str,
    institution: Option<&str>,
    last_four: Option<&str>,
    balance: Decimal,
    user: Option<i64>,
) -> Result<()> {
    let parsed_type = AccountType::parse(&account_type.replace('-', "_")).ok_or_else(|| {
        PassbookError::Other(format!(
            "unknown account type '{account_type}', expected checking, savings, credit_card, loan, investment, other"
        ))
    })?;

    let ledger = super::open_ledger()?;
    let user_id = super::resolve_user(&ledger, user)?;
    let account = db::create_account(
        ledger.conn(),
        user_id,
        name,
        parsed_type,
        institution,
        last_four,
        balance,
    )?;
    println!("Added account: {} (id {})", account.name, account.id);
    Ok(())
}

pub fn list(user: Option<i64>) -> Result<()> {
    let ledger = super::open_ledger()?;
    let user_id = super::resolve_user(&ledger, user)?;
    let accounts = db::list_accounts(ledger.conn(), user_id)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "Institution", "Last Four", "Balance", "As Of"]);
    for account in accounts {
        let mut balance = account.balance;
        let mut as_of = account
            .balance_last_updated
            .as_deref()
            .map(|ts| ts.chars().take(10).collect::<String>())
            .unwrap_or_default();

        // Investment balances go stale between statements; a newer snapshot
        // carries the marked-to-market value.
        if account.account_type == AccountType::Investment {
            if let Some(snapshot) = latest_snapshot(ledger.conn(), account.id)? {
                let snap_date = snapshot.value_date.to_string();
                if as_of.is_empty() || snap_date.as_str() > as_of.as_str() {
                    balance = snapshot.balance;
                    as_of = snap_date;
                }
            }
        }

        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(account.name),
            Cell::new(account.account_type.as_str()),
            Cell::new(account.institution_name.unwrap_or_default()),
            Cell::new(account.account_number_last4.unwrap_or_default()),
            Cell::new(money(balance)),
            Cell::new(as_of),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}
