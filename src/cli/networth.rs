use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::money;
use crate::snapshot::net_worth_history;

pub fn run(from: Option<&str>, to: Option<&str>, user: Option<i64>) -> Result<()> {
    let ledger = super::open_ledger()?;
    let user_id = super::resolve_user(&ledger, user)?;
    let from = super::parse_date_opt(from)?;
    let to = super::parse_date_opt(to)?;

    let points = net_worth_history(&ledger, user_id, from, to)?;
    if points.is_empty() {
        println!("No snapshots recorded yet. Run `passbook snapshot run` first.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Date", "Assets", "Liabilities", "Net Worth"]);
    for point in &points {
        let net = if point.net_worth.is_sign_negative() {
            money(point.net_worth).red().bold()
        } else {
            money(point.net_worth).green().bold()
        };
        table.add_row(vec![
            Cell::new(point.date),
            Cell::new(money(point.assets)),
            Cell::new(money(point.liabilities)),
            Cell::new(net),
        ]);
    }
    println!("Net worth\n{table}");
    Ok(())
}
