//! Daily account valuation. One snapshot row per account per date; taking a
//! snapshot twice on the same date revalues in place. Market prices are
//! refreshed best-effort before the end-of-day run.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Weekday};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::db::{self, get_decimal, get_decimal_opt, round2, Ledger};
use crate::error::{PassbookError, Result};
use crate::models::{Account, AccountSnapshot, AccountType, SnapshotSource};
use crate::prices::PriceSource;

/// Weekends are not trading days. Market holidays are not tracked.
pub fn is_market_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

// ---------------------------------------------------------------------------
// Single-account snapshot
// ---------------------------------------------------------------------------

pub fn snapshot_account(
    ledger: &Ledger,
    user_id: i64,
    account_id: i64,
    value_date: NaiveDate,
    source: SnapshotSource,
) -> Result<AccountSnapshot> {
    let conn = ledger.conn();
    let account = db::get_account(conn, user_id, account_id)?.ok_or_else(|| {
        PassbookError::UnknownAccount(format!("account {account_id} not found for user {user_id}"))
    })?;

    let mut balance = account.balance;
    let mut total_cost_basis = None;
    let mut unrealized_gain_loss = None;
    let mut principal_paid_ytd = None;
    let mut interest_paid_ytd = None;

    match account.account_type {
        AccountType::Investment => {
            let (value, cost) = value_holdings(conn, &account)?;
            balance = value;
            if cost > Decimal::ZERO {
                total_cost_basis = Some(cost);
                unrealized_gain_loss = Some(round2(value - cost));
            }
        }
        AccountType::Loan => {
            let (principal, interest) = ytd_debt_payments(conn, account.id, value_date)?;
            principal_paid_ytd = principal;
            interest_paid_ytd = interest;
        }
        _ => {}
    }

    conn.execute(
        "INSERT INTO account_value_history (account_id, value_date, balance, total_cost_basis, \
         unrealized_gain_loss, principal_paid_ytd, interest_paid_ytd, snapshot_source) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         ON CONFLICT (account_id, value_date) DO UPDATE SET \
         balance = excluded.balance, total_cost_basis = excluded.total_cost_basis, \
         unrealized_gain_loss = excluded.unrealized_gain_loss, \
         principal_paid_ytd = excluded.principal_paid_ytd, \
         interest_paid_ytd = excluded.interest_paid_ytd",
        params![
            account.id,
            value_date,
            round2(balance).to_string(),
            total_cost_basis.map(|d| d.to_string()),
            unrealized_gain_loss.map(|d| d.to_string()),
            principal_paid_ytd.map(|d| d.to_string()),
            interest_paid_ytd.map(|d| d.to_string()),
            source.as_str(),
        ],
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, account_id, value_date, balance, total_cost_basis, unrealized_gain_loss, \
         principal_paid_ytd, interest_paid_ytd, snapshot_source \
         FROM account_value_history WHERE account_id = ?1 AND value_date = ?2",
    )?;
    Ok(stmt.query_row(params![account.id, value_date], map_snapshot)?)
}

fn map_snapshot(row: &Row) -> rusqlite::Result<AccountSnapshot> {
    let source_raw: String = row.get(8)?;
    let snapshot_source = SnapshotSource::parse(&source_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            format!("unknown snapshot source: {source_raw}").into(),
        )
    })?;
    Ok(AccountSnapshot {
        id: row.get(0)?,
        account_id: row.get(1)?,
        value_date: row.get(2)?,
        balance: get_decimal(row, 3)?,
        total_cost_basis: get_decimal_opt(row, 4)?,
        unrealized_gain_loss: get_decimal_opt(row, 5)?,
        principal_paid_ytd: get_decimal_opt(row, 6)?,
        interest_paid_ytd: get_decimal_opt(row, 7)?,
        snapshot_source,
    })
}

/// Most recent snapshot for an account, if any.
pub fn latest_snapshot(conn: &Connection, account_id: i64) -> Result<Option<AccountSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT id, account_id, value_date, balance, total_cost_basis, unrealized_gain_loss, \
         principal_paid_ytd, interest_paid_ytd, snapshot_source \
         FROM account_value_history WHERE account_id = ?1 \
         ORDER BY value_date DESC LIMIT 1",
    )?;
    Ok(stmt.query_row([account_id], map_snapshot).optional()?)
}

/// Mark-to-market value and cost basis across an account's open positions.
/// A holding without a quote falls back to its cost basis.
fn value_holdings(conn: &Connection, account: &Account) -> Result<(Decimal, Decimal)> {
    let mut value = Decimal::ZERO;
    let mut cost = Decimal::ZERO;
    for holding in db::list_holdings(conn, account.id)? {
        if holding.quantity <= Decimal::ZERO {
            continue;
        }
        let price = holding.current_price.unwrap_or(holding.average_cost_basis);
        value += holding.quantity * price;
        cost += holding.quantity * holding.average_cost_basis;
    }
    Ok((round2(value), round2(cost)))
}

fn ytd_debt_payments(
    conn: &Connection,
    account_id: i64,
    value_date: NaiveDate,
) -> Result<(Option<Decimal>, Option<Decimal>)> {
    let year_start =
        NaiveDate::from_ymd_opt(value_date.year(), 1, 1).unwrap_or(value_date);
    let mut stmt = conn.prepare(
        "SELECT principal_amount, interest_amount FROM debt_payments \
         WHERE loan_account_id = ?1 AND payment_date >= ?2 AND payment_date <= ?3",
    )?;
    let rows = stmt.query_map(params![account_id, year_start, value_date], |row| {
        Ok((get_decimal(row, 0)?, get_decimal(row, 1)?))
    })?;

    let mut principal = Decimal::ZERO;
    let mut interest = Decimal::ZERO;
    let mut any = false;
    for row in rows {
        let (p, i) = row?;
        principal += p;
        interest += i;
        any = true;
    }
    if any {
        Ok((Some(principal), Some(interest)))
    } else {
        Ok((None, None))
    }
}

// ---------------------------------------------------------------------------
// End-of-day run
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PriceRefresh {
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct SnapshotRun {
    pub created: usize,
    pub failed: usize,
    pub prices: Option<PriceRefresh>,
}

/// Snapshot every account the user owns. One bad account does not stop the
/// run; it is logged and counted.
pub fn snapshot_all_accounts(
    ledger: &Ledger,
    user_id: i64,
    value_date: NaiveDate,
    source: SnapshotSource,
    price_source: Option<&dyn PriceSource>,
    delay: Duration,
) -> Result<SnapshotRun> {
    if !db::user_exists(ledger.conn(), user_id)? {
        return Err(PassbookError::UnknownUser(user_id));
    }

    let mut run = SnapshotRun::default();
    if let Some(price_source) = price_source {
        run.prices = Some(refresh_holding_prices(ledger, user_id, price_source, delay)?);
    }

    for account in db::list_accounts(ledger.conn(), user_id)? {
        match snapshot_account(ledger, user_id, account.id, value_date, source) {
            Ok(_) => run.created += 1,
            Err(e) => {
                log::error!("snapshot failed for account {} ({}): {e}", account.id, account.name);
                run.failed += 1;
            }
        }
    }
    log::info!(
        "snapshot run for {value_date}: {} accounts captured, {} failed",
        run.created,
        run.failed,
    );
    Ok(run)
}

/// Refresh quotes for every holding in the user's investment accounts.
/// Holdings quote by the `api_symbol` their transactions recorded when one
/// exists (options need the OCC code), falling back to the plain symbol.
/// Each distinct symbol is fetched once per run.
pub fn refresh_holding_prices(
    ledger: &Ledger,
    user_id: i64,
    source: &dyn PriceSource,
    delay: Duration,
) -> Result<PriceRefresh> {
    let conn = ledger.conn();
    let mut stmt = conn.prepare(
        "SELECT h.id, h.symbol FROM investment_holdings h \
         JOIN accounts a ON a.id = h.account_id \
         WHERE a.user_id = ?1 AND a.account_type = 'INVESTMENT' \
         ORDER BY h.symbol, h.id",
    )?;
    let holdings: Vec<(i64, String)> = stmt
        .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;
    if holdings.is_empty() {
        return Ok(PriceRefresh::default());
    }

    let mut refresh = PriceRefresh::default();
    let mut cache: HashMap<String, Option<Decimal>> = HashMap::new();
    for (holding_id, symbol) in holdings {
        let quote_key = quote_key_for(conn, user_id, &symbol)?;
        let price = match cache.get(&quote_key) {
            Some(price) => *price,
            None => {
                if !cache.is_empty() {
                    std::thread::sleep(delay);
                }
                let price = source.fetch_price(&quote_key);
                cache.insert(quote_key.clone(), price);
                price
            }
        };
        match price {
            Some(price) => {
                conn.execute(
                    "UPDATE investment_holdings SET current_price = ?1, \
                     last_price_update = datetime('now'), updated_at = datetime('now') \
                     WHERE id = ?2",
                    params![price.to_string(), holding_id],
                )?;
                refresh.updated += 1;
            }
            None => {
                log::warn!("no price for {symbol} (quoted as {quote_key})");
                refresh.failed += 1;
            }
        }
    }
    log::info!("price refresh: {} holdings updated, {} failed", refresh.updated, refresh.failed);
    Ok(refresh)
}

fn quote_key_for(conn: &Connection, user_id: i64, symbol: &str) -> Result<String> {
    let api: Option<String> = conn
        .query_row(
            "SELECT api_symbol FROM investment_transactions \
             WHERE user_id = ?1 AND symbol = ?2 AND api_symbol IS NOT NULL \
             ORDER BY id DESC LIMIT 1",
            params![user_id, symbol],
            |row| row.get(0),
        )
        .optional()?;
    Ok(api.unwrap_or_else(|| symbol.to_string()))
}

// ---------------------------------------------------------------------------
// Net worth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetWorthPoint {
    pub date: NaiveDate,
    pub assets: Decimal,
    pub liabilities: Decimal,
    pub net_worth: Decimal,
}

/// Snapshot history rolled up per date. Liability accounts contribute by
/// absolute value, so a credit card carrying a negative ledger balance still
/// counts against net worth.
pub fn net_worth_history(
    ledger: &Ledger,
    user_id: i64,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<NetWorthPoint>> {
    let mut stmt = ledger.conn().prepare(
        "SELECT h.value_date, a.account_type, h.balance \
         FROM account_value_history h \
         JOIN accounts a ON a.id = h.account_id \
         WHERE a.user_id = ?1 \
           AND (?2 IS NULL OR h.value_date >= ?2) \
           AND (?3 IS NULL OR h.value_date <= ?3) \
         ORDER BY h.value_date",
    )?;
    let rows = stmt.query_map(params![user_id, from, to], |row| {
        let date: NaiveDate = row.get(0)?;
        let type_raw: String = row.get(1)?;
        let balance = get_decimal(row, 2)?;
        Ok((date, type_raw, balance))
    })?;

    let mut by_date: Vec<NetWorthPoint> = Vec::new();
    for row in rows {
        let (date, type_raw, balance) = row?;
        let liability = AccountType::parse(&type_raw).map_or(false, |t| t.is_liability());
        if by_date.last().map(|p| p.date) != Some(date) {
            by_date.push(NetWorthPoint {
                date,
                assets: Decimal::ZERO,
                liabilities: Decimal::ZERO,
                net_worth: Decimal::ZERO,
            });
        }
        if let Some(point) = by_date.last_mut() {
            if liability {
                point.liabilities += balance.abs();
            } else {
                point.assets += balance;
            }
            point.net_worth = point.assets - point.liabilities;
        }
    }
    Ok(by_date)
}
