use std::path::Path;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{
    Account, AccountType, Category, InvestmentHolding, SourceType, Transaction, TransactionType,
};
use crate::settings::Config;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    account_type TEXT NOT NULL,
    institution_name TEXT,
    account_number_last4 TEXT,
    balance TEXT NOT NULL DEFAULT '0',
    balance_last_updated TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    parent_id INTEGER,
    FOREIGN KEY (parent_id) REFERENCES categories(id)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    account_id INTEGER,
    category_id INTEGER,
    subcategory_id INTEGER,
    transaction_hash TEXT NOT NULL,
    transaction_date TEXT NOT NULL,
    amount TEXT NOT NULL,
    transaction_type TEXT NOT NULL,
    description TEXT,
    institution_name TEXT NOT NULL DEFAULT '',
    account_number_last4 TEXT,
    source_type TEXT NOT NULL DEFAULT 'MANUAL',
    needs_review INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (account_id) REFERENCES accounts(id),
    FOREIGN KEY (category_id) REFERENCES categories(id),
    FOREIGN KEY (subcategory_id) REFERENCES categories(id)
);

CREATE INDEX IF NOT EXISTS idx_transactions_user_hash
    ON transactions(user_id, transaction_hash);

CREATE TABLE IF NOT EXISTS investment_holdings (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    quantity TEXT NOT NULL DEFAULT '0',
    average_cost_basis TEXT NOT NULL DEFAULT '0',
    current_price TEXT,
    last_price_update TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (account_id) REFERENCES accounts(id),
    UNIQUE (account_id, symbol)
);

CREATE TABLE IF NOT EXISTS investment_transactions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    account_id INTEGER,
    holding_id INTEGER,
    transaction_hash TEXT NOT NULL,
    transaction_date TEXT NOT NULL,
    transaction_type TEXT NOT NULL,
    symbol TEXT,
    api_symbol TEXT,
    security_type TEXT,
    quantity TEXT,
    price_per_share TEXT,
    amount TEXT NOT NULL,
    description TEXT,
    institution_name TEXT NOT NULL DEFAULT '',
    source_type TEXT NOT NULL DEFAULT 'MANUAL',
    needs_review INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (account_id) REFERENCES accounts(id),
    FOREIGN KEY (holding_id) REFERENCES investment_holdings(id)
);

CREATE INDEX IF NOT EXISTS idx_investment_transactions_user_hash
    ON investment_transactions(user_id, transaction_hash);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (user_id) REFERENCES users(id),
    UNIQUE (user_id, name)
);

CREATE TABLE IF NOT EXISTS transaction_tags (
    transaction_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    FOREIGN KEY (transaction_id) REFERENCES transactions(id),
    FOREIGN KEY (tag_id) REFERENCES tags(id),
    UNIQUE (transaction_id, tag_id)
);

CREATE TABLE IF NOT EXISTS transaction_relationships (
    id INTEGER PRIMARY KEY,
    from_transaction_id INTEGER NOT NULL,
    to_transaction_id INTEGER NOT NULL,
    relationship_type TEXT NOT NULL,
    amount_allocated TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (from_transaction_id) REFERENCES transactions(id),
    FOREIGN KEY (to_transaction_id) REFERENCES transactions(id),
    UNIQUE (from_transaction_id, to_transaction_id, relationship_type)
);

CREATE TABLE IF NOT EXISTS account_value_history (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    value_date TEXT NOT NULL,
    balance TEXT NOT NULL,
    total_cost_basis TEXT,
    unrealized_gain_loss TEXT,
    principal_paid_ytd TEXT,
    interest_paid_ytd TEXT,
    snapshot_source TEXT NOT NULL DEFAULT 'SYSTEM',
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (account_id) REFERENCES accounts(id),
    UNIQUE (account_id, value_date)
);

CREATE TABLE IF NOT EXISTS debt_payments (
    id INTEGER PRIMARY KEY,
    loan_account_id INTEGER NOT NULL,
    payment_date TEXT NOT NULL,
    principal_amount TEXT NOT NULL,
    interest_amount TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (loan_account_id) REFERENCES accounts(id)
);
";

// (name, parent name)
const DEFAULT_CATEGORIES: &[(&str, Option<&str>)] = &[
    ("Income", None),
    ("Housing", None),
    ("Food", None),
    ("Transportation", None),
    ("Utilities", None),
    ("Entertainment", None),
    ("Health", None),
    ("Travel", None),
    ("Fees & Charges", None),
    ("Transfers", None),
    ("Uncategorized", None),
    ("Salary", Some("Income")),
    ("Interest Earned", Some("Income")),
    ("Rent / Mortgage", Some("Housing")),
    ("Groceries", Some("Food")),
    ("Restaurants", Some("Food")),
    ("Gas", Some("Transportation")),
    ("Streaming", Some("Entertainment")),
];

/// Owns the SQLite connection for one ledger database. Constructed from an
/// explicit `Config`; callers control the lifecycle.
pub struct Ledger {
    pub(crate) conn: Connection,
}

impl Ledger {
    pub fn open(config: &Config) -> Result<Ledger> {
        Ledger::open_path(&config.db_path)
    }

    pub fn open_path(db_path: &Path) -> Result<Ledger> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Ledger { conn })
    }

    /// Create all tables and seed the default user and category tree.
    /// Safe to call on an already-initialized database.
    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;

        let users: i64 = self.conn.query_row("SELECT count(*) FROM users", [], |r| r.get(0))?;
        if users == 0 {
            self.conn.execute("INSERT INTO users (name) VALUES ('default')", [])?;
        }

        let categories: i64 = self
            .conn
            .query_row("SELECT count(*) FROM categories", [], |r| r.get(0))?;
        if categories == 0 {
            for (name, parent) in DEFAULT_CATEGORIES {
                let parent_id: Option<i64> = match parent {
                    Some(p) => Some(self.conn.query_row(
                        "SELECT id FROM categories WHERE name = ?1",
                        [p],
                        |r| r.get(0),
                    )?),
                    None => None,
                };
                self.conn.execute(
                    "INSERT INTO categories (name, parent_id) VALUES (?1, ?2)",
                    rusqlite::params![name, parent_id],
                )?;
            }
        }
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// First user in the ledger; the CLI operates single-user.
    pub fn default_user_id(&self) -> Result<i64> {
        let id = self
            .conn
            .query_row("SELECT id FROM users ORDER BY id LIMIT 1", [], |r| r.get(0))?;
        Ok(id)
    }
}

// ---- Decimal column helpers ----
//
// Amounts are stored as canonical decimal TEXT so no precision is lost to
// REAL round-tripping.

pub(crate) fn get_decimal(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn get_decimal_opt(row: &Row, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => Decimal::from_str(&s)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

pub(crate) fn round2(d: Decimal) -> Decimal {
    d.round_dp(2)
}

fn bad_enum(idx: usize, what: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unknown {what}: {raw}").into())
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub fn user_exists(conn: &Connection, user_id: i64) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM users WHERE id = ?1")?;
    Ok(stmt.exists([user_id])?)
}

pub fn list_user_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM users ORDER BY id")?;
    let rows = stmt.query_map([], |r| r.get(0))?;
    let mut ids = Vec::new();
    for id in rows {
        ids.push(id?);
    }
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

const ACCOUNT_COLUMNS: &str = "id, user_id, name, account_type, institution_name, \
                               account_number_last4, balance, balance_last_updated";

pub(crate) fn map_account(row: &Row) -> rusqlite::Result<Account> {
    let type_raw: String = row.get(3)?;
    let account_type =
        AccountType::parse(&type_raw).ok_or_else(|| bad_enum(3, "account type", &type_raw))?;
    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        account_type,
        institution_name: row.get(4)?,
        account_number_last4: row.get(5)?,
        balance: get_decimal(row, 6)?,
        balance_last_updated: row.get(7)?,
    })
}

pub fn get_account(conn: &Connection, user_id: i64, account_id: i64) -> Result<Option<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1 AND user_id = ?2"
    ))?;
    Ok(stmt
        .query_row(params![account_id, user_id], map_account)
        .optional()?)
}

/// Match an account by the trailing digits of its number, for reconnecting a
/// parsed statement to the account it belongs to.
pub fn get_account_by_last4(
    conn: &Connection,
    user_id: i64,
    last4: &str,
) -> Result<Option<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 AND account_number_last4 = ?2"
    ))?;
    Ok(stmt
        .query_row(params![user_id, last4], map_account)
        .optional()?)
}

pub fn list_accounts(conn: &Connection, user_id: i64) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map([user_id], map_account)?;
    let mut accounts = Vec::new();
    for account in rows {
        accounts.push(account?);
    }
    Ok(accounts)
}

pub fn create_account(
    conn: &Connection,
    user_id: i64,
    name: &str,
    account_type: AccountType,
    institution_name: Option<&str>,
    account_number_last4: Option<&str>,
    opening_balance: Decimal,
) -> Result<Account> {
    let balance = round2(opening_balance);
    conn.execute(
        "INSERT INTO accounts (user_id, name, account_type, institution_name, account_number_last4, balance) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user_id,
            name,
            account_type.as_str(),
            institution_name,
            account_number_last4,
            balance.to_string(),
        ],
    )?;
    Ok(Account {
        id: conn.last_insert_rowid(),
        user_id,
        name: name.to_string(),
        account_type,
        institution_name: institution_name.map(str::to_string),
        account_number_last4: account_number_last4.map(str::to_string),
        balance,
        balance_last_updated: None,
    })
}

/// Write a new ledger balance, rounded to cents, stamping the update time.
pub(crate) fn update_account_balance(
    conn: &Connection,
    account_id: i64,
    balance: Decimal,
) -> Result<()> {
    conn.execute(
        "UPDATE accounts SET balance = ?1, balance_last_updated = datetime('now') WHERE id = ?2",
        params![round2(balance).to_string(), account_id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub fn get_category(conn: &Connection, category_id: i64) -> Result<Option<Category>> {
    let mut stmt = conn.prepare("SELECT id, name, parent_id FROM categories WHERE id = ?1")?;
    Ok(stmt
        .query_row([category_id], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                parent_id: row.get(2)?,
            })
        })
        .optional()?)
}

// ---------------------------------------------------------------------------
// Holdings
// ---------------------------------------------------------------------------

const HOLDING_COLUMNS: &str = "id, account_id, symbol, quantity, average_cost_basis, \
                               current_price, last_price_update";

pub(crate) fn map_holding(row: &Row) -> rusqlite::Result<InvestmentHolding> {
    Ok(InvestmentHolding {
        id: row.get(0)?,
        account_id: row.get(1)?,
        symbol: row.get(2)?,
        quantity: get_decimal(row, 3)?,
        average_cost_basis: get_decimal(row, 4)?,
        current_price: get_decimal_opt(row, 5)?,
        last_price_update: row.get(6)?,
    })
}

pub fn find_holding(
    conn: &Connection,
    account_id: i64,
    symbol: &str,
) -> Result<Option<InvestmentHolding>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HOLDING_COLUMNS} FROM investment_holdings WHERE account_id = ?1 AND symbol = ?2"
    ))?;
    Ok(stmt
        .query_row(params![account_id, symbol], map_holding)
        .optional()?)
}

pub fn list_holdings(conn: &Connection, account_id: i64) -> Result<Vec<InvestmentHolding>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HOLDING_COLUMNS} FROM investment_holdings WHERE account_id = ?1 ORDER BY symbol"
    ))?;
    let rows = stmt.query_map([account_id], map_holding)?;
    let mut holdings = Vec::new();
    for holding in rows {
        holdings.push(holding?);
    }
    Ok(holdings)
}

/// Insert an empty position; quantity and basis arrive with the transactions
/// that build it up.
pub(crate) fn create_holding(
    conn: &Connection,
    account_id: i64,
    symbol: &str,
) -> Result<InvestmentHolding> {
    conn.execute(
        "INSERT INTO investment_holdings (account_id, symbol, quantity, average_cost_basis) \
         VALUES (?1, ?2, '0', '0')",
        params![account_id, symbol],
    )?;
    Ok(InvestmentHolding {
        id: conn.last_insert_rowid(),
        account_id,
        symbol: symbol.to_string(),
        quantity: Decimal::ZERO,
        average_cost_basis: Decimal::ZERO,
        current_price: None,
        last_price_update: None,
    })
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

const TRANSACTION_COLUMNS: &str =
    "id, user_id, account_id, category_id, subcategory_id, transaction_hash, transaction_date, \
     amount, transaction_type, description, institution_name, account_number_last4, source_type, \
     needs_review";

pub(crate) fn map_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    let type_raw: String = row.get(8)?;
    let transaction_type = TransactionType::parse(&type_raw)
        .ok_or_else(|| bad_enum(8, "transaction type", &type_raw))?;
    let source_raw: String = row.get(12)?;
    let source_type =
        SourceType::parse(&source_raw).ok_or_else(|| bad_enum(12, "source type", &source_raw))?;
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        category_id: row.get(3)?,
        subcategory_id: row.get(4)?,
        transaction_hash: row.get(5)?,
        transaction_date: row.get(6)?,
        amount: get_decimal(row, 7)?,
        transaction_type,
        description: row.get(9)?,
        institution_name: row.get(10)?,
        account_number_last4: row.get(11)?,
        source_type,
        needs_review: row.get(13)?,
    })
}

pub fn get_transaction(
    conn: &Connection,
    user_id: i64,
    transaction_id: i64,
) -> Result<Option<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1 AND user_id = ?2"
    ))?;
    Ok(stmt
        .query_row(params![transaction_id, user_id], map_transaction)
        .optional()?)
}

pub fn list_review_transactions(conn: &Connection, user_id: i64) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions \
         WHERE user_id = ?1 AND needs_review = 1 ORDER BY transaction_date DESC, id DESC"
    ))?;
    let rows = stmt.query_map([user_id], map_transaction)?;
    let mut transactions = Vec::new();
    for transaction in rows {
        transactions.push(transaction?);
    }
    Ok(transactions)
}
