pub mod accounts;
pub mod import;
pub mod init;
pub mod networth;
pub mod prices;
pub mod review;
pub mod snapshot;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crate::db::{self, Ledger};
use crate::error::{PassbookError, Result};
use crate::settings::{load_settings, Config};

/// Open the ledger named by the saved settings.
pub(crate) fn open_ledger() -> Result<Ledger> {
    let settings = load_settings();
    Ledger::open(&Config::from_settings(&settings))
}

/// Resolve an optional `--user` argument, falling back to the default user.
pub(crate) fn resolve_user(ledger: &Ledger, user: Option<i64>) -> Result<i64> {
    match user {
        Some(id) => {
            if !db::user_exists(ledger.conn(), id)? {
                return Err(PassbookError::UnknownUser(id));
            }
            Ok(id)
        }
        None => ledger.default_user_id(),
    }
}

pub(crate) fn parse_date_opt(value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| PassbookError::Other(format!("invalid date '{s}', expected YYYY-MM-DD"))),
        None => Ok(None),
    }
}

#[derive(Parser)]
#[command(name = "passbook", about = "Statement ingestion and account tracking for personal finances.")]
pub struct Cli {
    /// Log verbosity: error, warn, info, debug, trace (RUST_LOG overrides)
    #[arg(long = "log-level", global = true, default_value_t = log::LevelFilter::Info)]
    pub log_level: log::LevelFilter,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up Passbook: choose a data directory and initialize the database.
    Init {
        /// Path for Passbook data (default: ~/Documents/passbook)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Import a statement file (CSV or PDF) from an institution.
    Import {
        /// Path to the statement file
        file: String,
        /// Institution key: amex, tdbank, amzn-synchrony, schwab, tdameritrade, ameriprise
        #[arg(long)]
        institution: String,
        /// Account ID to attach rows to (default: match by account number)
        #[arg(long)]
        account: Option<i64>,
        /// User ID (default: the default user)
        #[arg(long)]
        user: Option<i64>,
    },
    /// Capture account value snapshots.
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommands,
    },
    /// Market prices for investment holdings.
    Prices {
        #[command(subcommand)]
        command: PricesCommands,
    },
    /// Transactions flagged for review.
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
    /// Show net worth history from account snapshots.
    Networth {
        /// Earliest snapshot date to include: YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// Latest snapshot date to include: YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,
        /// User ID (default: the default user)
        #[arg(long)]
        user: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a new account.
    Add {
        /// Account name, e.g. 'TD Checking'
        name: String,
        /// Account type: checking, savings, credit_card, loan, investment, other
        #[arg(long = "type")]
        account_type: String,
        /// Institution name
        #[arg(long)]
        institution: Option<String>,
        /// Last 4 digits of account number
        #[arg(long = "last-four")]
        last_four: Option<String>,
        /// Opening balance
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        balance: Decimal,
        /// User ID (default: the default user)
        #[arg(long)]
        user: Option<i64>,
    },
    /// List all accounts.
    List {
        /// User ID (default: the default user)
        #[arg(long)]
        user: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Record a valuation snapshot for every account.
    Run {
        /// Valuation date: YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        /// User ID (default: every user)
        #[arg(long)]
        user: Option<i64>,
        /// Do nothing when the date falls on a weekend
        #[arg(long = "skip-weekends")]
        skip_weekends: bool,
        /// Refresh market prices before valuing investment accounts
        #[arg(long = "with-prices")]
        with_prices: bool,
        /// Pause between quote requests, in milliseconds
        #[arg(long = "delay-ms")]
        delay_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum PricesCommands {
    /// Fetch current quotes for every investment holding.
    Refresh {
        /// User ID (default: the default user)
        #[arg(long)]
        user: Option<i64>,
        /// Pause between quote requests, in milliseconds
        #[arg(long = "delay-ms")]
        delay_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ReviewCommands {
    /// List transactions flagged for review.
    List {
        /// User ID (default: the default user)
        #[arg(long)]
        user: Option<i64>,
    },
}
