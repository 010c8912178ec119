use std::time::Duration;

use chrono::Local;

use crate::db::{self, Ledger};
use crate::error::{PassbookError, Result};
use crate::models::SnapshotSource;
use crate::prices::{HttpPriceSource, PriceSource};
use crate::settings::{load_settings, Config};
use crate::snapshot::{is_market_day, snapshot_all_accounts};

pub fn run(
    date: Option<&str>,
    user: Option<i64>,
    skip_weekends: bool,
    with_prices: bool,
    delay_ms: Option<u64>,
) -> Result<()> {
    let settings = load_settings();
    let config = Config::from_settings(&settings);
    let ledger = Ledger::open(&config)?;

    let value_date = super::parse_date_opt(date)?.unwrap_or_else(|| Local::now().date_naive());
    if skip_weekends && !is_market_day(value_date) {
        println!("{value_date} is not a market day; nothing to do.");
        return Ok(());
    }

    let delay = delay_ms.map(Duration::from_millis).unwrap_or(config.price.delay);
    let price_source = if with_prices {
        Some(HttpPriceSource::new(&config.price)?)
    } else {
        None
    };

    let user_ids = match user {
        Some(id) => {
            if !db::user_exists(ledger.conn(), id)? {
                return Err(PassbookError::UnknownUser(id));
            }
            vec![id]
        }
        None => db::list_user_ids(ledger.conn())?,
    };

    for user_id in user_ids {
        let run = snapshot_all_accounts(
            &ledger,
            user_id,
            value_date,
            SnapshotSource::EodJob,
            price_source.as_ref().map(|s| s as &dyn PriceSource),
            delay,
        )?;
        if let Some(prices) = &run.prices {
            println!(
                "User {user_id}: refreshed {} holding prices ({} failed)",
                prices.updated, prices.failed
            );
        }
        println!(
            "User {user_id}: {} snapshots captured for {value_date}, {} failed",
            run.created, run.failed
        );
    }
    Ok(())
}
