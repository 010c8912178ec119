use std::time::Duration;

use crate::db::Ledger;
use crate::error::Result;
use crate::prices::HttpPriceSource;
use crate::settings::{load_settings, Config};
use crate::snapshot::refresh_holding_prices;

pub fn refresh(user: Option<i64>, delay_ms: Option<u64>) -> Result<()> {
    let settings = load_settings();
    let config = Config::from_settings(&settings);
    let ledger = Ledger::open(&config)?;
    let user_id = super::resolve_user(&ledger, user)?;

    let delay = delay_ms.map(Duration::from_millis).unwrap_or(config.price.delay);
    let source = HttpPriceSource::new(&config.price)?;
    let outcome = refresh_holding_prices(&ledger, user_id, &source, delay)?;

    println!(
        "Refreshed {} holding prices ({} failed)",
        outcome.updated, outcome.failed
    );
    Ok(())
}
