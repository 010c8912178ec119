//! Market data. Quotes are best-effort: a failed fetch costs a log line and
//! a stale price, never an error.

use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{PassbookError, Result};
use crate::settings::PriceConfig;

/// Anything that can quote a symbol. The snapshot engine only sees this
/// trait, so tests swap in a canned source.
pub trait PriceSource {
    fn fetch_price(&self, symbol: &str) -> Option<Decimal>;
}

// ---------------------------------------------------------------------------
// OCC option symbols
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionRight::Call => "CALL",
            OptionRight::Put => "PUT",
        }
    }
}

/// Decoded OCC option symbol, e.g. `SPY240517P00500000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSymbol {
    pub underlying: String,
    pub expiration: NaiveDate,
    pub right: OptionRight,
    pub strike: Decimal,
}

/// OCC symbols are at least 15 chars with the right (C/P) nine from the end:
/// underlying + YYMMDD + C/P + strike in thousandths padded to 8 digits.
pub fn is_option_symbol(symbol: &str) -> bool {
    let bytes = symbol.as_bytes();
    bytes.len() >= 15 && matches!(bytes[bytes.len() - 9], b'C' | b'P')
}

pub fn parse_option_symbol(symbol: &str) -> Option<OptionSymbol> {
    if !symbol.is_ascii() || !is_option_symbol(symbol) {
        return None;
    }
    let split = symbol.len() - 15;
    let underlying = &symbol[..split];
    if underlying.is_empty() {
        return None;
    }
    let expiration = NaiveDate::parse_from_str(&symbol[split..split + 6], "%y%m%d").ok()?;
    let right = match symbol.as_bytes()[symbol.len() - 9] {
        b'C' => OptionRight::Call,
        _ => OptionRight::Put,
    };
    let thousandths: i64 = symbol[symbol.len() - 8..].parse().ok()?;
    Some(OptionSymbol {
        underlying: underlying.to_string(),
        expiration,
        right,
        strike: Decimal::new(thousandths, 3),
    })
}

// ---------------------------------------------------------------------------
// HTTP source
// ---------------------------------------------------------------------------

/// Quotes symbols against a Yahoo-style chart endpoint
/// (`GET {base}/{symbol}?interval=1d&range=5d`).
pub struct HttpPriceSource {
    client: reqwest::blocking::Client,
    base_url: String,
    retries: u32,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

impl HttpPriceSource {
    pub fn new(config: &PriceConfig) -> Result<HttpPriceSource> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("passbook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PassbookError::Http(e.to_string()))?;
        Ok(HttpPriceSource {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retries: config.retries.max(1),
        })
    }

    fn quote(&self, symbol: &str) -> std::result::Result<Option<Decimal>, reqwest::Error> {
        let url = format!("{}/{symbol}", self.base_url);
        let response: ChartResponse = self
            .client
            .get(&url)
            .query(&[("interval", "1d"), ("range", "5d")])
            .send()?
            .error_for_status()?
            .json()?;

        let price = response
            .chart
            .result
            .and_then(|mut results| results.pop())
            .and_then(|r| r.meta.regular_market_price);
        let Some(price) = price else {
            log::warn!("no price data available for {symbol}");
            return Ok(None);
        };
        if price <= 0.0 {
            log::warn!("invalid price for {symbol}: {price}");
            return Ok(None);
        }
        Ok(Decimal::from_f64(price).map(|d| d.round_dp(4)))
    }
}

impl PriceSource for HttpPriceSource {
    fn fetch_price(&self, symbol: &str) -> Option<Decimal> {
        if let Some(option) = parse_option_symbol(symbol) {
            log::debug!(
                "quoting option {symbol}: {} {} ${} exp {}",
                option.underlying,
                option.right.as_str(),
                option.strike,
                option.expiration,
            );
        }
        for attempt in 1..=self.retries {
            match self.quote(symbol) {
                Ok(price) => return price,
                Err(e) => {
                    log::warn!("error fetching price for {symbol} (attempt {attempt}/{}): {e}", self.retries);
                    if attempt < self.retries {
                        std::thread::sleep(Duration::from_secs(1));
                    }
                }
            }
        }
        None
    }
}
