//! Charles Schwab brokerage statements. The "Transaction Details" section
//! lists one activity row per line: an optional `MM/DD` date (rows without
//! one belong to the last seen date), a category word, the symbol cell for
//! trades, a free-text description, and a numeric tail (quantity, price,
//! charges, amount, gain/loss with the empty columns simply absent).

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::{
    clean_amount, parse_mdy, resolve_md, ParsedAccountInfo, ParsedData,
    ParsedInvestmentTransaction, PeriodYearMap, SectionKind, SectionState,
};
use crate::error::Result;
use crate::models::SecurityType;

const CATEGORY_WORDS: &[&str] = &[
    "Purchase",
    "Sale",
    "Buy",
    "Sell",
    "Interest",
    "Dividend",
    "Fee",
    "Deposit",
    "Withdrawal",
    "Transfer",
];

fn account_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{4})\b").expect("account regex"))
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("year regex"))
}

fn md_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}/\d{2}$").expect("month-day regex"))
}

fn dated_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}/\d{2}\s").expect("dated row regex"))
}

fn commission_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]\s+Commission").expect("commission regex"))
}

fn page_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+of\d+$").expect("page marker regex"))
}

fn ticker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{1,5}$").expect("ticker regex"))
}

fn expiry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"EXP\s*(\d{2}/\d{2}/\d{2})").expect("expiry regex"))
}

fn strike_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\d+(?:\.\d{2})?)").expect("strike regex"))
}

fn csv_account_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"XXXX-(\d{4})").expect("csv account regex"))
}

/// Collapse Schwab's category vocabulary onto the canonical labels.
fn normalize_type(category: &str) -> &'static str {
    let c = category.to_lowercase();
    if c.contains("purchase") || c.contains("buy") {
        "BUY"
    } else if c.contains("sale") || c.contains("sell") {
        "SELL"
    } else if c.contains("dividend") {
        "DIVIDEND"
    } else if c.contains("interest") {
        "INTEREST"
    } else if c.contains("fee") {
        "FEE"
    } else if c.contains("deposit") || c.contains("withdrawal") || c.contains("transfer") {
        "TRANSFER"
    } else {
        "OTHER"
    }
}

/// Quote-service symbol: the bare ticker for stocks, the OCC code
/// (ticker + YYMMDD + C/P + strike times 1000, zero-padded to 8 digits)
/// for options. `PUT SPY $500 EXP 05/17/24` becomes `SPY240517P00500000`.
fn format_api_symbol(
    symbol: &str,
    description: &str,
    security_type: Option<SecurityType>,
) -> Option<String> {
    if security_type != Some(SecurityType::Option) {
        return Some(symbol.to_string());
    }
    let right = if description.to_uppercase().starts_with("CALL") {
        "C"
    } else {
        "P"
    };
    let expiry_raw = expiry_re().captures(description)?;
    let expiry = NaiveDate::parse_from_str(&expiry_raw[1], "%m/%d/%y").ok()?;
    let strike_raw = strike_re().captures(description)?;
    let strike: Decimal = strike_raw[1].parse().ok()?;
    let thousandths = (strike * Decimal::from(1000)).to_i64()?;
    Some(format!(
        "{symbol}{}{right}{thousandths:08}",
        expiry.format("%y%m%d")
    ))
}

fn is_section_end(line: &str) -> bool {
    let squeezed: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    page_marker_re().is_match(&squeezed)
        || squeezed.contains("TotalTransactions")
        || line.starts_with("Total Transactions")
}

fn is_transaction_line(line: &str) -> bool {
    if line.starts_with("Commission") || commission_re().is_match(line) {
        return false;
    }
    dated_row_re().is_match(line) || CATEGORY_WORDS.iter().any(|w| line.starts_with(w))
}

#[derive(Debug, Default)]
struct SkipCounters {
    no_date: u32,
    bad_date: u32,
    unknown_category: u32,
    no_amount: u32,
}

impl SkipCounters {
    fn total(&self) -> u32 {
        self.no_date + self.bad_date + self.unknown_category + self.no_amount
    }
}

pub(crate) fn parse_statement(text: &str) -> ParsedData {
    let lines: Vec<&str> = text.lines().collect();

    let mut account_info: Option<ParsedAccountInfo> = None;
    let mut year: Option<i32> = None;
    for line in &lines {
        if account_info.is_none() {
            if let Some(caps) = account_re().captures(line) {
                account_info = Some(ParsedAccountInfo {
                    account_number_last4: caps[2].to_string(),
                });
            }
        }
        if year.is_none() {
            if let Some(caps) = year_re().captures(line) {
                year = caps[1].parse().ok();
            }
        }
        if account_info.is_some() && year.is_some() {
            break;
        }
    }
    let years = match year {
        Some(y) => PeriodYearMap::from_year(y),
        None => PeriodYearMap::new(),
    };

    let mut rows = Vec::new();
    let mut counters = SkipCounters::default();
    let mut state = SectionState::default();
    let mut current_date: Option<NaiveDate> = None;

    for line in &lines {
        let trimmed = line.trim();
        if state.current() != Some(SectionKind::Activity) {
            if trimmed == "Transaction Details" {
                state = SectionState::InSection(SectionKind::Activity);
            }
            continue;
        }
        if is_section_end(trimmed) {
            state = SectionState::Idle;
            continue;
        }
        if !is_transaction_line(trimmed) {
            continue;
        }
        if let Some(row) = parse_row(trimmed, &years, &mut current_date, &mut counters) {
            rows.push(row);
        }
    }

    log::info!(
        "Schwab statement: {} rows parsed, {} skipped (no date {}, bad date {}, unknown category {}, no amount {})",
        rows.len(),
        counters.total(),
        counters.no_date,
        counters.bad_date,
        counters.unknown_category,
        counters.no_amount,
    );

    ParsedData {
        account_info,
        transactions: Vec::new(),
        investment_transactions: rows,
    }
}

fn parse_row(
    line: &str,
    years: &PeriodYearMap,
    current_date: &mut Option<NaiveDate>,
    counters: &mut SkipCounters,
) -> Option<ParsedInvestmentTransaction> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();

    let transaction_date = if tokens.first().map_or(false, |t| md_token_re().is_match(t)) {
        let raw = tokens.remove(0);
        match resolve_md(raw, years) {
            Some(d) => {
                *current_date = Some(d);
                d
            }
            None => {
                counters.bad_date += 1;
                log::warn!("skipping Schwab row with unresolvable date: {line}");
                return None;
            }
        }
    } else {
        match *current_date {
            Some(d) => d,
            None => {
                counters.no_date += 1;
                log::warn!("skipping Schwab row before any dated row: {line}");
                return None;
            }
        }
    };

    if tokens.is_empty() || !CATEGORY_WORDS.contains(&tokens[0]) {
        counters.unknown_category += 1;
        return None;
    }
    let type_label = normalize_type(tokens.remove(0));

    // Numeric cells collapse onto the line's tail; pop them back off. Five
    // means the full quantity/price/charges/amount/gain-loss set.
    let mut tail: Vec<Decimal> = Vec::new();
    while tail.len() < 5 {
        let Some(last) = tokens.last() else { break };
        match clean_amount(last) {
            Some(d) => {
                tail.push(d);
                tokens.pop();
            }
            None => break,
        }
    }
    tail.reverse();
    let (quantity, price_per_share, total_amount) = match tail.len() {
        0 => {
            counters.no_amount += 1;
            log::warn!("skipping Schwab row with no amount: {line}");
            return None;
        }
        1 => (None, None, tail[0]),
        2 => (Some(tail[0]), None, tail[1]),
        3 => (Some(tail[0]), Some(tail[1]), tail[2]),
        _ => (Some(tail[0]), Some(tail[1]), tail[3]),
    };

    let mut symbol = None;
    if type_label == "BUY" || type_label == "SELL" {
        if let Some(first) = tokens.first() {
            if ticker_re().is_match(first) {
                symbol = Some((*first).to_string());
                tokens.remove(0);
            }
        }
    }
    let description = tokens.join(" ");

    let security_type = symbol.as_ref().map(|_| {
        let desc = description.to_uppercase();
        if (desc.starts_with("CALL") || desc.starts_with("PUT")) && desc.contains("EXP") {
            SecurityType::Option
        } else {
            SecurityType::Stock
        }
    });
    let api_symbol = symbol
        .as_deref()
        .and_then(|s| format_api_symbol(s, &description, security_type));

    Some(ParsedInvestmentTransaction {
        transaction_date,
        type_label: type_label.to_string(),
        symbol,
        api_symbol,
        description,
        quantity,
        price_per_share,
        total_amount,
        security_type,
        is_duplicate: false,
    })
}

/// Schwab CSV export. Metadata lines precede a `"Date","Action",…` header;
/// the line just above it carries the masked account number.
pub(crate) fn parse_csv(bytes: &[u8]) -> Result<ParsedData> {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().collect();

    let Some(header_index) = lines
        .iter()
        .position(|l| l.trim_start().starts_with("\"Date\",\"Action\""))
    else {
        log::warn!("no transaction header found in Schwab CSV; nothing parsed");
        return Ok(ParsedData::default());
    };

    let mut account_info = None;
    if header_index > 0 {
        if let Some(caps) = csv_account_re().captures(lines[header_index - 1]) {
            account_info = Some(ParsedAccountInfo {
                account_number_last4: caps[1].to_string(),
            });
        }
    }

    let body = lines[header_index + 1..].join("\n");
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if record.len() < 8 {
            continue;
        }
        let Some(transaction_date) = parse_mdy(&record[0]) else {
            log::warn!("skipping Schwab CSV row with bad date: {:?}", &record[0]);
            continue;
        };
        let type_label = normalize_type(record[1].trim());
        let Some(total_amount) = clean_amount(&record[7]) else {
            log::warn!("skipping Schwab CSV row with no amount: {record:?}");
            continue;
        };
        let description = record[3].trim().to_string();

        let mut symbol = None;
        if type_label == "BUY" || type_label == "SELL" {
            let cell = record[2].trim();
            if let Some(first) = cell.split_whitespace().next() {
                if ticker_re().is_match(first) {
                    symbol = Some(first.to_string());
                }
            }
        }
        let security_type = symbol.as_ref().map(|_| {
            let desc = description.to_uppercase();
            if (desc.starts_with("CALL") || desc.starts_with("PUT")) && desc.contains("EXP") {
                SecurityType::Option
            } else {
                SecurityType::Stock
            }
        });
        let api_symbol = symbol
            .as_deref()
            .and_then(|s| format_api_symbol(s, &description, security_type));

        rows.push(ParsedInvestmentTransaction {
            transaction_date,
            type_label: type_label.to_string(),
            symbol,
            api_symbol,
            description,
            quantity: clean_amount(&record[4]),
            price_per_share: clean_amount(&record[5]),
            total_amount,
            security_type,
            is_duplicate: false,
        });
    }

    Ok(ParsedData {
        account_info,
        transactions: Vec::new(),
        investment_transactions: rows,
    })
}
