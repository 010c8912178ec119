use std::collections::HashMap;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::error::{PassbookError, Result};
use crate::models::SecurityType;

mod amex;
mod ameriprise;
mod schwab;
mod synchrony;
mod tdameritrade;
mod tdbank;

// ---------------------------------------------------------------------------
// Parsed data model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTransaction {
    pub transaction_date: NaiveDate,
    pub description: String,
    /// Unsigned magnitude; `type_label` carries the direction.
    pub amount: Decimal,
    pub type_label: String,
    pub is_duplicate: bool,
}

impl ParsedTransaction {
    pub fn new(
        transaction_date: NaiveDate,
        type_label: &str,
        amount: Decimal,
        description: String,
    ) -> ParsedTransaction {
        ParsedTransaction {
            transaction_date,
            description,
            amount,
            type_label: type_label.to_string(),
            is_duplicate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInvestmentTransaction {
    pub transaction_date: NaiveDate,
    pub type_label: String,
    pub symbol: Option<String>,
    /// Symbol shaped for quote lookups: bare ticker for stocks, OCC code for
    /// options.
    pub api_symbol: Option<String>,
    pub description: String,
    pub quantity: Option<Decimal>,
    pub price_per_share: Option<Decimal>,
    pub total_amount: Decimal,
    pub security_type: Option<SecurityType>,
    pub is_duplicate: bool,
}

/// Account hint scraped off a statement. Only ever used to match an existing
/// account by its trailing digits, never to create one.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAccountInfo {
    pub account_number_last4: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedData {
    pub account_info: Option<ParsedAccountInfo>,
    pub transactions: Vec<ParsedTransaction>,
    pub investment_transactions: Vec<ParsedInvestmentTransaction>,
}

// ---------------------------------------------------------------------------
// Institutions, enum dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Institution {
    Amex,
    TdBank,
    AmznSynchrony,
    Schwab,
    TdAmeritrade,
    Ameriprise,
}

impl Institution {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Amex => "amex",
            Self::TdBank => "tdbank",
            Self::AmznSynchrony => "amzn-synchrony",
            Self::Schwab => "schwab",
            Self::TdAmeritrade => "tdameritrade",
            Self::Ameriprise => "ameriprise",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Amex => "American Express",
            Self::TdBank => "TD Bank",
            Self::AmznSynchrony => "Amazon Store Card (Synchrony)",
            Self::Schwab => "Charles Schwab",
            Self::TdAmeritrade => "TD Ameritrade",
            Self::Ameriprise => "Ameriprise",
        }
    }

    /// Parse raw statement bytes into canonical records. There is no
    /// cross-institution auto-detection: the caller names the institution.
    pub fn parse(&self, bytes: &[u8], is_csv: bool) -> Result<ParsedData> {
        let mut data = match (self, is_csv) {
            (Self::Amex, true) => amex::parse_csv(bytes)?,
            (Self::Amex, false) => amex::parse_statement(&extract_pdf_text(bytes)?),
            (Self::TdBank, true) => tdbank::parse_csv(bytes)?,
            (Self::TdBank, false) => tdbank::parse_statement(&extract_pdf_text(bytes)?),
            (Self::AmznSynchrony, true) => synchrony::parse_csv(bytes)?,
            (Self::AmznSynchrony, false) => synchrony::parse_statement(&extract_pdf_text(bytes)?),
            (Self::Schwab, true) => schwab::parse_csv(bytes)?,
            (Self::Schwab, false) => schwab::parse_statement(&extract_pdf_text(bytes)?),
            (Self::TdAmeritrade, true) => {
                log::warn!("no CSV layout is known for TD Ameritrade; nothing parsed");
                ParsedData::default()
            }
            (Self::TdAmeritrade, false) => {
                tdameritrade::parse_statement(&extract_pdf_text(bytes)?)
            }
            (Self::Ameriprise, true) => ameriprise::parse_csv(bytes)?,
            (Self::Ameriprise, false) => {
                log::warn!("Ameriprise PDF statements are not supported; nothing parsed");
                ParsedData::default()
            }
        };
        mark_duplicate_transactions(&mut data.transactions);
        mark_duplicate_investment_transactions(&mut data.investment_transactions);
        Ok(data)
    }
}

pub const ALL_INSTITUTIONS: &[Institution] = &[
    Institution::Amex,
    Institution::TdBank,
    Institution::AmznSynchrony,
    Institution::Schwab,
    Institution::TdAmeritrade,
    Institution::Ameriprise,
];

pub fn get_by_key(key: &str) -> Option<Institution> {
    ALL_INSTITUTIONS.iter().find(|i| i.key() == key).copied()
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| PassbookError::Pdf(e.to_string()))
}

// ---------------------------------------------------------------------------
// Section tracking
// ---------------------------------------------------------------------------

/// Statement section a PDF scan is currently inside. Each parser defines its
/// own header and terminator vocabulary and drives the transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Payments,
    Credits,
    Purchases,
    Fees,
    Interest,
    Activity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectionState {
    #[default]
    Idle,
    InSection(SectionKind),
}

impl SectionState {
    pub fn current(&self) -> Option<SectionKind> {
        match self {
            SectionState::Idle => None,
            SectionState::InSection(kind) => Some(*kind),
        }
    }
}

impl SectionKind {
    /// The free-text type label emitted for rows found in this section.
    pub(crate) fn type_label(&self) -> &'static str {
        match self {
            SectionKind::Payments => "Payment",
            SectionKind::Credits => "Credit",
            SectionKind::Purchases => "Purchase",
            SectionKind::Fees => "Fee",
            SectionKind::Interest => "Interest",
            SectionKind::Activity => "Activity",
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Strip currency punctuation and parse a decimal amount. Parenthesized
/// values are negative. Returns None on anything unparseable; callers log
/// and skip the line.
pub(crate) fn clean_amount(raw: &str) -> Option<Decimal> {
    let s = raw
        .replace(',', "")
        .replace('"', "")
        .replace('$', "")
        .replace('\u{29EB}', ""); // Amex foreign-transaction marker
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return Decimal::from_str(inner.trim()).ok().map(|d| -d);
    }
    Decimal::from_str(s).ok()
}

/// Trailing `n` characters of a scraped account number field.
pub(crate) fn last_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    chars[chars.len().saturating_sub(n)..].iter().collect()
}

/// True when the line opens with a `NN/` month prefix, the row marker shared
/// by every PDF statement layout here.
pub(crate) fn starts_with_month(line: &str) -> bool {
    let Some(prefix) = line.get(..3) else {
        return false;
    };
    if prefix.as_bytes()[2] != b'/' {
        return false;
    }
    matches!(prefix[..2].parse::<u32>(), Ok(m) if (1..=12).contains(&m))
}

/// Resolve a bare `MM/DD` through the statement-period year map.
pub(crate) fn resolve_md(raw: &str, years: &PeriodYearMap) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.trim().split('/').collect();
    if parts.len() != 2 {
        return None;
    }
    let m: u32 = parts[0].parse().ok()?;
    let d: u32 = parts[1].parse().ok()?;
    years.resolve(m, d)
}

/// Parse `MM/DD/YYYY` or `MM/DD/YY` (two-digit years land in 20xx).
pub(crate) fn parse_mdy(raw: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.trim().split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let m: u32 = parts[0].parse().ok()?;
    let d: u32 = parts[1].parse().ok()?;
    let mut y: i32 = parts[2].parse().ok()?;
    if parts[2].len() == 2 {
        y += 2000;
    }
    NaiveDate::from_ymd_opt(y, m, d)
}

/// Parse a written-out date like "November 4, 2023".
pub(crate) fn parse_month_name_date(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.trim().split_whitespace();
    let month = month_number(parts.next()?)?;
    let day: u32 = parts.next()?.trim_end_matches(',').parse().ok()?;
    let year: i32 = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    match name.get(..3)?.to_lowercase().as_str() {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

/// Month-to-year lookup for statements whose transaction rows only carry
/// `MM/DD`. Built from the statement period so a December-to-January
/// statement resolves each month into the right year.
#[derive(Debug, Clone, Default)]
pub(crate) struct PeriodYearMap {
    years: HashMap<u32, i32>,
    fallback: Option<i32>,
}

impl PeriodYearMap {
    pub fn new() -> PeriodYearMap {
        PeriodYearMap::default()
    }

    pub fn from_period(start: NaiveDate, end: NaiveDate) -> PeriodYearMap {
        let mut map = PeriodYearMap {
            years: HashMap::new(),
            fallback: Some(start.year()),
        };
        let (mut y, mut m) = (start.year(), start.month());
        for _ in 0..12 {
            map.insert(m, y);
            if (y, m) == (end.year(), end.month()) {
                break;
            }
            m += 1;
            if m > 12 {
                m = 1;
                y += 1;
            }
        }
        map
    }

    /// Every month resolves to the one statement year.
    pub fn from_year(year: i32) -> PeriodYearMap {
        PeriodYearMap {
            years: HashMap::new(),
            fallback: Some(year),
        }
    }

    pub fn insert(&mut self, month: u32, year: i32) {
        self.years.insert(month, year);
        if self.fallback.is_none() {
            self.fallback = Some(year);
        }
    }

    pub fn resolve(&self, month: u32, day: u32) -> Option<NaiveDate> {
        let year = self.years.get(&month).copied().or(self.fallback)?;
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

// ---------------------------------------------------------------------------
// Intra-batch duplicate marking
// ---------------------------------------------------------------------------
//
// Statements legitimately repeat rows (two identical coffees on one day).
// Left as-is these would collide on the content fingerprint downstream, so
// rows after the first in a group get a positional suffix on the description
// and a flag for reviewers.

pub(crate) fn mark_duplicate_transactions(rows: &mut [ParsedTransaction]) {
    let mut groups: HashMap<(NaiveDate, Decimal, String), Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        groups
            .entry((row.transaction_date, row.amount, row.description.clone()))
            .or_default()
            .push(i);
    }
    for indexes in groups.values() {
        for (pos, &i) in indexes.iter().enumerate().skip(1) {
            rows[i].description = format!("{} ({})", rows[i].description, pos + 1);
            rows[i].is_duplicate = true;
        }
    }
}

pub(crate) fn mark_duplicate_investment_transactions(rows: &mut [ParsedInvestmentTransaction]) {
    let mut groups: HashMap<(NaiveDate, String, String, String), Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        let key = (
            row.transaction_date,
            row.type_label.clone(),
            row.symbol.clone().unwrap_or_default(),
            row.description.clone(),
        );
        groups.entry(key).or_default().push(i);
    }
    for indexes in groups.values() {
        for (pos, &i) in indexes.iter().enumerate().skip(1) {
            rows[i].description = format!("{} ({})", rows[i].description, pos + 1);
            rows[i].is_duplicate = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_clean_amount() {
        assert_eq!(clean_amount("1,234.56"), Some(dec("1234.56")));
        assert_eq!(clean_amount("\"500.00\""), Some(dec("500.00")));
        assert_eq!(clean_amount("  -42.50  "), Some(dec("-42.50")));
        assert_eq!(clean_amount("$75.00\u{29EB}"), Some(dec("75.00")));
        assert_eq!(clean_amount("not_a_number"), None);
        assert_eq!(clean_amount(""), None);
    }

    #[test]
    fn test_clean_amount_parenthesized_negatives() {
        assert_eq!(clean_amount("(500.00)"), Some(dec("-500.00")));
        assert_eq!(clean_amount("($1,234.56)"), Some(dec("-1234.56")));
    }

    #[test]
    fn test_starts_with_month() {
        assert!(starts_with_month("01/15 COFFEE 4.50"));
        assert!(starts_with_month("12/31"));
        assert!(!starts_with_month("13/01 NOT A MONTH"));
        assert!(!starts_with_month("00/15"));
        assert!(!starts_with_month("Total"));
        assert!(!starts_with_month(""));
    }

    #[test]
    fn test_resolve_md() {
        let map = PeriodYearMap::from_period(date(2023, 12, 5), date(2024, 1, 4));
        assert_eq!(resolve_md("12/20", &map), Some(date(2023, 12, 20)));
        assert_eq!(resolve_md("01/02", &map), Some(date(2024, 1, 2)));
        assert_eq!(resolve_md("01/02/24", &map), None);
    }

    #[test]
    fn test_parse_mdy() {
        assert_eq!(parse_mdy("01/15/2025"), Some(date(2025, 1, 15)));
        assert_eq!(parse_mdy("11/20/23"), Some(date(2023, 11, 20)));
        assert_eq!(parse_mdy("02/30/2025"), None);
        assert_eq!(parse_mdy("2025-01-15"), None);
    }

    #[test]
    fn test_parse_month_name_date() {
        assert_eq!(parse_month_name_date("November 4, 2023"), Some(date(2023, 11, 4)));
        assert_eq!(parse_month_name_date("Jan 31, 2024"), Some(date(2024, 1, 31)));
        assert_eq!(parse_month_name_date("Smarch 1, 2024"), None);
    }

    #[test]
    fn test_period_year_map_single_month() {
        let map = PeriodYearMap::from_period(date(2024, 3, 5), date(2024, 4, 4));
        assert_eq!(map.resolve(3, 20), Some(date(2024, 3, 20)));
        assert_eq!(map.resolve(4, 1), Some(date(2024, 4, 1)));
    }

    #[test]
    fn test_period_year_map_crosses_year_boundary() {
        let map = PeriodYearMap::from_period(date(2023, 12, 15), date(2024, 1, 14));
        assert_eq!(map.resolve(12, 28), Some(date(2023, 12, 28)));
        assert_eq!(map.resolve(1, 2), Some(date(2024, 1, 2)));
    }

    #[test]
    fn test_period_year_map_fallback_year() {
        let map = PeriodYearMap::from_year(2024);
        assert_eq!(map.resolve(7, 4), Some(date(2024, 7, 4)));
        assert_eq!(PeriodYearMap::new().resolve(7, 4), None);
    }

    #[test]
    fn test_mark_duplicates_suffixes_later_rows() {
        let mut rows = vec![
            ParsedTransaction::new(date(2024, 1, 5), "Purchase", dec("4.50"), "COFFEE".into()),
            ParsedTransaction::new(date(2024, 1, 5), "Purchase", dec("4.50"), "COFFEE".into()),
            ParsedTransaction::new(date(2024, 1, 5), "Purchase", dec("4.50"), "COFFEE".into()),
        ];
        mark_duplicate_transactions(&mut rows);
        assert_eq!(rows[0].description, "COFFEE");
        assert!(!rows[0].is_duplicate);
        assert_eq!(rows[1].description, "COFFEE (2)");
        assert!(rows[1].is_duplicate);
        assert_eq!(rows[2].description, "COFFEE (3)");
        assert!(rows[2].is_duplicate);
    }

    #[test]
    fn test_mark_duplicates_leaves_distinct_rows_alone() {
        let mut rows = vec![
            ParsedTransaction::new(date(2024, 1, 5), "Purchase", dec("4.50"), "COFFEE".into()),
            ParsedTransaction::new(date(2024, 1, 5), "Purchase", dec("9.00"), "COFFEE".into()),
        ];
        mark_duplicate_transactions(&mut rows);
        assert!(rows.iter().all(|r| !r.is_duplicate));
    }

    #[test]
    fn test_mark_investment_duplicates_groups_by_symbol() {
        let buy = |symbol: Option<&str>| ParsedInvestmentTransaction {
            transaction_date: date(2024, 5, 17),
            type_label: "BUY".into(),
            symbol: symbol.map(String::from),
            api_symbol: None,
            description: "MARKET ORDER".into(),
            quantity: Some(dec("10")),
            price_per_share: Some(dec("100")),
            total_amount: dec("-1000"),
            security_type: Some(SecurityType::Stock),
            is_duplicate: false,
        };
        let mut rows = vec![buy(Some("VTI")), buy(Some("VTI")), buy(Some("BND"))];
        mark_duplicate_investment_transactions(&mut rows);
        assert!(!rows[0].is_duplicate);
        assert_eq!(rows[1].description, "MARKET ORDER (2)");
        assert!(rows[1].is_duplicate);
        assert!(!rows[2].is_duplicate);
    }

    #[test]
    fn test_get_by_key() {
        assert_eq!(get_by_key("amex"), Some(Institution::Amex));
        assert_eq!(get_by_key("amzn-synchrony"), Some(Institution::AmznSynchrony));
        assert_eq!(get_by_key("fidelity"), None);
        for inst in ALL_INSTITUTIONS {
            assert_eq!(get_by_key(inst.key()), Some(*inst));
        }
    }
}
