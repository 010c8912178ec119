//! American Express credit card statements. Two PDF layouts exist: the
//! classic print layout and the "Screen Reader Optimized" layout mailed to
//! accessibility-enrolled accounts. Both mark activity sections with header
//! phrases and list one transaction per line inside a section.

use chrono::{Datelike, NaiveDate};

use super::{
    clean_amount, parse_mdy, resolve_md, starts_with_month, ParsedAccountInfo, ParsedData,
    ParsedTransaction, PeriodYearMap, SectionKind, SectionState,
};
use crate::error::Result;

struct Keywords {
    payments: &'static str,
    credits: &'static str,
    purchases: &'static str,
    fees: &'static str,
    interest: &'static str,
}

const SCREEN_READER_KEYWORDS: Keywords = Keywords {
    payments: "Payments Details",
    credits: "Credits Details",
    purchases: "New Charges Details",
    fees: "Fees",
    interest: "Interest Charged",
};

const CLASSIC_KEYWORDS: Keywords = Keywords {
    payments: "Payments t Amount",
    credits: "Credits Amount",
    purchases: "Detail - denotes Pay Over Time and/or Cash Advance activity",
    fees: "Fees - denotes Pay Over Time and/or Cash Advance activity",
    interest: "Interest Charged",
};

impl Keywords {
    fn section_for(&self, line: &str) -> Option<SectionKind> {
        if line.starts_with(self.payments) {
            Some(SectionKind::Payments)
        } else if line.starts_with(self.credits) {
            Some(SectionKind::Credits)
        } else if line.starts_with(self.purchases) {
            Some(SectionKind::Purchases)
        } else if line.starts_with(self.fees) {
            Some(SectionKind::Fees)
        } else if line.starts_with(self.interest) {
            Some(SectionKind::Interest)
        } else {
            None
        }
    }
}

pub(crate) fn parse_statement(text: &str) -> ParsedData {
    let lines: Vec<&str> = text.lines().collect();
    let screen_reader = lines
        .get(1)
        .map_or(false, |l| l.contains("Screen Reader Optimized"));
    let keywords = if screen_reader {
        &SCREEN_READER_KEYWORDS
    } else {
        &CLASSIC_KEYWORDS
    };

    let account_info = find_account_info(&lines, screen_reader);
    let years = build_year_map(&lines);

    let mut transactions = Vec::new();
    let mut state = SectionState::default();
    for line in &lines {
        if let Some(kind) = keywords.section_for(line) {
            state = SectionState::InSection(kind);
            continue;
        }
        let Some(kind) = state.current() else { continue };
        if kind == SectionKind::Interest
            && (line.contains("Interest Charge Calculation")
                || line.contains("Year-to-Date Fees and Interest"))
        {
            state = SectionState::Idle;
            continue;
        }
        if !starts_with_month(line) {
            continue;
        }
        match parse_row(line, kind, &years) {
            Some(tx) => transactions.push(tx),
            None => log::warn!("skipping unparseable Amex row: {line}"),
        }
    }

    ParsedData {
        account_info,
        transactions,
        investment_transactions: Vec::new(),
    }
}

fn parse_row(line: &str, kind: SectionKind, years: &PeriodYearMap) -> Option<ParsedTransaction> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    // Payment rows mark the date with a trailing asterisk.
    let date_raw = tokens.remove(0).replace('*', "");
    let amount = clean_amount(tokens.pop()?)?.abs();
    let date = resolve_date(&date_raw, years)?;
    Some(ParsedTransaction::new(
        date,
        kind.type_label(),
        amount,
        tokens.join(" "),
    ))
}

fn resolve_date(raw: &str, years: &PeriodYearMap) -> Option<NaiveDate> {
    parse_mdy(raw).or_else(|| resolve_md(raw, years))
}

/// Statement period inferred from the closing date: Amex statements span the
/// closing month and the month before it.
fn build_year_map(lines: &[&str]) -> PeriodYearMap {
    for line in lines {
        if !line.contains("Closing Date") {
            continue;
        }
        for token in line.split_whitespace() {
            let Some(closing) = parse_mdy(token) else { continue };
            let (py, pm) = if closing.month() == 1 {
                (closing.year() - 1, 12)
            } else {
                (closing.year(), closing.month() - 1)
            };
            if let Some(start) = NaiveDate::from_ymd_opt(py, pm, 1) {
                return PeriodYearMap::from_period(start, closing);
            }
        }
    }
    PeriodYearMap::new()
}

fn find_account_info(lines: &[&str], screen_reader: bool) -> Option<ParsedAccountInfo> {
    if screen_reader {
        // "Prepared for" block: name on the next line, masked account number
        // ("XXXX-XXXXXX-21005") on the one after.
        for (i, line) in lines.iter().enumerate() {
            if !line.contains("Prepared for") {
                continue;
            }
            let number = lines.get(i + 2)?.rsplit('-').next()?.trim();
            if number.is_empty() {
                return None;
            }
            return Some(ParsedAccountInfo {
                account_number_last4: number.to_string(),
            });
        }
    } else {
        for line in lines {
            if !line.contains("Account Ending") {
                continue;
            }
            let digits: String = line.split('-').nth(1)?.chars().take(5).collect();
            if digits.is_empty() {
                return None;
            }
            return Some(ParsedAccountInfo {
                account_number_last4: digits,
            });
        }
    }
    None
}

pub(crate) fn parse_csv(bytes: &[u8]) -> Result<ParsedData> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    // Credits surface ahead of charges, mirroring the statement order.
    let mut credits = Vec::new();
    let mut purchases = Vec::new();
    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if record.len() < 3 {
            continue;
        }
        let Some(date) = parse_mdy(&record[0]) else {
            log::warn!("skipping Amex CSV row with bad date: {:?}", &record[0]);
            continue;
        };
        let Some(amount) = clean_amount(&record[record.len() - 1]) else {
            log::warn!("skipping Amex CSV row with bad amount");
            continue;
        };
        let description = record[1].trim().to_string();
        if amount < rust_decimal::Decimal::ZERO {
            credits.push(ParsedTransaction::new(date, "Credit", -amount, description));
        } else {
            purchases.push(ParsedTransaction::new(date, "Purchase", amount, description));
        }
    }

    credits.extend(purchases);
    Ok(ParsedData {
        account_info: None,
        transactions: credits,
        investment_transactions: Vec::new(),
    })
}
