//! Amazon Store Card (Synchrony Bank) statements. Sections are announced by
//! total lines ("Payments -$…"), rows carry a reference number column that
//! gets dropped, and long descriptions wrap onto following lines.

use super::{
    clean_amount, last_chars, parse_mdy, parse_month_name_date, resolve_md, starts_with_month,
    ParsedAccountInfo, ParsedData, ParsedTransaction, PeriodYearMap, SectionKind, SectionState,
};
use crate::error::Result;

const KEYWORDS: &[(&str, SectionKind)] = &[
    ("Payments -$", SectionKind::Payments),
    ("Other Credits -$", SectionKind::Credits),
    ("Purchases and Other Debits", SectionKind::Purchases),
    ("Total Fees Charged This Period", SectionKind::Fees),
    ("Total Interest Charged This Period", SectionKind::Interest),
];

// Page-break artifacts that interleave with wrapped descriptions.
const SKIP_LINES: &[&str] = &[
    "(Continued on next page)",
    "Transaction Detail (Continued)",
    "Date Reference # Description Amount",
];

const INTEREST_END: &str = "Year-to-Date Fees and Interest";

fn section_for(line: &str) -> Option<SectionKind> {
    KEYWORDS
        .iter()
        .find(|(prefix, _)| line.starts_with(prefix))
        .map(|(_, kind)| *kind)
}

pub(crate) fn parse_statement(text: &str) -> ParsedData {
    let lines: Vec<&str> = text.lines().collect();

    let mut account_number: Option<String> = None;
    let mut years = PeriodYearMap::new();
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("Account Number") && account_number.is_none() {
            let digits = last_chars(line.trim_end(), 4);
            if digits.chars().all(|c| c.is_ascii_digit()) && !digits.is_empty() {
                account_number = Some(digits);
            }
        } else if line.starts_with("New Balance as of") {
            // The period sits two lines below: "<Month D, YYYY> to <Month D, YYYY>".
            if let Some(period) = lines.get(i + 2) {
                if let Some((left, right)) = period.split_once(" to ") {
                    if let (Some(start), Some(end)) =
                        (parse_month_name_date(left), parse_month_name_date(right))
                    {
                        years = PeriodYearMap::from_period(start, end);
                    }
                }
            }
        }
    }

    let mut transactions = Vec::new();
    let mut state = SectionState::default();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if let Some(kind) = section_for(line) {
            state = SectionState::InSection(kind);
            i += 1;
            continue;
        }
        let Some(kind) = state.current() else {
            i += 1;
            continue;
        };
        if kind == SectionKind::Interest && line.contains(INTEREST_END) {
            state = SectionState::Idle;
            i += 1;
            continue;
        }
        if !starts_with_month(line) {
            i += 1;
            continue;
        }

        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            log::warn!("skipping short Synchrony row: {line}");
            i += 1;
            continue;
        }
        let date_raw = tokens.remove(0);
        let amount_raw = tokens.pop().unwrap_or("");
        tokens.remove(0); // reference number column
        let Some(date) = resolve_md(date_raw, &years) else {
            log::warn!("skipping Synchrony row with unresolvable date: {line}");
            i += 1;
            continue;
        };
        let Some(amount) = clean_amount(amount_raw) else {
            log::warn!("skipping Synchrony row with bad amount: {line}");
            i += 1;
            continue;
        };
        let mut description = tokens.join(" ");

        // Wrapped description lines run until the next dated row, section
        // header, or the year-to-date terminator.
        while let Some(next) = lines.get(i + 1) {
            if starts_with_month(next) || section_for(next).is_some() {
                break;
            }
            if kind == SectionKind::Interest && next.contains(INTEREST_END) {
                break;
            }
            i += 1;
            let next = next.trim();
            if next.is_empty() || SKIP_LINES.iter().any(|p| next.starts_with(p)) {
                continue;
            }
            description.push(' ');
            description.push_str(next);
        }

        transactions.push(ParsedTransaction::new(
            date,
            kind.type_label(),
            amount.abs(),
            description,
        ));
        i += 1;
    }

    ParsedData {
        account_info: account_number.map(|n| ParsedAccountInfo {
            account_number_last4: n,
        }),
        transactions,
        investment_transactions: Vec::new(),
    }
}

/// Synchrony CSV export: date col 0, amount col 3, description col 4.
/// Negative amounts are labeled the way the statement does ("Credit/Payment").
pub(crate) fn parse_csv(bytes: &[u8]) -> Result<ParsedData> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let mut transactions = Vec::new();
    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if record.len() < 5 {
            continue;
        }
        let Some(date) = parse_mdy(&record[0]) else {
            log::warn!("skipping Synchrony CSV row with bad date: {:?}", &record[0]);
            continue;
        };
        let Some(amount) = clean_amount(&record[3]) else {
            log::warn!("skipping Synchrony CSV row with bad amount: {:?}", &record[3]);
            continue;
        };
        let description = record[4].trim().to_string();
        let type_label = if amount < rust_decimal::Decimal::ZERO {
            "Credit/Payment"
        } else {
            "Purchase"
        };
        transactions.push(ParsedTransaction::new(date, type_label, amount.abs(), description));
    }

    Ok(ParsedData {
        account_info: None,
        transactions,
        investment_transactions: Vec::new(),
    })
}
