//! TD Ameritrade brokerage statements (PDF only). The "Account Activity"
//! table carries trade date, settle date, an account column, the activity
//! word, the security description, then quantity, price, amount and the
//! running balance. Long security names wrap onto the following line.

use super::{
    clean_amount, last_chars, parse_mdy, starts_with_month, ParsedAccountInfo, ParsedData,
    ParsedInvestmentTransaction,
};

const ACTIVITY_WORDS: &[&str] = &["Buy", "Sell", "Funds", "Delivered", "Div/Int", "Journal"];

const END_KEYWORDS: &[&str] = &["Closing Balance", "Statement for Account #", "page "];

pub(crate) fn parse_statement(text: &str) -> ParsedData {
    let lines: Vec<&str> = text.lines().collect();

    let account_info = lines
        .iter()
        .find(|l| l.contains("Statement for Account #"))
        .map(|l| ParsedAccountInfo {
            account_number_last4: last_chars(l.trim_end(), 4),
        });

    let mut rows = Vec::new();
    let mut tracking = false;
    for i in 0..lines.len() {
        let line = lines[i];
        if line.trim() == "Account Activity" {
            tracking = true;
        } else if tracking && starts_with_month(line) {
            if let Some(row) = parse_row(line, lines.get(i + 1).copied()) {
                rows.push(row);
            }
        } else if END_KEYWORDS.iter().any(|k| line.contains(k)) {
            tracking = false;
        }
    }

    ParsedData {
        account_info,
        transactions: Vec::new(),
        investment_transactions: rows,
    }
}

fn parse_row(line: &str, next: Option<&str>) -> Option<ParsedInvestmentTransaction> {
    let cleaned = line.replace('$', "");
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() < 3 {
        log::warn!("skipping TD Ameritrade row with too few columns: {line}");
        return None;
    }

    let date_raw = tokens.remove(0);
    let Some(transaction_date) = parse_mdy(date_raw) else {
        log::warn!("skipping TD Ameritrade row with bad date: {line}");
        return None;
    };
    // Settle date and account columns.
    tokens.remove(0);
    tokens.remove(0);

    while !tokens.is_empty() && !ACTIVITY_WORDS.contains(&tokens[0]) {
        tokens.remove(0);
    }
    if tokens.is_empty() {
        log::warn!("skipping TD Ameritrade row with no activity word: {line}");
        return None;
    }
    let type_label = tokens.remove(0).to_string();

    if tokens.len() < 4 {
        log::warn!("skipping TD Ameritrade row with too few columns: {line}");
        return None;
    }
    // Running balance column.
    tokens.pop();
    let amount_raw = tokens.pop()?;
    let Some(total_amount) = clean_amount(amount_raw) else {
        log::warn!("skipping TD Ameritrade row with no amount: {line}");
        return None;
    };
    let price_per_share = clean_amount(tokens.pop()?);
    let quantity = clean_amount(&tokens.pop()?.replace('-', ""));

    let mut parts: Vec<String> = tokens.iter().map(|t| (*t).to_string()).collect();
    if let Some(next) = next {
        if !starts_with_month(next) && !END_KEYWORDS.iter().any(|k| next.contains(k)) {
            parts.push(next.trim().to_string());
        }
    }
    let description = parts.join(" ").replace('-', "").trim().to_string();

    Some(ParsedInvestmentTransaction {
        transaction_date,
        type_label,
        symbol: None,
        api_symbol: None,
        description,
        quantity,
        price_per_share,
        total_amount,
        security_type: None,
        is_duplicate: false,
    })
}
