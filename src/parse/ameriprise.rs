//! Ameriprise brokerage activity exports (CSV only). Metadata lines precede
//! a `Date,Account,...` header; the account cell carries the masked account
//! number in parentheses and the type cell doubles as `Type - Description`.

use rust_decimal::Decimal;

use super::{last_chars, parse_mdy, ParsedAccountInfo, ParsedData, ParsedInvestmentTransaction};
use crate::error::Result;

pub(crate) fn parse_csv(bytes: &[u8]) -> Result<ParsedData> {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().collect();

    let Some(header_index) = lines
        .iter()
        .position(|l| l.trim().starts_with("Date,Account"))
    else {
        log::warn!("no transaction header found in Ameriprise CSV; nothing parsed");
        return Ok(ParsedData::default());
    };

    let body = lines[header_index + 1..].join("\n");
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut account_info: Option<ParsedAccountInfo> = None;
    let mut rows = Vec::new();
    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if record.len() < 7 {
            continue;
        }

        if account_info.is_none() {
            let masked = last_chars(&record[1], 10).replace(')', "");
            if !masked.is_empty() {
                account_info = Some(ParsedAccountInfo {
                    account_number_last4: last_chars(&masked, 4),
                });
            }
        }

        let Some(transaction_date) = parse_mdy(&record[0]) else {
            log::warn!("skipping Ameriprise row with bad date: {:?}", &record[0]);
            continue;
        };

        // "Buy - VANGUARD S&P 500 ETF" splits into the type label and the
        // description; a cell with no dash serves as both.
        let type_cell = record[2].trim();
        let (type_label, description) = match type_cell.split_once('-') {
            Some((label, rest)) => (label.trim().to_string(), rest.trim().to_string()),
            None => (type_cell.to_string(), type_cell.to_string()),
        };

        let amount_raw: String = record[3]
            .chars()
            .filter(|c| !matches!(c, '$' | '-'))
            .collect();
        let Ok(total_amount) = amount_raw.trim().parse::<Decimal>() else {
            log::warn!("skipping Ameriprise row with no amount: {record:?}");
            continue;
        };

        let quantity_raw: String = record[4].chars().filter(|c| *c != '-').collect();
        let quantity = match quantity_raw.trim() {
            "" => None,
            raw => match raw.parse::<Decimal>() {
                Ok(q) => Some(q),
                Err(_) => {
                    log::warn!("skipping Ameriprise row with bad quantity: {record:?}");
                    continue;
                }
            },
        };

        let price_raw: String = record[5].chars().filter(|c| *c != '$').collect();
        let price_per_share = match price_raw.trim() {
            "" => None,
            raw => match raw.parse::<Decimal>() {
                Ok(p) => Some(p),
                Err(_) => {
                    log::warn!("skipping Ameriprise row with bad price: {record:?}");
                    continue;
                }
            },
        };

        let symbol = match record[6].trim() {
            "" => None,
            s => Some(s.to_string()),
        };

        rows.push(ParsedInvestmentTransaction {
            transaction_date,
            type_label,
            symbol,
            api_symbol: None,
            description,
            quantity,
            price_per_share,
            total_amount,
            security_type: None,
            is_duplicate: false,
        });
    }

    Ok(ParsedData {
        account_info,
        transactions: Vec::new(),
        investment_transactions: rows,
    })
}
