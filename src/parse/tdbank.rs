//! TD Bank checking and savings statements. Transaction rows carry a bare
//! `MM/DD` date, so the statement-period line on page one supplies the year
//! for each month.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use super::{
    clean_amount, last_chars, parse_mdy, resolve_md, ParsedAccountInfo, ParsedData,
    ParsedTransaction, PeriodYearMap,
};
use crate::error::Result;

fn period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2}/\d{1,2}/\d{4})\s*-\s*(\d{1,2}/\d{1,2}/\d{4})")
            .expect("statement period regex")
    })
}

pub(crate) fn parse_statement(text: &str) -> ParsedData {
    let mut account_number: Option<String> = None;
    let mut years = PeriodYearMap::new();

    for line in text.lines() {
        if line.contains("Account #") {
            if account_number.is_none() {
                let num = line.rsplit('#').next().unwrap_or("").trim();
                if !num.is_empty() {
                    account_number = Some(num.to_string());
                }
            }
        } else if line.contains("Statement Period:") {
            if let Some(caps) = period_re().captures(line) {
                if let (Some(start), Some(end)) = (parse_mdy(&caps[1]), parse_mdy(&caps[2])) {
                    years = PeriodYearMap::from_period(start, end);
                }
            }
        }
    }

    let mut transactions = Vec::new();
    for line in text.lines() {
        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            continue;
        }
        let Some(date) = resolve_md(tokens.remove(0), &years) else {
            continue;
        };
        let Some(amount) = clean_amount(tokens.pop().unwrap_or("")) else {
            log::warn!("skipping TD Bank row with bad amount: {line}");
            continue;
        };
        let type_label = if amount > Decimal::ZERO { "Deposit" } else { "Purchase" };
        transactions.push(ParsedTransaction::new(
            date,
            type_label,
            amount.abs(),
            tokens.join(" "),
        ));
    }

    let account_info = account_number.map(|n| ParsedAccountInfo {
        account_number_last4: last_chars(&n, 4),
    });
    ParsedData {
        account_info,
        transactions,
        investment_transactions: Vec::new(),
    }
}

/// TD Bank CSV export: date, type, ..., description, debit, credit. The
/// export never carries an account number.
pub(crate) fn parse_csv(bytes: &[u8]) -> Result<ParsedData> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let mut transactions = Vec::new();
    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if record.len() < 7 {
            continue;
        }
        let Ok(date) = NaiveDate::parse_from_str(record[0].trim(), "%Y-%m-%d") else {
            log::warn!("skipping TD Bank CSV row with bad date: {:?}", &record[0]);
            continue;
        };
        let description = record[4].trim().to_string();
        let credit = record[6].trim();
        let (raw, type_label) = if !credit.is_empty() {
            (credit, "Deposit")
        } else {
            (record[5].trim(), "Purchase")
        };
        let Some(amount) = clean_amount(raw) else {
            log::warn!("skipping TD Bank CSV row with bad amount: {line:?}", line = record);
            continue;
        };
        transactions.push(ParsedTransaction::new(date, type_label, amount.abs(), description));
    }

    Ok(ParsedData {
        account_info: None,
        transactions,
        investment_transactions: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_statement_rows_and_account() {
        let text = "\
TD Bank Convenience Checking
Account # 123-456-7890
Statement Period: 03/05/2024 - 04/04/2024
Daily Account Activity
03/12 PAYROLL DIRECT DEPOSIT ACME CORP 2,500.00
03/15 DEBIT CARD PURCHASE COFFEE ROASTERS -4.50
04/01 ELECTRONIC PMT RENT LLC -1,200.00
Total For This Period
";
        let data = parse_statement(text);
        assert_eq!(data.account_info.unwrap().account_number_last4, "7890");
        assert_eq!(data.transactions.len(), 3);

        let deposit = &data.transactions[0];
        assert_eq!(deposit.type_label, "Deposit");
        assert_eq!(deposit.amount, dec("2500.00"));
        assert_eq!(
            deposit.transaction_date,
            NaiveDate::from_ymd_opt(2024, 3, 12).unwrap()
        );

        let rent = &data.transactions[2];
        assert_eq!(rent.type_label, "Purchase");
        assert_eq!(rent.amount, dec("1200.00"));
        assert_eq!(
            rent.transaction_date,
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
        );
    }

    #[test]
    fn test_statement_period_crossing_december() {
        let text = "\
Account # 0001112222
Statement Period: 12/20/2023 - 01/19/2024
12/28 HOLIDAY SHOP GIFTS -80.00
01/02 INTEREST PAID 1.25
";
        let data = parse_statement(text);
        assert_eq!(
            data.transactions[0].transaction_date,
            NaiveDate::from_ymd_opt(2023, 12, 28).unwrap()
        );
        assert_eq!(
            data.transactions[1].transaction_date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_statement_without_period_yields_no_rows() {
        let text = "\
Account # 0001112222
03/12 PAYROLL 2,500.00
";
        let data = parse_statement(text);
        assert!(data.transactions.is_empty());
        assert_eq!(data.account_info.unwrap().account_number_last4, "2222");
    }

    #[test]
    fn test_csv_debit_and_credit_columns() {
        let csv = "\
Date,Type,Check No,Memo,Description,Debit,Credit
2024-03-12,CREDIT,,,PAYROLL DIRECT DEPOSIT,,2500.00
2024-03-15,DEBIT,,,COFFEE ROASTERS,4.50,
2024-03-18,DEBIT,,,BOTH AMOUNT CELLS EMPTY,,
not-a-date,DEBIT,,,SKIP ME,1.00,
";
        let data = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(data.transactions.len(), 2);
        assert_eq!(data.transactions[0].type_label, "Deposit");
        assert_eq!(data.transactions[0].amount, dec("2500.00"));
        assert_eq!(data.transactions[1].type_label, "Purchase");
        assert_eq!(data.transactions[1].amount, dec("4.50"));
        assert!(data.account_info.is_none());
    }
}
