//! Content fingerprints for imported transactions. Two identical rows hash
//! identically no matter which statement file they arrived in, which is what
//! lets re-imports of overlapping statement periods be detected instead of
//! double-counted.

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Fingerprint for a standard (bank or card) transaction. The institution is
/// lowercased so "Amex" and "amex" describe the same source; optional fields
/// join as empty strings and amounts in their parsed decimal form.
pub fn transaction_fingerprint(
    user_id: i64,
    institution: &str,
    date: NaiveDate,
    type_label: &str,
    amount: Decimal,
    description: &str,
) -> String {
    let payload = format!(
        "{user_id}|{}|{}|{type_label}|{amount}|{description}",
        institution.to_lowercase(),
        date.format("%Y-%m-%d"),
    );
    hex::encode(Sha256::digest(payload.as_bytes()))
}

/// Fingerprint for an investment transaction. Symbol, quantity and price
/// are part of the identity so two fills of the same order size on the same
/// day still separate when any leg differs.
pub fn investment_fingerprint(
    user_id: i64,
    institution: &str,
    date: NaiveDate,
    type_label: &str,
    symbol: Option<&str>,
    quantity: Option<Decimal>,
    price_per_share: Option<Decimal>,
    total_amount: Decimal,
) -> String {
    let payload = format!(
        "{user_id}|{}|{}|{type_label}|{}|{}|{}|{total_amount}",
        institution.to_lowercase(),
        date.format("%Y-%m-%d"),
        symbol.unwrap_or_default(),
        quantity.map(|q| q.to_string()).unwrap_or_default(),
        price_per_share.map(|p| p.to_string()).unwrap_or_default(),
    );
    hex::encode(Sha256::digest(payload.as_bytes()))
}

pub fn transaction_exists(conn: &Connection, user_id: i64, hash: &str) -> Result<bool> {
    let mut stmt = conn.prepare(
        "SELECT 1 FROM transactions WHERE user_id = ?1 AND transaction_hash = ?2 LIMIT 1",
    )?;
    Ok(stmt.exists(params![user_id, hash])?)
}

pub fn investment_transaction_exists(conn: &Connection, user_id: i64, hash: &str) -> Result<bool> {
    let mut stmt = conn.prepare(
        "SELECT 1 FROM investment_transactions WHERE user_id = ?1 AND transaction_hash = ?2 LIMIT 1",
    )?;
    Ok(stmt.exists(params![user_id, hash])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Ledger;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_ledger() -> (TempDir, Ledger) {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open_path(&dir.path().join("test.db")).unwrap();
        ledger.init().unwrap();
        (dir, ledger)
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = transaction_fingerprint(1, "amex", date(2023, 11, 4), "Purchase", dec("12.99"), "COFFEE");
        let b = transaction_fingerprint(1, "amex", date(2023, 11, 4), "Purchase", dec("12.99"), "COFFEE");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_institution_case_insensitive() {
        let a = transaction_fingerprint(1, "Amex", date(2023, 11, 4), "Purchase", dec("12.99"), "COFFEE");
        let b = transaction_fingerprint(1, "amex", date(2023, 11, 4), "Purchase", dec("12.99"), "COFFEE");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_varies_with_type() {
        let a = transaction_fingerprint(1, "amex", date(2023, 11, 4), "Purchase", dec("12.99"), "COFFEE");
        let b = transaction_fingerprint(1, "amex", date(2023, 11, 4), "Credit", dec("12.99"), "COFFEE");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_varies_with_user() {
        let a = transaction_fingerprint(1, "amex", date(2023, 11, 4), "Purchase", dec("12.99"), "COFFEE");
        let b = transaction_fingerprint(2, "amex", date(2023, 11, 4), "Purchase", dec("12.99"), "COFFEE");
        assert_ne!(a, b);
    }

    #[test]
    fn test_investment_fingerprint_none_fields_join_empty() {
        let none = investment_fingerprint(1, "schwab", date(2024, 5, 15), "BUY", None, None, None, dec("-1855.00"));
        let zero = investment_fingerprint(
            1,
            "schwab",
            date(2024, 5, 15),
            "BUY",
            None,
            Some(dec("0")),
            None,
            dec("-1855.00"),
        );
        assert_ne!(none, zero);
    }

    #[test]
    fn test_transaction_exists() {
        let (_dir, ledger) = test_ledger();
        let user_id = ledger.default_user_id().unwrap();
        let hash = transaction_fingerprint(user_id, "amex", date(2023, 11, 4), "Purchase", dec("12.99"), "COFFEE");
        assert!(!transaction_exists(ledger.conn(), user_id, &hash).unwrap());

        ledger
            .conn()
            .execute(
                "INSERT INTO transactions (user_id, transaction_hash, transaction_date, amount, transaction_type, description, institution_name) \
                 VALUES (?1, ?2, '2023-11-04', '12.99', 'PURCHASE', 'COFFEE', 'amex')",
                params![user_id, hash],
            )
            .unwrap();
        assert!(transaction_exists(ledger.conn(), user_id, &hash).unwrap());
        assert!(!transaction_exists(ledger.conn(), user_id + 1, &hash).unwrap());
    }

    #[test]
    fn test_investment_transaction_exists() {
        let (_dir, ledger) = test_ledger();
        let user_id = ledger.default_user_id().unwrap();
        let hash = investment_fingerprint(
            user_id,
            "schwab",
            date(2024, 5, 15),
            "BUY",
            Some("AAPL"),
            Some(dec("10")),
            Some(dec("185.50")),
            dec("-1855.00"),
        );
        assert!(!investment_transaction_exists(ledger.conn(), user_id, &hash).unwrap());

        ledger
            .conn()
            .execute(
                "INSERT INTO investment_transactions (user_id, transaction_hash, transaction_date, transaction_type, symbol, quantity, price_per_share, amount, institution_name) \
                 VALUES (?1, ?2, '2024-05-15', 'BUY', 'AAPL', '10', '185.50', '-1855.00', 'schwab')",
                params![user_id, hash],
            )
            .unwrap();
        assert!(investment_transaction_exists(ledger.conn(), user_id, &hash).unwrap());
    }
}
