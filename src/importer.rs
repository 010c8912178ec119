//! Statement processing pipeline: fetch the uploaded object, run the
//! institution's parser, reconcile the rows into the ledger, and delete the
//! object once the import has landed. A failed import leaves the object in
//! the store for a retry.

use std::path::Path;

use crate::db::{self, Ledger};
use crate::error::Result;
use crate::models::{InvestmentTransaction, SourceType, Transaction};
use crate::parse::{self, Institution, ParsedData};
use crate::reconcile::{self, ImportOutcome};
use crate::storage::ObjectStore;

#[derive(Debug)]
pub struct ProcessOutcome {
    pub transactions: ImportOutcome<Transaction>,
    pub investments: ImportOutcome<InvestmentTransaction>,
    /// Account the statement ended up attached to, whether passed in or
    /// matched from the statement's own account number.
    pub account_id: Option<i64>,
}

pub fn process_statement(
    ledger: &Ledger,
    store: &dyn ObjectStore,
    user_id: i64,
    key: &str,
    institution: Institution,
    account_id: Option<i64>,
) -> Result<ProcessOutcome> {
    let bytes = store.fetch(key)?;
    let is_csv = is_csv_key(key);
    let parsed = institution.parse(&bytes, is_csv)?;
    let source_type = if is_csv { SourceType::Csv } else { SourceType::Pdf };

    let account_id = match account_id {
        Some(id) => Some(id),
        None => match_account(ledger, user_id, &parsed)?,
    };

    let transactions = reconcile::bulk_import_transactions(
        ledger,
        user_id,
        institution.key(),
        account_id,
        source_type,
        &parsed.transactions,
    )?;
    let investments = reconcile::bulk_import_investment_transactions(
        ledger,
        user_id,
        institution.key(),
        account_id,
        source_type,
        &parsed.investment_transactions,
    )?;

    store.delete(key)?;
    log::info!(
        "processed {key}: {} transactions, {} investment transactions",
        transactions.created.len(),
        investments.created.len(),
    );
    Ok(ProcessOutcome {
        transactions,
        investments,
        account_id,
    })
}

fn is_csv_key(key: &str) -> bool {
    Path::new(key)
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("csv"))
}

/// Match the statement to an account by the number printed on it. Some
/// statements carry five digits; accounts store the last four.
fn match_account(ledger: &Ledger, user_id: i64, parsed: &ParsedData) -> Result<Option<i64>> {
    let Some(info) = &parsed.account_info else {
        return Ok(None);
    };
    let last4 = parse::last_chars(&info.account_number_last4, 4);
    match db::get_account_by_last4(ledger.conn(), user_id, &last4)? {
        Some(account) => {
            log::info!("matched statement to account '{}' by number ending {last4}", account.name);
            Ok(Some(account.id))
        }
        None => {
            log::warn!("no account matches statement number ending {last4}; importing unattached");
            Ok(None)
        }
    }
}
