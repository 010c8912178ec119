//! Reconciliation: turning parsed statement rows into ledger rows while
//! keeping account balances and holdings in step. All of a batch's inserts
//! and aggregate updates run inside one SQLite transaction; a batch either
//! lands whole or not at all.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::db::{self, get_decimal_opt, Ledger};
use crate::dedup;
use crate::error::{PassbookError, Result};
use crate::models::{
    AccountType, InvestmentHolding, InvestmentTransaction, InvestmentTransactionType,
    RelationshipType, SourceType, Tag, Transaction, TransactionRelationship, TransactionType,
};
use crate::parse::{ParsedInvestmentTransaction, ParsedTransaction};

/// Tag attached to standard transactions whose fingerprint already exists in
/// the ledger.
pub const DUPLICATE_TAG: &str = "duplicate";

// ---------------------------------------------------------------------------
// Signed amounts
// ---------------------------------------------------------------------------

/// The effect of one transaction on its account's ledger balance. Parsed
/// amounts are unsigned magnitudes; the type decides the direction, and
/// interest runs against you on a credit card.
pub fn signed_amount(
    transaction_type: TransactionType,
    account_type: AccountType,
    amount: Decimal,
) -> Decimal {
    match transaction_type {
        TransactionType::Credit | TransactionType::Deposit => amount,
        TransactionType::Purchase | TransactionType::Withdrawal | TransactionType::Fee => -amount,
        TransactionType::Interest => {
            if account_type == AccountType::CreditCard {
                -amount
            } else {
                amount
            }
        }
        TransactionType::Transfer => Decimal::ZERO,
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ImportOutcome<T> {
    pub created: Vec<T>,
    pub skipped_unmapped: usize,
    pub skipped_in_batch: usize,
    pub flagged_duplicates: usize,
}

impl<T> Default for ImportOutcome<T> {
    fn default() -> Self {
        ImportOutcome {
            created: Vec::new(),
            skipped_unmapped: 0,
            skipped_in_batch: 0,
            flagged_duplicates: 0,
        }
    }
}

/// Result of a single-record create. A fingerprint collision is a normal
/// outcome here, not an error: nothing is inserted and the caller decides
/// what to tell the user.
#[derive(Debug)]
pub enum CreateOutcome<T> {
    Created(T),
    Duplicate,
}

// ---------------------------------------------------------------------------
// Bulk import: standard transactions
// ---------------------------------------------------------------------------

pub fn bulk_import_transactions(
    ledger: &Ledger,
    user_id: i64,
    institution: &str,
    account_id: Option<i64>,
    source_type: SourceType,
    rows: &[ParsedTransaction],
) -> Result<ImportOutcome<Transaction>> {
    let conn = ledger.conn();
    if !db::user_exists(conn, user_id)? {
        return Err(PassbookError::UnknownUser(user_id));
    }
    let account = match account_id {
        Some(id) => Some(db::get_account(conn, user_id, id)?.ok_or_else(|| {
            PassbookError::UnknownAccount(format!("account {id} not found for user {user_id}"))
        })?),
        None => None,
    };

    let tx = conn.unchecked_transaction()?;
    let mut outcome = ImportOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut balance_delta = Decimal::ZERO;

    for row in rows {
        let Some(transaction_type) = TransactionType::from_label(&row.type_label) else {
            log::warn!("skipping transaction with unmappable type label: {:?}", row.type_label);
            outcome.skipped_unmapped += 1;
            continue;
        };
        let hash = dedup::transaction_fingerprint(
            user_id,
            institution,
            row.transaction_date,
            transaction_type.as_str(),
            row.amount,
            &row.description,
        );
        if !seen.insert(hash.clone()) {
            outcome.skipped_in_batch += 1;
            continue;
        }
        let duplicate = dedup::transaction_exists(&tx, user_id, &hash)?;
        if duplicate {
            outcome.flagged_duplicates += 1;
        }
        let needs_review = account.is_none() || duplicate;

        tx.execute(
            "INSERT INTO transactions (user_id, account_id, transaction_hash, transaction_date, \
             amount, transaction_type, description, institution_name, account_number_last4, \
             source_type, needs_review) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                user_id,
                account_id,
                hash,
                row.transaction_date,
                row.amount.to_string(),
                transaction_type.as_str(),
                row.description,
                institution,
                account.as_ref().and_then(|a| a.account_number_last4.as_deref()),
                source_type.as_str(),
                needs_review,
            ],
        )?;
        let id = tx.last_insert_rowid();

        if duplicate {
            let tag = get_or_create_tag(&tx, user_id, DUPLICATE_TAG)?;
            attach_tag(&tx, id, tag.id)?;
        }
        if let Some(account) = &account {
            balance_delta += signed_amount(transaction_type, account.account_type, row.amount);
        }

        outcome.created.push(Transaction {
            id,
            user_id,
            account_id,
            category_id: None,
            subcategory_id: None,
            transaction_hash: hash,
            transaction_date: row.transaction_date,
            amount: row.amount,
            transaction_type,
            description: Some(row.description.clone()),
            institution_name: institution.to_string(),
            account_number_last4: account.as_ref().and_then(|a| a.account_number_last4.clone()),
            source_type,
            needs_review,
        });
    }

    if let Some(account) = &account {
        if !outcome.created.is_empty() && account.account_type != AccountType::Investment {
            db::update_account_balance(&tx, account.id, account.balance + balance_delta)?;
        }
    }
    tx.commit()?;

    log::info!(
        "imported {} {institution} transactions ({} unmapped, {} in-batch duplicates, {} flagged)",
        outcome.created.len(),
        outcome.skipped_unmapped,
        outcome.skipped_in_batch,
        outcome.flagged_duplicates,
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Bulk import: investment transactions
// ---------------------------------------------------------------------------

pub fn bulk_import_investment_transactions(
    ledger: &Ledger,
    user_id: i64,
    institution: &str,
    account_id: Option<i64>,
    source_type: SourceType,
    rows: &[ParsedInvestmentTransaction],
) -> Result<ImportOutcome<InvestmentTransaction>> {
    let conn = ledger.conn();
    if !db::user_exists(conn, user_id)? {
        return Err(PassbookError::UnknownUser(user_id));
    }
    let account = match account_id {
        Some(id) => Some(db::get_account(conn, user_id, id)?.ok_or_else(|| {
            PassbookError::UnknownAccount(format!("account {id} not found for user {user_id}"))
        })?),
        None => None,
    };

    let tx = conn.unchecked_transaction()?;
    let mut outcome = ImportOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();

    for row in rows {
        let Some(transaction_type) = InvestmentTransactionType::from_label(&row.type_label) else {
            log::warn!(
                "skipping investment transaction with unmappable type label: {:?}",
                row.type_label
            );
            outcome.skipped_unmapped += 1;
            continue;
        };
        let hash = dedup::investment_fingerprint(
            user_id,
            institution,
            row.transaction_date,
            transaction_type.as_str(),
            row.symbol.as_deref(),
            row.quantity,
            row.price_per_share,
            row.total_amount,
        );
        if !seen.insert(hash.clone()) {
            outcome.skipped_in_batch += 1;
            continue;
        }
        let duplicate = dedup::investment_transaction_exists(&tx, user_id, &hash)?;
        if duplicate {
            outcome.flagged_duplicates += 1;
        }
        let needs_review = account.is_none() || duplicate;

        let mut holding_id = None;
        if let (Some(account), Some(symbol)) = (&account, row.symbol.as_deref()) {
            let holding = match db::find_holding(&tx, account.id, symbol)? {
                Some(h) => Some(h),
                None if transaction_type.opens_position() => {
                    Some(db::create_holding(&tx, account.id, symbol)?)
                }
                None => None,
            };
            if let Some(mut holding) = holding {
                holding_id = Some(holding.id);
                apply_to_holding(&tx, &mut holding, transaction_type, row.quantity, row.price_per_share)?;
            }
        }

        tx.execute(
            "INSERT INTO investment_transactions (user_id, account_id, holding_id, \
             transaction_hash, transaction_date, transaction_type, symbol, api_symbol, \
             security_type, quantity, price_per_share, amount, description, institution_name, \
             source_type, needs_review) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                user_id,
                account_id,
                holding_id,
                hash,
                row.transaction_date,
                transaction_type.as_str(),
                row.symbol,
                row.api_symbol,
                row.security_type.map(|s| s.as_str()),
                row.quantity.map(|q| q.to_string()),
                row.price_per_share.map(|p| p.to_string()),
                row.total_amount.to_string(),
                row.description,
                institution,
                source_type.as_str(),
                needs_review,
            ],
        )?;

        outcome.created.push(InvestmentTransaction {
            id: tx.last_insert_rowid(),
            user_id,
            account_id,
            holding_id,
            transaction_hash: hash,
            transaction_date: row.transaction_date,
            transaction_type,
            symbol: row.symbol.clone(),
            api_symbol: row.api_symbol.clone(),
            security_type: row.security_type,
            quantity: row.quantity,
            price_per_share: row.price_per_share,
            amount: row.total_amount,
            description: Some(row.description.clone()),
            institution_name: institution.to_string(),
            source_type,
            needs_review,
        });
    }

    tx.commit()?;

    log::info!(
        "imported {} {institution} investment transactions ({} unmapped, {} in-batch duplicates, {} flagged)",
        outcome.created.len(),
        outcome.skipped_unmapped,
        outcome.skipped_in_batch,
        outcome.flagged_duplicates,
    );
    Ok(outcome)
}

/// Fold one transaction into its holding. Buys and reinvestments move the
/// weighted-average cost basis; sells reduce quantity and leave the basis
/// alone; everything else is a no-op.
fn apply_to_holding(
    conn: &Connection,
    holding: &mut InvestmentHolding,
    transaction_type: InvestmentTransactionType,
    quantity: Option<Decimal>,
    price_per_share: Option<Decimal>,
) -> Result<()> {
    match transaction_type {
        InvestmentTransactionType::Buy | InvestmentTransactionType::Reinvestment => {
            let (Some(tq), Some(price)) = (quantity, price_per_share) else {
                return Ok(());
            };
            let new_quantity = holding.quantity + tq;
            if new_quantity > Decimal::ZERO {
                let old_cost = holding.quantity * holding.average_cost_basis;
                holding.average_cost_basis = (old_cost + tq * price) / new_quantity;
            }
            holding.quantity = new_quantity;
        }
        InvestmentTransactionType::Sell => {
            let Some(tq) = quantity else {
                return Ok(());
            };
            holding.quantity -= tq;
        }
        _ => return Ok(()),
    }
    conn.execute(
        "UPDATE investment_holdings SET quantity = ?1, average_cost_basis = ?2, \
         updated_at = datetime('now') WHERE id = ?3",
        params![
            holding.quantity.to_string(),
            holding.average_cost_basis.to_string(),
            holding.id,
        ],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Single-record create
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: Option<i64>,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub transaction_date: chrono::NaiveDate,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub description: Option<String>,
}

#[allow(dead_code)]
pub fn create_transaction(
    ledger: &Ledger,
    user_id: i64,
    new: &NewTransaction,
) -> Result<CreateOutcome<Transaction>> {
    let conn = ledger.conn();
    if !db::user_exists(conn, user_id)? {
        return Err(PassbookError::UnknownUser(user_id));
    }
    let account = match new.account_id {
        Some(id) => Some(db::get_account(conn, user_id, id)?.ok_or_else(|| {
            PassbookError::UnknownAccount(format!("account {id} not found for user {user_id}"))
        })?),
        None => None,
    };
    validate_categories(conn, new.category_id, new.subcategory_id)?;

    let institution = account
        .as_ref()
        .and_then(|a| a.institution_name.clone())
        .unwrap_or_default();
    let hash = dedup::transaction_fingerprint(
        user_id,
        &institution,
        new.transaction_date,
        new.transaction_type.as_str(),
        new.amount,
        new.description.as_deref().unwrap_or_default(),
    );
    if dedup::transaction_exists(conn, user_id, &hash)? {
        return Ok(CreateOutcome::Duplicate);
    }

    let tx = conn.unchecked_transaction()?;
    let needs_review = account.is_none();
    tx.execute(
        "INSERT INTO transactions (user_id, account_id, category_id, subcategory_id, \
         transaction_hash, transaction_date, amount, transaction_type, description, \
         institution_name, account_number_last4, source_type, needs_review) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            user_id,
            new.account_id,
            new.category_id,
            new.subcategory_id,
            hash,
            new.transaction_date,
            new.amount.to_string(),
            new.transaction_type.as_str(),
            new.description,
            institution,
            account.as_ref().and_then(|a| a.account_number_last4.as_deref()),
            SourceType::Manual.as_str(),
            needs_review,
        ],
    )?;
    let id = tx.last_insert_rowid();

    if let Some(account) = &account {
        if account.account_type != AccountType::Investment {
            let delta = signed_amount(new.transaction_type, account.account_type, new.amount);
            db::update_account_balance(&tx, account.id, account.balance + delta)?;
        }
    }
    tx.commit()?;

    Ok(CreateOutcome::Created(Transaction {
        id,
        user_id,
        account_id: new.account_id,
        category_id: new.category_id,
        subcategory_id: new.subcategory_id,
        transaction_hash: hash,
        transaction_date: new.transaction_date,
        amount: new.amount,
        transaction_type: new.transaction_type,
        description: new.description.clone(),
        institution_name: institution,
        account_number_last4: account.as_ref().and_then(|a| a.account_number_last4.clone()),
        source_type: SourceType::Manual,
        needs_review,
    }))
}

#[derive(Debug, Clone)]
pub struct NewInvestmentTransaction {
    pub account_id: i64,
    pub transaction_date: chrono::NaiveDate,
    pub transaction_type: InvestmentTransactionType,
    pub symbol: Option<String>,
    pub quantity: Option<Decimal>,
    pub price_per_share: Option<Decimal>,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[allow(dead_code)]
pub fn create_investment_transaction(
    ledger: &Ledger,
    user_id: i64,
    new: &NewInvestmentTransaction,
) -> Result<CreateOutcome<InvestmentTransaction>> {
    let conn = ledger.conn();
    let account = db::get_account(conn, user_id, new.account_id)?.ok_or_else(|| {
        PassbookError::UnknownAccount(format!(
            "account {} not found for user {user_id}",
            new.account_id
        ))
    })?;

    let institution = account.institution_name.clone().unwrap_or_default();
    let hash = dedup::investment_fingerprint(
        user_id,
        &institution,
        new.transaction_date,
        new.transaction_type.as_str(),
        new.symbol.as_deref(),
        new.quantity,
        new.price_per_share,
        new.amount,
    );
    if dedup::investment_transaction_exists(conn, user_id, &hash)? {
        return Ok(CreateOutcome::Duplicate);
    }

    let tx = conn.unchecked_transaction()?;
    let mut holding_id = None;
    if let Some(symbol) = new.symbol.as_deref() {
        let holding = match db::find_holding(&tx, account.id, symbol)? {
            Some(h) => Some(h),
            None if new.transaction_type.opens_position() => {
                Some(db::create_holding(&tx, account.id, symbol)?)
            }
            None => None,
        };
        if let Some(mut holding) = holding {
            holding_id = Some(holding.id);
            apply_to_holding(&tx, &mut holding, new.transaction_type, new.quantity, new.price_per_share)?;
        }
    }

    tx.execute(
        "INSERT INTO investment_transactions (user_id, account_id, holding_id, transaction_hash, \
         transaction_date, transaction_type, symbol, quantity, price_per_share, amount, \
         description, institution_name, source_type, needs_review) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0)",
        params![
            user_id,
            new.account_id,
            holding_id,
            hash,
            new.transaction_date,
            new.transaction_type.as_str(),
            new.symbol,
            new.quantity.map(|q| q.to_string()),
            new.price_per_share.map(|p| p.to_string()),
            new.amount.to_string(),
            new.description,
            institution,
            SourceType::Manual.as_str(),
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(CreateOutcome::Created(InvestmentTransaction {
        id,
        user_id,
        account_id: Some(new.account_id),
        holding_id,
        transaction_hash: hash,
        transaction_date: new.transaction_date,
        transaction_type: new.transaction_type,
        symbol: new.symbol.clone(),
        api_symbol: None,
        security_type: None,
        quantity: new.quantity,
        price_per_share: new.price_per_share,
        amount: new.amount,
        description: new.description.clone(),
        institution_name: institution,
        source_type: SourceType::Manual,
        needs_review: false,
    }))
}

fn validate_categories(
    conn: &Connection,
    category_id: Option<i64>,
    subcategory_id: Option<i64>,
) -> Result<()> {
    if let Some(id) = category_id {
        let category = db::get_category(conn, id)?.ok_or(PassbookError::UnknownCategory(id))?;
        if category.parent_id.is_some() {
            return Err(PassbookError::InvalidCategory(format!(
                "'{}' is a subcategory and cannot be used as a primary category",
                category.name
            )));
        }
    }
    if let Some(id) = subcategory_id {
        let Some(parent_id) = category_id else {
            return Err(PassbookError::InvalidCategory(
                "a subcategory requires a primary category".to_string(),
            ));
        };
        let subcategory = db::get_category(conn, id)?.ok_or(PassbookError::UnknownCategory(id))?;
        if subcategory.parent_id != Some(parent_id) {
            return Err(PassbookError::InvalidCategory(format!(
                "subcategory '{}' does not belong to category {parent_id}",
                subcategory.name
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Update / delete with balance replay
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct TransactionUpdate {
    pub amount: Option<Decimal>,
    pub transaction_type: Option<TransactionType>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub needs_review: Option<bool>,
}

/// Apply field updates; when the amount or type changed the account balance
/// moves by `signed(new) - signed(old)`.
#[allow(dead_code)]
pub fn update_transaction(
    ledger: &Ledger,
    user_id: i64,
    transaction_id: i64,
    updates: &TransactionUpdate,
) -> Result<Transaction> {
    let conn = ledger.conn();
    let existing = db::get_transaction(conn, user_id, transaction_id)?
        .ok_or_else(|| PassbookError::NotFound(format!("transaction {transaction_id}")))?;

    let amount = updates.amount.unwrap_or(existing.amount);
    let transaction_type = updates.transaction_type.unwrap_or(existing.transaction_type);
    let description = updates.description.clone().or_else(|| existing.description.clone());
    let category_id = updates.category_id.or(existing.category_id);
    let subcategory_id = updates.subcategory_id.or(existing.subcategory_id);
    let needs_review = updates.needs_review.unwrap_or(existing.needs_review);

    if updates.category_id.is_some() || updates.subcategory_id.is_some() {
        validate_categories(conn, category_id, subcategory_id)?;
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE transactions SET amount = ?1, transaction_type = ?2, description = ?3, \
         category_id = ?4, subcategory_id = ?5, needs_review = ?6, updated_at = datetime('now') \
         WHERE id = ?7",
        params![
            amount.to_string(),
            transaction_type.as_str(),
            description,
            category_id,
            subcategory_id,
            needs_review,
            transaction_id,
        ],
    )?;

    let changed = amount != existing.amount || transaction_type != existing.transaction_type;
    if changed {
        if let Some(account_id) = existing.account_id {
            if let Some(account) = db::get_account(&tx, user_id, account_id)? {
                if account.account_type != AccountType::Investment {
                    let delta = signed_amount(transaction_type, account.account_type, amount)
                        - signed_amount(existing.transaction_type, account.account_type, existing.amount);
                    if delta != Decimal::ZERO {
                        db::update_account_balance(&tx, account.id, account.balance + delta)?;
                    }
                }
            }
        }
    }
    tx.commit()?;

    Ok(Transaction {
        amount,
        transaction_type,
        description,
        category_id,
        subcategory_id,
        needs_review,
        ..existing
    })
}

/// Remove a transaction and back its signed effect out of the balance.
#[allow(dead_code)]
pub fn delete_transaction(ledger: &Ledger, user_id: i64, transaction_id: i64) -> Result<()> {
    let conn = ledger.conn();
    let existing = db::get_transaction(conn, user_id, transaction_id)?
        .ok_or_else(|| PassbookError::NotFound(format!("transaction {transaction_id}")))?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM transaction_tags WHERE transaction_id = ?1",
        [transaction_id],
    )?;
    tx.execute(
        "DELETE FROM transaction_relationships WHERE from_transaction_id = ?1 OR to_transaction_id = ?1",
        [transaction_id],
    )?;
    tx.execute("DELETE FROM transactions WHERE id = ?1", [transaction_id])?;

    if let Some(account_id) = existing.account_id {
        if let Some(account) = db::get_account(&tx, user_id, account_id)? {
            if account.account_type != AccountType::Investment {
                let delta =
                    signed_amount(existing.transaction_type, account.account_type, existing.amount);
                if delta != Decimal::ZERO {
                    db::update_account_balance(&tx, account.id, account.balance - delta)?;
                }
            }
        }
    }
    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

pub fn get_or_create_tag(conn: &Connection, user_id: i64, name: &str) -> Result<Tag> {
    let existing = conn
        .prepare("SELECT id, user_id, name FROM tags WHERE user_id = ?1 AND name = ?2")?
        .query_row(params![user_id, name], |row| {
            Ok(Tag {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
            })
        })
        .optional()?;
    if let Some(tag) = existing {
        return Ok(tag);
    }
    conn.execute(
        "INSERT INTO tags (user_id, name) VALUES (?1, ?2)",
        params![user_id, name],
    )?;
    Ok(Tag {
        id: conn.last_insert_rowid(),
        user_id,
        name: name.to_string(),
    })
}

pub fn attach_tag(conn: &Connection, transaction_id: i64, tag_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO transaction_tags (transaction_id, tag_id) VALUES (?1, ?2)",
        params![transaction_id, tag_id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Transaction relationships
// ---------------------------------------------------------------------------

fn map_relationship(row: &Row) -> rusqlite::Result<TransactionRelationship> {
    let type_raw: String = row.get(3)?;
    let relationship_type = RelationshipType::parse(&type_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown relationship type: {type_raw}").into(),
        )
    })?;
    Ok(TransactionRelationship {
        id: row.get(0)?,
        from_transaction_id: row.get(1)?,
        to_transaction_id: row.get(2)?,
        relationship_type,
        amount_allocated: get_decimal_opt(row, 4)?,
    })
}

/// Directed typed edge between two of the user's transactions.
#[allow(dead_code)]
pub fn create_relationship(
    ledger: &Ledger,
    user_id: i64,
    from_transaction_id: i64,
    to_transaction_id: i64,
    relationship_type: RelationshipType,
    amount_allocated: Option<Decimal>,
) -> Result<TransactionRelationship> {
    if from_transaction_id == to_transaction_id {
        return Err(PassbookError::Constraint(
            "a transaction cannot relate to itself".to_string(),
        ));
    }
    let conn = ledger.conn();
    for id in [from_transaction_id, to_transaction_id] {
        db::get_transaction(conn, user_id, id)?
            .ok_or_else(|| PassbookError::NotFound(format!("transaction {id}")))?;
    }
    conn.execute(
        "INSERT INTO transaction_relationships \
         (from_transaction_id, to_transaction_id, relationship_type, amount_allocated) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            from_transaction_id,
            to_transaction_id,
            relationship_type.as_str(),
            amount_allocated.map(|a| a.to_string()),
        ],
    )
    .map_err(|e| constraint_error(e, "relationship already exists"))?;
    Ok(TransactionRelationship {
        id: conn.last_insert_rowid(),
        from_transaction_id,
        to_transaction_id,
        relationship_type,
        amount_allocated,
    })
}

/// Every edge touching the given transaction, in either direction.
#[allow(dead_code)]
pub fn list_relationships(
    ledger: &Ledger,
    user_id: i64,
    transaction_id: i64,
) -> Result<Vec<TransactionRelationship>> {
    let mut stmt = ledger.conn().prepare(
        "SELECT r.id, r.from_transaction_id, r.to_transaction_id, r.relationship_type, \
         r.amount_allocated \
         FROM transaction_relationships r \
         JOIN transactions t ON t.id = r.from_transaction_id \
         WHERE t.user_id = ?1 AND (r.from_transaction_id = ?2 OR r.to_transaction_id = ?2) \
         ORDER BY r.id",
    )?;
    let rows = stmt.query_map(params![user_id, transaction_id], map_relationship)?;
    let mut relationships = Vec::new();
    for relationship in rows {
        relationships.push(relationship?);
    }
    Ok(relationships)
}

#[allow(dead_code)]
pub fn delete_relationship(ledger: &Ledger, user_id: i64, relationship_id: i64) -> Result<()> {
    let affected = ledger.conn().execute(
        "DELETE FROM transaction_relationships WHERE id = ?1 AND from_transaction_id IN \
         (SELECT id FROM transactions WHERE user_id = ?2)",
        params![relationship_id, user_id],
    )?;
    if affected == 0 {
        return Err(PassbookError::NotFound(format!(
            "relationship {relationship_id}"
        )));
    }
    Ok(())
}

fn constraint_error(e: rusqlite::Error, message: &str) -> PassbookError {
    match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            PassbookError::Constraint(message.to_string())
        }
        other => PassbookError::Db(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::get_decimal;
    use chrono::NaiveDate;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn test_ledger() -> (TempDir, Ledger) {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open_path(&dir.path().join("test.db")).unwrap();
        ledger.init().unwrap();
        (dir, ledger)
    }

    fn seed_account(ledger: &Ledger, account_type: AccountType, balance: &str) -> i64 {
        let user = ledger.default_user_id().unwrap();
        db::create_account(
            ledger.conn(),
            user,
            "Test Account",
            account_type,
            Some("TD Bank"),
            Some("4321"),
            dec(balance),
        )
        .unwrap()
        .id
    }

    // (date, type label, amount, description)
    fn rows(specs: &[(&str, &str, &str, &str)]) -> Vec<ParsedTransaction> {
        specs
            .iter()
            .map(|(d, label, amount, desc)| {
                ParsedTransaction::new(date(d), label, dec(amount), desc.to_string())
            })
            .collect()
    }

    // (date, type label, symbol, quantity, price, amount); empty cells are None
    fn invest_rows(specs: &[(&str, &str, &str, &str, &str, &str)]) -> Vec<ParsedInvestmentTransaction> {
        specs
            .iter()
            .map(|(d, label, symbol, qty, price, amount)| ParsedInvestmentTransaction {
                transaction_date: date(d),
                type_label: label.to_string(),
                symbol: (!symbol.is_empty()).then(|| symbol.to_string()),
                api_symbol: None,
                description: format!("{label} {symbol}"),
                quantity: (!qty.is_empty()).then(|| dec(qty)),
                price_per_share: (!price.is_empty()).then(|| dec(price)),
                total_amount: dec(amount),
                security_type: None,
                is_duplicate: false,
            })
            .collect()
    }

    fn balance_of(ledger: &Ledger, account_id: i64) -> Decimal {
        ledger
            .conn()
            .query_row("SELECT balance FROM accounts WHERE id = ?1", [account_id], |r| {
                get_decimal(r, 0)
            })
            .unwrap()
    }

    #[test]
    fn test_signed_amount() {
        let checking = AccountType::Checking;
        let card = AccountType::CreditCard;
        assert_eq!(signed_amount(TransactionType::Deposit, checking, dec("100")), dec("100"));
        assert_eq!(signed_amount(TransactionType::Credit, card, dec("50")), dec("50"));
        assert_eq!(signed_amount(TransactionType::Purchase, card, dec("25")), dec("-25"));
        assert_eq!(signed_amount(TransactionType::Withdrawal, checking, dec("25")), dec("-25"));
        assert_eq!(signed_amount(TransactionType::Fee, checking, dec("5")), dec("-5"));
        assert_eq!(signed_amount(TransactionType::Interest, checking, dec("1")), dec("1"));
        assert_eq!(signed_amount(TransactionType::Interest, card, dec("1")), dec("-1"));
        assert_eq!(signed_amount(TransactionType::Transfer, checking, dec("99")), dec("0"));
    }

    #[test]
    fn test_bank_import_updates_balance() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let account = seed_account(&ledger, AccountType::Checking, "500.00");

        let outcome = bulk_import_transactions(
            &ledger,
            user,
            "tdbank",
            Some(account),
            SourceType::Csv,
            &rows(&[
                ("2023-11-01", "Deposit", "100.00", "PAYROLL DEPOSIT"),
                ("2023-11-02", "Purchase", "25.00", "DEBIT CARD PURCHASE"),
                ("2023-11-03", "Purchase", "10.00", "COFFEE SHOP"),
            ]),
        )
        .unwrap();

        assert_eq!(outcome.created.len(), 3);
        assert_eq!(outcome.flagged_duplicates, 0);
        assert_eq!(outcome.skipped_in_batch, 0);
        assert_eq!(balance_of(&ledger, account), dec("565.00"));
        assert!(outcome.created.iter().all(|t| !t.needs_review));
    }

    #[test]
    fn test_reimport_flags_and_tags_duplicates() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let account = seed_account(&ledger, AccountType::Checking, "0");
        let batch = rows(&[("2023-11-01", "Deposit", "100.00", "PAYROLL DEPOSIT")]);

        bulk_import_transactions(&ledger, user, "tdbank", Some(account), SourceType::Csv, &batch)
            .unwrap();
        let second =
            bulk_import_transactions(&ledger, user, "tdbank", Some(account), SourceType::Csv, &batch)
                .unwrap();

        assert_eq!(second.created.len(), 1);
        assert_eq!(second.flagged_duplicates, 1);
        assert!(second.created[0].needs_review);

        let total: i64 = ledger
            .conn()
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 2);
        // Balance is double-counted until the review resolves the duplicate.
        assert_eq!(balance_of(&ledger, account), dec("200.00"));

        let tagged: i64 = ledger
            .conn()
            .query_row(
                "SELECT count(*) FROM transaction_tags tt JOIN tags t ON t.id = tt.tag_id \
                 WHERE t.name = 'duplicate'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tagged, 1);
    }

    #[test]
    fn test_in_batch_duplicate_dropped() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let account = seed_account(&ledger, AccountType::Checking, "0");

        let outcome = bulk_import_transactions(
            &ledger,
            user,
            "tdbank",
            Some(account),
            SourceType::Csv,
            &rows(&[
                ("2023-11-01", "Deposit", "100.00", "PAYROLL DEPOSIT"),
                ("2023-11-01", "Deposit", "100.00", "PAYROLL DEPOSIT"),
            ]),
        )
        .unwrap();

        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.skipped_in_batch, 1);
        assert_eq!(balance_of(&ledger, account), dec("100.00"));
    }

    #[test]
    fn test_unmappable_label_skipped() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let account = seed_account(&ledger, AccountType::Checking, "0");

        let outcome = bulk_import_transactions(
            &ledger,
            user,
            "tdbank",
            Some(account),
            SourceType::Csv,
            &rows(&[("2023-11-01", "Mystery", "100.00", "UNKNOWN ROW")]),
        )
        .unwrap();

        assert!(outcome.created.is_empty());
        assert_eq!(outcome.skipped_unmapped, 1);
        assert_eq!(balance_of(&ledger, account), dec("0"));
    }

    #[test]
    fn test_accountless_rows_need_review() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();

        let outcome = bulk_import_transactions(
            &ledger,
            user,
            "amex",
            None,
            SourceType::Pdf,
            &rows(&[("2023-11-01", "Purchase", "12.99", "COFFEE")]),
        )
        .unwrap();

        assert_eq!(outcome.created.len(), 1);
        assert!(outcome.created[0].needs_review);
        assert_eq!(outcome.created[0].account_id, None);
    }

    #[test]
    fn test_unknown_account_aborts_batch() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();

        let err = bulk_import_transactions(
            &ledger,
            user,
            "amex",
            Some(999),
            SourceType::Pdf,
            &rows(&[("2023-11-01", "Purchase", "12.99", "COFFEE")]),
        )
        .unwrap_err();
        assert!(matches!(err, PassbookError::UnknownAccount(_)));

        let total: i64 = ledger
            .conn()
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_interest_direction_depends_on_account_type() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let savings = seed_account(&ledger, AccountType::Savings, "100.00");
        let card = seed_account(&ledger, AccountType::CreditCard, "100.00");
        let batch = rows(&[("2023-11-30", "Interest", "10.00", "INTEREST")]);

        bulk_import_transactions(&ledger, user, "tdbank", Some(savings), SourceType::Pdf, &batch)
            .unwrap();
        bulk_import_transactions(&ledger, user, "amzn-synchrony", Some(card), SourceType::Pdf, &batch)
            .unwrap();

        assert_eq!(balance_of(&ledger, savings), dec("110.00"));
        assert_eq!(balance_of(&ledger, card), dec("90.00"));
    }

    #[test]
    fn test_standard_import_never_touches_investment_balance() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let brokerage = seed_account(&ledger, AccountType::Investment, "1000.00");

        bulk_import_transactions(
            &ledger,
            user,
            "schwab",
            Some(brokerage),
            SourceType::Pdf,
            &rows(&[("2023-11-01", "Deposit", "500.00", "WIRE IN")]),
        )
        .unwrap();

        assert_eq!(balance_of(&ledger, brokerage), dec("1000.00"));
    }

    #[test]
    fn test_investment_import_weighted_average_basis() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let brokerage = seed_account(&ledger, AccountType::Investment, "0");

        bulk_import_investment_transactions(
            &ledger,
            user,
            "schwab",
            Some(brokerage),
            SourceType::Pdf,
            &invest_rows(&[
                ("2024-05-01", "BUY", "VTI", "10", "100.00", "-1000.00"),
                ("2024-05-02", "BUY", "VTI", "10", "200.00", "-2000.00"),
                ("2024-05-03", "SELL", "VTI", "5", "210.00", "1050.00"),
            ]),
        )
        .unwrap();

        let holding = db::find_holding(ledger.conn(), brokerage, "VTI").unwrap().unwrap();
        assert_eq!(holding.quantity, dec("15"));
        assert_eq!(holding.average_cost_basis, dec("150"));
    }

    #[test]
    fn test_sell_without_holding_leaves_no_position() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let brokerage = seed_account(&ledger, AccountType::Investment, "0");

        let outcome = bulk_import_investment_transactions(
            &ledger,
            user,
            "schwab",
            Some(brokerage),
            SourceType::Pdf,
            &invest_rows(&[("2024-05-03", "SELL", "ZZZ", "5", "10.00", "50.00")]),
        )
        .unwrap();

        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].holding_id, None);
        assert!(db::find_holding(ledger.conn(), brokerage, "ZZZ").unwrap().is_none());
    }

    #[test]
    fn test_investment_reimport_flags_without_tag() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let brokerage = seed_account(&ledger, AccountType::Investment, "0");
        let batch = invest_rows(&[("2024-05-01", "BUY", "VTI", "10", "100.00", "-1000.00")]);

        bulk_import_investment_transactions(&ledger, user, "schwab", Some(brokerage), SourceType::Pdf, &batch)
            .unwrap();
        let second = bulk_import_investment_transactions(
            &ledger,
            user,
            "schwab",
            Some(brokerage),
            SourceType::Pdf,
            &batch,
        )
        .unwrap();

        assert_eq!(second.flagged_duplicates, 1);
        assert!(second.created[0].needs_review);
        let tags: i64 = ledger
            .conn()
            .query_row("SELECT count(*) FROM tags", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tags, 0);
        // The duplicate buy still moves the holding; review decides its fate.
        let holding = db::find_holding(ledger.conn(), brokerage, "VTI").unwrap().unwrap();
        assert_eq!(holding.quantity, dec("20"));
    }

    #[test]
    fn test_unmappable_investment_label_skipped() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let brokerage = seed_account(&ledger, AccountType::Investment, "0");

        let outcome = bulk_import_investment_transactions(
            &ledger,
            user,
            "tdameritrade",
            Some(brokerage),
            SourceType::Pdf,
            &invest_rows(&[
                ("2023-11-12", "Div/Int", "", "", "", "0.42"),
                ("2023-11-13", "Buy", "AAPL", "10", "185.50", "-1855.00"),
            ]),
        )
        .unwrap();

        assert_eq!(outcome.skipped_unmapped, 1);
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].transaction_type, InvestmentTransactionType::Buy);
    }

    #[test]
    fn test_create_transaction_duplicate_outcome() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let account = seed_account(&ledger, AccountType::Checking, "100.00");
        let new = NewTransaction {
            account_id: Some(account),
            category_id: None,
            subcategory_id: None,
            transaction_date: date("2023-11-01"),
            amount: dec("25.00"),
            transaction_type: TransactionType::Purchase,
            description: Some("BOOKSTORE".to_string()),
        };

        let first = create_transaction(&ledger, user, &new).unwrap();
        assert!(matches!(first, CreateOutcome::Created(_)));
        assert_eq!(balance_of(&ledger, account), dec("75.00"));

        let second = create_transaction(&ledger, user, &new).unwrap();
        assert!(matches!(second, CreateOutcome::Duplicate));
        let total: i64 = ledger
            .conn()
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(balance_of(&ledger, account), dec("75.00"));
    }

    #[test]
    fn test_create_investment_transaction_opens_holding() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let brokerage = seed_account(&ledger, AccountType::Investment, "0");
        let new = NewInvestmentTransaction {
            account_id: brokerage,
            transaction_date: date("2024-05-01"),
            transaction_type: InvestmentTransactionType::Buy,
            symbol: Some("VTI".to_string()),
            quantity: Some(dec("10")),
            price_per_share: Some(dec("100.00")),
            amount: dec("-1000.00"),
            description: Some("Bought 10 VTI".to_string()),
        };

        let first = create_investment_transaction(&ledger, user, &new).unwrap();
        assert!(matches!(first, CreateOutcome::Created(ref t) if t.holding_id.is_some()));
        let holding = db::find_holding(ledger.conn(), brokerage, "VTI").unwrap().unwrap();
        assert_eq!(holding.quantity, dec("10"));
        assert_eq!(holding.average_cost_basis, dec("100.00"));

        let second = create_investment_transaction(&ledger, user, &new).unwrap();
        assert!(matches!(second, CreateOutcome::Duplicate));
        let holding = db::find_holding(ledger.conn(), brokerage, "VTI").unwrap().unwrap();
        assert_eq!(holding.quantity, dec("10"));
    }

    #[test]
    fn test_category_rules() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let account = seed_account(&ledger, AccountType::Checking, "0");
        let food: i64 = ledger
            .conn()
            .query_row("SELECT id FROM categories WHERE name = 'Food'", [], |r| r.get(0))
            .unwrap();
        let groceries: i64 = ledger
            .conn()
            .query_row("SELECT id FROM categories WHERE name = 'Groceries'", [], |r| r.get(0))
            .unwrap();
        let housing: i64 = ledger
            .conn()
            .query_row("SELECT id FROM categories WHERE name = 'Housing'", [], |r| r.get(0))
            .unwrap();

        let base = NewTransaction {
            account_id: Some(account),
            category_id: Some(food),
            subcategory_id: Some(groceries),
            transaction_date: date("2023-11-01"),
            amount: dec("42.00"),
            transaction_type: TransactionType::Purchase,
            description: Some("MARKET".to_string()),
        };
        assert!(matches!(
            create_transaction(&ledger, user, &base).unwrap(),
            CreateOutcome::Created(_)
        ));

        // A subcategory cannot serve as the primary category.
        let sub_as_primary = NewTransaction {
            category_id: Some(groceries),
            subcategory_id: None,
            description: Some("BAD PRIMARY".to_string()),
            ..base.clone()
        };
        assert!(matches!(
            create_transaction(&ledger, user, &sub_as_primary).unwrap_err(),
            PassbookError::InvalidCategory(_)
        ));

        // Groceries does not belong to Housing.
        let wrong_parent = NewTransaction {
            category_id: Some(housing),
            subcategory_id: Some(groceries),
            description: Some("WRONG PARENT".to_string()),
            ..base.clone()
        };
        assert!(matches!(
            create_transaction(&ledger, user, &wrong_parent).unwrap_err(),
            PassbookError::InvalidCategory(_)
        ));

        let missing = NewTransaction {
            category_id: Some(9999),
            subcategory_id: None,
            description: Some("MISSING".to_string()),
            ..base.clone()
        };
        assert!(matches!(
            create_transaction(&ledger, user, &missing).unwrap_err(),
            PassbookError::UnknownCategory(9999)
        ));
    }

    #[test]
    fn test_update_transaction_replays_balance() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let account = seed_account(&ledger, AccountType::Checking, "100.00");

        let outcome = bulk_import_transactions(
            &ledger,
            user,
            "tdbank",
            Some(account),
            SourceType::Csv,
            &rows(&[("2023-11-01", "Purchase", "25.00", "BOOKSTORE")]),
        )
        .unwrap();
        let id = outcome.created[0].id;
        assert_eq!(balance_of(&ledger, account), dec("75.00"));

        update_transaction(
            &ledger,
            user,
            id,
            &TransactionUpdate {
                amount: Some(dec("40.00")),
                ..TransactionUpdate::default()
            },
        )
        .unwrap();
        assert_eq!(balance_of(&ledger, account), dec("60.00"));

        let updated = update_transaction(
            &ledger,
            user,
            id,
            &TransactionUpdate {
                transaction_type: Some(TransactionType::Credit),
                ..TransactionUpdate::default()
            },
        )
        .unwrap();
        assert_eq!(updated.transaction_type, TransactionType::Credit);
        assert_eq!(balance_of(&ledger, account), dec("140.00"));
    }

    #[test]
    fn test_delete_transaction_round_trip() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let account = seed_account(&ledger, AccountType::Checking, "500.00");

        let outcome = bulk_import_transactions(
            &ledger,
            user,
            "tdbank",
            Some(account),
            SourceType::Csv,
            &rows(&[("2023-11-01", "Purchase", "123.45", "FURNITURE")]),
        )
        .unwrap();
        assert_eq!(balance_of(&ledger, account), dec("376.55"));

        delete_transaction(&ledger, user, outcome.created[0].id).unwrap();
        assert_eq!(balance_of(&ledger, account), dec("500.00"));
        let total: i64 = ledger
            .conn()
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 0);

        assert!(matches!(
            delete_transaction(&ledger, user, outcome.created[0].id).unwrap_err(),
            PassbookError::NotFound(_)
        ));
    }

    #[test]
    fn test_relationships() {
        let (_dir, ledger) = test_ledger();
        let user = ledger.default_user_id().unwrap();
        let account = seed_account(&ledger, AccountType::Checking, "0");

        let outcome = bulk_import_transactions(
            &ledger,
            user,
            "tdbank",
            Some(account),
            SourceType::Csv,
            &rows(&[
                ("2023-11-01", "Purchase", "60.00", "RESTAURANT"),
                ("2023-11-05", "Credit", "60.00", "RESTAURANT REFUND"),
            ]),
        )
        .unwrap();
        let (a, b) = (outcome.created[0].id, outcome.created[1].id);

        let edge =
            create_relationship(&ledger, user, b, a, RelationshipType::Refunds, Some(dec("60.00")))
                .unwrap();
        assert_eq!(edge.relationship_type, RelationshipType::Refunds);

        let listed = list_relationships(&ledger, user, a).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].from_transaction_id, b);

        assert!(matches!(
            create_relationship(&ledger, user, b, a, RelationshipType::Refunds, None).unwrap_err(),
            PassbookError::Constraint(_)
        ));
        assert!(matches!(
            create_relationship(&ledger, user, a, a, RelationshipType::Splits, None).unwrap_err(),
            PassbookError::Constraint(_)
        ));

        delete_relationship(&ledger, user, edge.id).unwrap();
        assert!(list_relationships(&ledger, user, a).unwrap().is_empty());
    }
}
