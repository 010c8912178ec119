use std::path::{Path, PathBuf};

use crate::error::{PassbookError, Result};
use crate::importer::process_statement;
use crate::parse;
use crate::settings::{load_settings, Config};
use crate::storage::{LocalStore, ObjectStore};

pub fn run(file: &str, institution_key: &str, account: Option<i64>, user: Option<i64>) -> Result<()> {
    let institution = parse::get_by_key(institution_key).ok_or_else(|| {
        let known: Vec<&str> = parse::ALL_INSTITUTIONS.iter().map(|i| i.key()).collect();
        PassbookError::UnknownInstitution(format!(
            "'{institution_key}' (expected one of: {})",
            known.join(", ")
        ))
    })?;

    let settings = load_settings();
    let ledger = crate::db::Ledger::open(&Config::from_settings(&settings))?;
    let user_id = super::resolve_user(&ledger, user)?;

    // Stage the file into the statement store so ingestion owns its copy;
    // the staged object is removed once the import lands.
    let path = Path::new(file);
    let bytes = std::fs::read(path)?;
    let key = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PassbookError::Other(format!("cannot derive an object key from '{file}'")))?;
    let store = LocalStore::new(&PathBuf::from(&settings.data_dir).join("statements"))?;
    store.store(key, &bytes)?;

    let outcome = process_statement(&ledger, &store, user_id, key, institution, account)?;

    let t = &outcome.transactions;
    let i = &outcome.investments;
    if t.created.is_empty() && i.created.is_empty() && t.flagged_duplicates == 0 && t.skipped_in_batch == 0
    {
        println!("No transactions found in the statement.");
        return Ok(());
    }

    println!(
        "{} transactions imported ({} flagged as duplicates, {} repeated rows dropped)",
        t.created.len(),
        t.flagged_duplicates,
        t.skipped_in_batch
    );
    if !i.created.is_empty() || i.flagged_duplicates > 0 || i.skipped_in_batch > 0 {
        println!(
            "{} investment transactions imported ({} flagged as duplicates, {} repeated rows dropped)",
            i.created.len(),
            i.flagged_duplicates,
            i.skipped_in_batch
        );
    }
    if t.skipped_unmapped > 0 || i.skipped_unmapped > 0 {
        println!(
            "{} rows skipped (unrecognized transaction type)",
            t.skipped_unmapped + i.skipped_unmapped
        );
    }
    match outcome.account_id {
        Some(id) => println!("Attached to account {id}."),
        None => println!("No account matched; imported rows are flagged for review."),
    }
    Ok(())
}
