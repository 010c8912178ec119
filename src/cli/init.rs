use std::path::PathBuf;

use crate::db::Ledger;
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }

    let dir = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&dir)?;

    let db_path = dir.join("passbook.db");
    let ledger = Ledger::open_path(&db_path)?;
    ledger.init()?;
    save_settings(&settings)?;

    println!("Data dir:   {}", dir.display());
    println!("Database:   {}", db_path.display());
    println!();
    println!("Ready. Add an account with `passbook accounts add`.");
    Ok(())
}
