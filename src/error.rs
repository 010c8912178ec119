use thiserror::Error;

#[derive(Error, Debug)]
pub enum PassbookError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("Unknown user id: {0}")]
    UnknownUser(i64),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Unknown institution: {0}")]
    UnknownInstitution(String),

    #[error("Unknown category id: {0}")]
    UnknownCategory(i64),

    #[error("Invalid category assignment: {0}")]
    InvalidCategory(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed due to a data constraint: {0}")]
    Constraint(String),

    #[error("Price service error: {0}")]
    Http(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PassbookError>;
