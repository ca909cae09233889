use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("{role} database not found: {path}")]
    MissingStore { role: &'static str, path: String },

    #[error("Sequence repair failed for {table}: {source}")]
    SequenceRepair {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid academic year: {0:?}")]
    InvalidYear(String),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
