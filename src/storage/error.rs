use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
