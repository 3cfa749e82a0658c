use thiserror::Error;

/// Errors surfaced by the tiered backend and the fetch engine.
///
/// Backend implementations signal domain conditions (`NoNewData`,
/// `IllegalParam`, `IllegalOffset`) which the reader maps to
/// [`GetMessageStatus`](crate::model::GetMessageStatus) codes; nothing in
/// this enum escapes the public fetch surface.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested offset is at the committed tail; nothing to read yet.
    #[error("no new data at offset {0}")]
    NoNewData(i64),

    #[error("illegal parameter: {0}")]
    IllegalParam(String),

    #[error("illegal offset {offset}: {reason}")]
    IllegalOffset { offset: i64, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
