use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// The backing store is unreachable or a statement failed outright.
    /// This is the only store error that aborts a run.
    Unavailable(String),
    /// A stored value failed to decode.
    Corrupt { what: String, detail: String },
    /// A write referenced a row that does not exist.
    MissingRow(String),
}

impl StoreError {
    /// Whether the error means the whole store is gone, as opposed to a
    /// row-level problem that per-record processing can log and skip.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            Self::Corrupt { what, detail } => write!(f, "corrupt {what}: {detail}"),
            Self::MissingRow(what) => write!(f, "missing row: {what}"),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;
