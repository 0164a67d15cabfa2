use std::fmt;

use paxlane_store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// The backing store is unreachable; the run is aborted. Row-level store
    /// problems never surface here — they are logged per record and skipped.
    Store(StoreError),
    /// Bad run options (zero workers, unknown step number, etc.).
    InvalidOptions(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store failure: {e}"),
            Self::InvalidOptions(msg) => write!(f, "invalid options: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::InvalidOptions(_) => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
