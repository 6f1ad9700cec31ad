// File I/O operations

use std::fmt;

use rankgrid_engine::EngineError;

pub mod csv;
pub mod json;
pub mod store;

/// Store format version, written in the first record.
/// Increment when the layout changes in a way that old versions can't read
pub const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Debug)]
pub enum StoreError {
    /// File could not be read or written.
    Io(std::io::Error),
    /// Malformed input; `line` is 1-based, 0 when unknown.
    Parse { line: u64, message: String },
    /// Input parsed but describes an invalid page or session.
    Engine(EngineError),
}

impl StoreError {
    pub(crate) fn parse(line: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Parse { line: 0, message } => write!(f, "parse error: {message}"),
            Self::Parse { line, message } => write!(f, "parse error on line {line}: {message}"),
            Self::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Engine(e) => Some(e),
            Self::Parse { .. } => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<EngineError> for StoreError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

impl From<::csv::Error> for StoreError {
    fn from(e: ::csv::Error) -> Self {
        let line = e.position().map(|p| p.line()).unwrap_or(0);
        match e.into_kind() {
            ::csv::ErrorKind::Io(io) => Self::Io(io),
            kind => Self::parse(line, format!("{:?}", kind)),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Io(e.into())
    }
}
