use std::fmt;

/// Builds an [`Error`] variant from a format string, e.g.
/// `err!(Storage, "page {} not resident", page_num)`.
macro_rules! err {
    ($variant:ident, $($arg:tt)*) => {
        $crate::errors::Error::$variant(format!($($arg)*))
    };
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// Corrupt or inconsistent on-disk state.
    Storage(String),
    /// Input that could not be parsed into a command.
    Syntax(String),
    /// Input that parsed but violates the table schema.
    Schema(String),
    /// A page guard could not be acquired.
    Lock(String),
    /// The key being inserted already exists in the tree.
    DuplicateKey,
    /// The pager ran out of page slots.
    TableFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error. {}", e),
            Error::Storage(msg) => write!(f, "Storage error. {}", msg),
            Error::Syntax(msg) => write!(f, "{}", msg),
            Error::Schema(msg) => write!(f, "{}", msg),
            Error::Lock(msg) => write!(f, "Lock error. {}", msg),
            Error::DuplicateKey => write!(f, "Duplicate key."),
            Error::TableFull => write!(f, "Table full."),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
