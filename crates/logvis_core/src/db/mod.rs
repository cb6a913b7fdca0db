//! Embedded store database: connection bootstrap and table layout upgrades.
//!
//! # Responsibility
//! - Hand `SqliteDocumentStore` connections whose `collections`/`documents`
//!   tables are at the layout this build understands.
//!
//! # Invariants
//! - The layout version lives in `PRAGMA user_version`.
//! - A file written by a newer build is refused, never downgraded.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failure while opening or upgrading the embedded store database.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file carries a layout newer than this build.
    LayoutTooNew { found: u32, supported: u32 },
    /// An upgrade step failed; the whole upgrade was rolled back.
    UpgradeFailed {
        version: u32,
        source: rusqlite::Error,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::LayoutTooNew { found, supported } => write!(
                f,
                "store file layout v{found} was written by a newer build (this build reads up to v{supported})"
            ),
            Self::UpgradeFailed { version, source } => {
                write!(f, "store layout upgrade to v{version} failed: {source}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::UpgradeFailed { source: err, .. } => Some(err),
            Self::LayoutTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
