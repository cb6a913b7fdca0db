//! Repository error kinds and the store failure classifier.
//!
//! # Responsibility
//! - Define the closed set of error kinds every core operation may return.
//! - Decide whether a store failure means "resource not found".
//!
//! # Invariants
//! - Error kinds are values; nothing is raised across the core boundary.
//! - `code()` strings are stable and safe to show to transport callers.

use crate::repo::decode::DecodeError;
use crate::store::StoreError;
use log::{info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CoreResult<T> = Result<T, ErrorKind>;

/// Resource a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Channel,
    Entry,
}

/// Outcome kinds of a failed core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound(Resource),
    /// A read or write against the store failed for any other reason.
    UnsuccessfulResponse,
    /// The entry search failed for a reason other than a missing channel.
    UnsuccessfulSearch,
    /// A delete failed for a reason other than a missing resource.
    UnsuccessfulDelete,
    /// The stored document has no readable field bag.
    SourceNotAccessible,
    /// The field bag lacks a required key or has a wrong shape.
    SourceKeysNotAllAccessible,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound(Resource::Channel) => "ERR_CHANNEL_NOT_FOUND",
            Self::NotFound(Resource::Entry) => "ERR_ENTRY_NOT_FOUND",
            Self::UnsuccessfulResponse => "ERR_ES_UNSUCCESSFUL_RESPONSE",
            Self::UnsuccessfulSearch => "ERR_ES_UNSUCCESSFUL_SEARCH",
            Self::UnsuccessfulDelete => "ERR_ES_UNSUCCESSFUL_DELETE",
            Self::SourceNotAccessible => "ERR_ES_SOURCE_NOT_ACCESSIBLE",
            Self::SourceKeysNotAllAccessible => "ERR_ES_SOURCE_KEYS_NOT_ALL_ACCESSIBLE",
        }
    }

    pub fn is_not_found(self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(Resource::Channel) => {
                write!(f, "the requested channel could not be found")
            }
            Self::NotFound(Resource::Entry) => write!(f, "the requested entry could not be found"),
            Self::UnsuccessfulResponse => write!(f, "the store did not complete the request"),
            Self::UnsuccessfulSearch => write!(f, "the store could not search the channel"),
            Self::UnsuccessfulDelete => write!(f, "the store could not delete the resource"),
            Self::SourceNotAccessible => {
                write!(f, "the stored entry document has no accessible source")
            }
            Self::SourceKeysNotAllAccessible => {
                write!(f, "not all required keys of the stored entry document are accessible")
            }
        }
    }
}

impl Error for ErrorKind {}

impl From<DecodeError> for ErrorKind {
    fn from(value: DecodeError) -> Self {
        match value {
            DecodeError::SourceNotAccessible => Self::SourceNotAccessible,
            DecodeError::KeyNotAccessible(_) => Self::SourceKeysNotAllAccessible,
        }
    }
}

/// Returns whether a store failure signals an absent collection or document.
pub fn is_not_found(err: &StoreError) -> bool {
    matches!(err, StoreError::NotFound(_))
}

/// Picks `NotFound(resource)` for absence signals and `otherwise` for every
/// other store failure.
pub(crate) fn classify(err: &StoreError, resource: Resource, otherwise: ErrorKind) -> ErrorKind {
    if is_not_found(err) {
        ErrorKind::NotFound(resource)
    } else {
        otherwise
    }
}

/// Logs a failed store call; absence is expected traffic, anything else is
/// a warning.
pub(crate) fn log_store_failure(event: &str, target: &str, err: &StoreError) {
    if is_not_found(err) {
        info!("event={event} module=repo status=not_found {target}");
    } else {
        warn!("event={event} module=repo status=error {target} error={err}");
    }
}
