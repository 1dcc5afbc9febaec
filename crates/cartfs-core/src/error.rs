//! Driver error types.

use cartfs_client::BusError;
use thiserror::Error;

use crate::{cache::CacheError, fs::FsError};

/// Any failure surfaced by the public driver API.
///
/// Inner layers return their own typed errors; this enum flattens them so
/// callers match on one type. No variant is retried anywhere - the
/// controller is assumed correct, and local errors mean the caller broke a
/// precondition (bad handle, seek past end) or the device ran out of slots.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Bus transport failure or controller rejection.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// File table bookkeeping failure.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Cache invariant violation. A programming bug, reported rather than
    /// recovered from.
    #[error(transparent)]
    Cache(#[from] CacheError),
}
