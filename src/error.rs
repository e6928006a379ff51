//! Errors of the scan-out presentation engine.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors thrown by [`PrimarySurface`](crate::PrimarySurface) and
/// [`OverlaySurface`](crate::OverlaySurface).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller-supplied argument was rejected before any hardware call
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The output lacks the capability required by the operation
    #[error("Unsupported on this output: {0}")]
    Unsupported(&'static str),
    /// The hardware rejected a submission or property update
    #[error(transparent)]
    Access(#[from] AccessError),
    /// A bounded wait for flip completion expired
    #[error("Timed out after {0:?} waiting for a pending flip to complete")]
    Timeout(Duration),
}

/// A failed hardware call, carrying the platform error code.
#[derive(Debug, thiserror::Error)]
#[error("Scan-out access error: {errmsg} on device `{dev:?}` ({source})")]
pub struct AccessError {
    /// Error message associated to the access error
    pub errmsg: &'static str,
    /// Device on which the error was generated
    pub dev: Option<PathBuf>,
    /// Underlying platform error
    pub source: io::Error,
}
