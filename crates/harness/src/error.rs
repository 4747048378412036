//! Error types for the harness

use std::net::SocketAddr;

use thiserror::Error;

use crate::driver::DriverError;

/// Result type alias using the harness error
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// Harness error taxonomy
///
/// Setup failures (bind, certificate load, launch) are fatal for the scope
/// that hit them and are never caught by the harness itself. Teardown
/// failures are reported through [`Teardown`](HarnessError::Teardown) only
/// when they fall outside the tolerated set; tolerated ones surface as
/// [`CloseOutcome::Tolerated`] instead of an error.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("address already in use: {addr}")]
    AddressInUse { addr: SocketAddr },

    #[error("TLS certificate material rejected: {0}")]
    Certificate(String),

    #[error("browser failed to launch: {0}")]
    Launch(String),

    #[error("{0} is closed and cannot be used")]
    InvalidState(&'static str),

    #[error("{name} does not exist in either golden directory")]
    GoldenMissing { name: String },

    #[error("closing {resource} failed")]
    Teardown {
        resource: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Outcome of a best-effort close.
///
/// Distinguishes a clean close from one that hit an error the component
/// tolerates during ordinary interleaved shutdown (a connection that the
/// exiting session already dropped, a page-level error on an already-gone
/// page). Reportable errors are returned as `Err` instead, so the caller
/// decides whether to surface them as teardown failures.
#[derive(Debug)]
pub enum CloseOutcome {
    /// The resource closed without incident.
    Clean,
    /// The close hit an expected shutdown-ordering error; the resource is
    /// gone either way.
    Tolerated(DriverError),
}

impl CloseOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, CloseOutcome::Clean)
    }
}
