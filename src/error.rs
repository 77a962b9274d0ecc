//! Peripheral errors

use crate::gap::AdvertiseFailure;
use core::fmt;

/// General error type of the peripheral
///
/// Configuration errors (`InvalidArgument`, `NotFound`, `AlreadyStarted`) are returned directly by
/// the method that caused them. The outcome of starting the server is delivered through the future
/// returned by [`Server::start`](crate::Server::start).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A malformed UUID or a permission/property bit outside of the valid set
    InvalidArgument(String),
    /// A service or characteristic is not within the registry
    NotFound(String),
    /// The registry was frozen by starting the server
    AlreadyStarted,
    /// There is no radio or the radio is not enabled
    RadioUnavailable,
    /// The radio reported a failure to start advertising
    AdvertiseError(AdvertiseFailure),
    /// The server is waiting for the result of a start
    ///
    /// Stopping while the start is pending would require stopping an advertising session that the
    /// radio has not finished creating.
    StartPending,
    /// A command could not be issued to the radio
    Radio { command: &'static str, reason: String },
    /// The pending start was dropped before the radio reported a result
    Cancelled,
}

impl Error {
    pub(crate) fn radio<E: fmt::Display>(command: &'static str, e: E) -> Self {
        Error::Radio {
            command,
            reason: e.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidArgument(reason) => write!(f, "invalid argument: {}", reason),
            Error::NotFound(what) => write!(f, "{} not found", what),
            Error::AlreadyStarted => f.write_str("the server is already started"),
            Error::RadioUnavailable => f.write_str("bluetooth radio is unavailable or disabled"),
            Error::AdvertiseError(failure) => write!(f, "advertising failed to start: {}", failure),
            Error::StartPending => f.write_str("the server is waiting for advertising to start"),
            Error::Radio { command, reason } => write!(f, "radio command '{}' failed: {}", command, reason),
            Error::Cancelled => f.write_str("start was cancelled before the radio reported a result"),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::uuid::UuidFormatError> for Error {
    fn from(e: crate::uuid::UuidFormatError) -> Self {
        Error::InvalidArgument(e.to_string())
    }
}
