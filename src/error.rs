//! Error types for streams, drivers and the feedback engine.
//!
//! Errors are values: a failing upstream delivers [`StreamError`] through
//! [`Event::Error`](crate::observable::Event::Error), a failing driver is
//! described by [`DriverError`], and the engine reports construction and
//! termination problems with [`CycleError`].
//!
//! # Examples
//!
//! ```rust
//! use cyclens::error::{DriverError, StreamError};
//!
//! let error = DriverError::failed("screen", "surface lost");
//! assert_eq!(format!("{error}"), "driver `screen` failed: surface lost");
//!
//! let stream_error: StreamError = error.into();
//! assert!(stream_error.driver_error().is_some());
//! ```

use thiserror::Error;

// =============================================================================
// StreamError
// =============================================================================

/// The error carried by a terminating stream.
///
/// `StreamError` is cloneable so that a single failure can be fanned out to
/// every observer of a shared stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A stream failed for a reason described by its producer.
    #[error("{origin}: {message}")]
    Failed {
        /// Name of the producer that failed.
        origin: String,
        /// Human readable failure description.
        message: String,
    },

    /// A driver failed while rendering or producing events.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl StreamError {
    /// Creates a [`StreamError::Failed`].
    pub fn failed(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Returns the driver failure, if this error originated in a driver.
    pub const fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Driver(error) => Some(error),
            Self::Failed { .. } => None,
        }
    }
}

// =============================================================================
// DriverError
// =============================================================================

/// A failure raised by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The driver reported a failure.
    #[error("driver `{driver}` failed: {message}")]
    Failed {
        /// Name of the driver.
        driver: String,
        /// Failure description.
        message: String,
    },

    /// The driver panicked while rendering.
    #[error("driver `{driver}` panicked: {message}")]
    Panicked {
        /// Name of the driver.
        driver: String,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The driver's upstream stream failed before the driver could handle it.
    #[error("driver `{driver}` lost its input: {message}")]
    InputFailed {
        /// Name of the driver.
        driver: String,
        /// Description of the upstream failure.
        message: String,
    },
}

impl DriverError {
    /// Creates a [`DriverError::Failed`].
    pub fn failed(driver: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            driver: driver.into(),
            message: message.into(),
        }
    }

    /// Creates a [`DriverError::Panicked`] from a panic payload.
    pub fn panicked(driver: impl Into<String>, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked {
            driver: driver.into(),
            message,
        }
    }

    /// Name of the driver that failed.
    pub fn driver(&self) -> &str {
        match self {
            Self::Failed { driver, .. }
            | Self::Panicked { driver, .. }
            | Self::InputFailed { driver, .. } => driver,
        }
    }
}

// =============================================================================
// CycleError
// =============================================================================

/// Errors reported by the feedback engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    /// The router could not build its drivers from the seed.
    #[error("failed to build drivers from the seed: {0}")]
    DriverConstruction(#[source] DriverError),

    /// The effect stream returned by the router failed; the loop stopped.
    #[error("effect stream failed: {0}")]
    StreamFailed(#[source] StreamError),

    /// The effect stream returned by the router completed; the loop stopped.
    #[error("effect stream completed")]
    StreamCompleted,

    /// The engine has already been disposed.
    #[error("engine already disposed")]
    Disposed,
}
