//! One isolation boundary per driver.
//!
//! Without isolation a single failing driver terminates the merged effect
//! stream and with it the whole loop. [`isolate`] sits between a driver's
//! event stream and the merge: errors are logged and handled by a
//! [`FailurePolicy`], completion is logged and swallowed. The merged stream
//! only ever sees values.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::Driver;
use crate::error::{DriverError, StreamError};
use crate::observable::{Event, Observable, Observer, StreamValue};

// =============================================================================
// FailurePolicy
// =============================================================================

/// What an isolated driver does after it failed.
pub enum FailurePolicy<E> {
    /// Stop emitting; the rest of the loop keeps running.
    Silence,
    /// Emit one degraded event describing the failure, then stop emitting.
    Degrade(Arc<dyn Fn(&DriverError) -> E + Send + Sync>),
}

impl<E> FailurePolicy<E> {
    /// Builds a [`FailurePolicy::Degrade`].
    pub fn degrade<F>(function: F) -> Self
    where
        F: Fn(&DriverError) -> E + Send + Sync + 'static,
    {
        Self::Degrade(Arc::new(function))
    }
}

impl<E> Clone for FailurePolicy<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Silence => Self::Silence,
            Self::Degrade(function) => Self::Degrade(function.clone()),
        }
    }
}

impl<E> Default for FailurePolicy<E> {
    fn default() -> Self {
        Self::Silence
    }
}

impl<E> fmt::Debug for FailurePolicy<E> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silence => formatter.write_str("Silence"),
            Self::Degrade(_) => formatter.write_str("Degrade(..)"),
        }
    }
}

// =============================================================================
// isolate
// =============================================================================

/// Wraps one driver's event stream in an isolation boundary.
///
/// # Examples
///
/// ```rust
/// use cyclens::driver::{FailurePolicy, isolate};
/// use cyclens::error::StreamError;
/// use cyclens::observable::Observable;
/// use std::sync::Arc;
/// use parking_lot::Mutex;
///
/// let failing = Observable::<String>::error(StreamError::failed("peer", "disconnected"));
/// let isolated = isolate(
///     "peer",
///     failing,
///     FailurePolicy::degrade(|error| format!("offline: {error}")),
/// );
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let seen_clone = seen.clone();
/// isolated.subscribe(move |event| seen_clone.lock().push(event));
/// assert_eq!(seen.lock().len(), 1);
/// ```
pub fn isolate<E: StreamValue>(
    name: impl Into<String>,
    events: Observable<E>,
    policy: FailurePolicy<E>,
) -> Observable<E> {
    let name: Arc<str> = name.into().into();
    Observable::create(move |observer: Observer<E>| {
        let name = name.clone();
        let policy = policy.clone();
        events.subscribe_with(Observer::new(move |event: Event<E>| match event {
            Event::Next(value) => observer.on_next(value),
            Event::Error(error) => {
                let failure = as_driver_error(&name, error);
                tracing::warn!(driver = %name, error = %failure, "driver failed; isolating it from the loop");
                if let FailurePolicy::Degrade(degrade) = &policy {
                    observer.on_next(degrade(&failure));
                }
            }
            Event::Completed => {
                tracing::debug!(driver = %name, "driver event stream completed");
            }
        }))
    })
}

fn as_driver_error(name: &str, error: StreamError) -> DriverError {
    match error {
        StreamError::Driver(failure) => failure,
        StreamError::Failed { origin, message } => DriverError::failed(name, format!("{origin}: {message}")),
    }
}

// =============================================================================
// Isolated
// =============================================================================

/// A driver whose failures cannot terminate the loop.
///
/// Panics raised by the wrapped driver's `rendered` are caught as well.
pub struct Isolated<D: Driver> {
    driver: D,
    name: String,
    policy: FailurePolicy<D::Event>,
}

impl<D: Driver> Isolated<D> {
    /// Wraps `driver` under `name` with `policy`.
    pub fn new(driver: D, name: impl Into<String>, policy: FailurePolicy<D::Event>) -> Self {
        Self {
            driver,
            name: name.into(),
            policy,
        }
    }

    /// The wrapped driver.
    pub const fn inner(&self) -> &D {
        &self.driver
    }

    /// The name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<D: Driver> Driver for Isolated<D> {
    type Model = D::Model;
    type Event = D::Event;

    fn rendered(&self, models: Observable<Self::Model>) -> Observable<Self::Event> {
        let events = catch_unwind(AssertUnwindSafe(|| self.driver.rendered(models)))
            .unwrap_or_else(|payload| {
                Observable::error(DriverError::panicked(self.name.clone(), payload.as_ref()).into())
            });
        isolate(self.name.clone(), events, self.policy.clone())
    }
}

impl<D: Driver + fmt::Debug> fmt::Debug for Isolated<D> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Isolated")
            .field("driver", &self.driver)
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Extension methods for every [`Driver`].
pub trait DriverExt: Driver + Sized {
    /// Wraps the driver in an isolation boundary.
    fn isolated(self, name: impl Into<String>, policy: FailurePolicy<Self::Event>) -> Isolated<Self> {
        Isolated::new(self, name, policy)
    }
}

impl<D: Driver> DriverExt for D {}
