//! The driver capability and its isolation boundary.
//!
//! A driver is anything that turns a stream of models into a stream of
//! events: a screen, an OS lifecycle bridge, a timer, a network peer. The
//! feedback loop never looks inside a driver; it only relies on the
//! [`Driver`] contract:
//!
//! 1. `rendered` may be called repeatedly without leaking subscriptions:
//!    a driver subscribes to its input once, lazily, on first demand, and
//!    keeps that subscription for its lifetime ([`RenderCache`] does this).
//! 2. The returned event stream is hot: several observers share one
//!    underlying execution.
//!
//! Drivers that prefer an imperative shape implement [`RenderDriver`]
//! (`render` + `events`) and are adapted with [`Rendering`].
//!
//! A driver failure must not stop the loop. [`isolate`] and
//! [`DriverExt::isolated`] catch errors, completion and panics of one driver,
//! log them, and apply a [`FailurePolicy`].

mod isolation;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};

use crate::error::DriverError;
use crate::observable::{Event, Observable, Observer, StreamValue};

pub use isolation::{DriverExt, FailurePolicy, Isolated, isolate};

// =============================================================================
// Driver
// =============================================================================

/// The capability every driver provides.
pub trait Driver {
    /// What the driver renders.
    type Model: StreamValue;
    /// What the driver reports back.
    type Event: StreamValue;

    /// Renders `models` and returns the driver's event stream.
    ///
    /// Implementations must subscribe to `models` at most once over the
    /// driver's lifetime and must return a hot stream.
    fn rendered(&self, models: Observable<Self::Model>) -> Observable<Self::Event>;
}

impl<D: Driver + ?Sized> Driver for Arc<D> {
    type Model = D::Model;
    type Event = D::Event;

    fn rendered(&self, models: Observable<Self::Model>) -> Observable<Self::Event> {
        (**self).rendered(models)
    }
}

// =============================================================================
// RenderCache
// =============================================================================

/// Caches the one shared event stream of a driver.
///
/// The first call to [`get_or_build`](Self::get_or_build) builds the stream
/// and makes it hot; later calls return the same stream and ignore their
/// builder. Since the stream is shared, its upstream (including the
/// driver's input) is subscribed once, when the first observer arrives.
///
/// # Examples
///
/// ```rust
/// use cyclens::driver::{Driver, RenderCache};
/// use cyclens::observable::Observable;
///
/// struct Doubler {
///     cache: RenderCache<i32>,
/// }
///
/// impl Driver for Doubler {
///     type Model = i32;
///     type Event = i32;
///
///     fn rendered(&self, models: Observable<i32>) -> Observable<i32> {
///         self.cache.get_or_build(|| models.map(|model| model * 2))
///     }
/// }
///
/// let driver = Doubler { cache: RenderCache::new() };
/// let first = driver.rendered(Observable::just(1));
/// let second = driver.rendered(Observable::just(100));
/// # let _ = (first, second);
/// ```
#[derive(Debug)]
pub struct RenderCache<E> {
    events: OnceLock<Observable<E>>,
}

impl<E: StreamValue> RenderCache<E> {
    /// Creates an empty cache.
    pub const fn new() -> Self {
        Self {
            events: OnceLock::new(),
        }
    }

    /// Returns the cached stream, building and sharing it on first call.
    pub fn get_or_build<F>(&self, build: F) -> Observable<E>
    where
        F: FnOnce() -> Observable<E>,
    {
        self.events.get_or_init(|| build().share()).clone()
    }

    /// Returns `true` once the stream has been built.
    pub fn is_built(&self) -> bool {
        self.events.get().is_some()
    }
}

impl<E: StreamValue> Default for RenderCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// RenderDriver
// =============================================================================

/// A driver with an imperative rendering side.
///
/// `render` is called for every model; `events` is the driver's own event
/// stream, independent of rendering.
pub trait RenderDriver: Send + Sync + 'static {
    /// What the driver renders.
    type Model: StreamValue;
    /// What the driver reports back.
    type Event: StreamValue;

    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Renders one model.
    fn render(&self, model: &Self::Model) -> Result<(), DriverError>;

    /// The driver's event stream.
    fn events(&self) -> Observable<Self::Event>;
}

/// Adapts a [`RenderDriver`] to the [`Driver`] contract.
///
/// Rendering failures and panics surface as a [`DriverError`] on the event
/// stream, where an isolation boundary can deal with them.
pub struct Rendering<D: RenderDriver> {
    driver: Arc<D>,
    cache: RenderCache<D::Event>,
}

impl<D: RenderDriver> Rendering<D> {
    /// Wraps `driver`.
    pub fn new(driver: D) -> Self {
        Self::from_arc(Arc::new(driver))
    }

    /// Wraps a driver that is shared elsewhere.
    pub const fn from_arc(driver: Arc<D>) -> Self {
        Self {
            driver,
            cache: RenderCache::new(),
        }
    }

    /// The wrapped driver.
    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }
}

impl<D: RenderDriver> Driver for Rendering<D> {
    type Model = D::Model;
    type Event = D::Event;

    fn rendered(&self, models: Observable<Self::Model>) -> Observable<Self::Event> {
        let driver = self.driver.clone();
        self.cache.get_or_build(move || {
            // Events first: a render that emits synchronously must find the
            // event stream connected.
            let renders = render_each(driver.clone(), models);
            Observable::merge(vec![driver.events(), renders])
        })
    }
}

/// Calls `render` for every model; emits nothing but failures.
fn render_each<D: RenderDriver>(driver: Arc<D>, models: Observable<D::Model>) -> Observable<D::Event> {
    Observable::create(move |observer: Observer<D::Event>| {
        let driver = driver.clone();
        models.subscribe_with(Observer::new(move |event: Event<D::Model>| match event {
            Event::Next(model) => {
                let outcome = catch_unwind(AssertUnwindSafe(|| driver.render(&model)));
                let failure = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(error)) => Some(error),
                    Err(payload) => Some(DriverError::panicked(driver.name(), payload.as_ref())),
                };
                if let Some(failure) = failure {
                    observer.on_error(failure.into());
                }
            }
            Event::Error(error) => observer.on_error(
                DriverError::InputFailed {
                    driver: driver.name().to_string(),
                    message: error.to_string(),
                }
                .into(),
            ),
            Event::Completed => observer.on_completed(),
        }))
    })
}
