//! Push-based streams.
//!
//! This module provides the stream substrate the feedback loop is built on:
//!
//! - [`Observable`]: a cold, lazily subscribed stream of values
//! - [`Observer`]: the receiving end of a subscription
//! - [`Subscription`] / [`SubscriptionBag`]: cancellation tokens
//! - [`LatestChannel`]: a single-slot replay channel with fan-out
//! - [`PublishSubject`]: a hot multicast stream without replay
//! - [`Scheduler`]: where deferred deliveries run
//!
//! Nothing happens until an observable is subscribed. Every operator is
//! subscription-time lazy: building a pipeline never evaluates user closures.
//!
//! # Examples
//!
//! ```rust
//! use cyclens::observable::Observable;
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let seen_clone = seen.clone();
//!
//! let subscription = Observable::from_iter(vec![1, 2, 3, 4])
//!     .filter(|value| value % 2 == 0)
//!     .map(|value| value * 10)
//!     .subscribe(move |value| seen_clone.lock().push(value));
//!
//! assert_eq!(*seen.lock(), vec![20, 40]);
//! subscription.cancel();
//! ```

mod operators;
pub mod scheduler;
mod share;
pub mod subject;
mod subscription;

#[cfg(feature = "async")]
pub mod bridge;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StreamError;

pub use scheduler::{ImmediateScheduler, ManualScheduler, Scheduler, TrampolineScheduler};
pub use subject::{DeliveryHold, LatestChannel, PublishSubject};
pub use subscription::{Subscription, SubscriptionBag};

#[cfg(feature = "async")]
pub use bridge::ObservableStream;
#[cfg(feature = "async")]
pub use scheduler::TokioScheduler;

/// Bounds shared by every value that flows through an [`Observable`].
///
/// Values are fanned out to several observers and may cross threads, so they
/// must be cloneable and thread-safe.
pub trait StreamValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> StreamValue for T {}

// =============================================================================
// Event
// =============================================================================

/// A single notification delivered to an [`Observer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T> {
    /// The next value of the stream.
    Next(T),
    /// The stream failed. Terminal.
    Error(StreamError),
    /// The stream finished. Terminal.
    Completed,
}

impl<T> Event<T> {
    /// Returns `true` for [`Event::Error`] and [`Event::Completed`].
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }

    /// Maps the value of a [`Event::Next`].
    pub fn map<U, F>(self, function: F) -> Event<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Next(value) => Event::Next(function(value)),
            Self::Error(error) => Event::Error(error),
            Self::Completed => Event::Completed,
        }
    }

    /// Returns the carried value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Next(value) => Some(value),
            Self::Error(_) | Self::Completed => None,
        }
    }
}

// =============================================================================
// Observer
// =============================================================================

type Handler<T> = dyn Fn(Event<T>) + Send + Sync + 'static;

struct ObserverInner<T> {
    handler: Box<Handler<T>>,
    stopped: Arc<AtomicBool>,
}

/// The receiving end of a subscription.
///
/// An observer delivers at most one terminal event; after that, or after
/// [`stop`](Self::stop), every notification is ignored. Cloning an observer
/// yields another handle to the same receiver.
pub struct Observer<T> {
    inner: Arc<ObserverInner<T>>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Observer<T> {
    /// Creates an observer from an event handler.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(Event<T>) + Send + Sync + 'static,
    {
        Self::with_stop_flag(Arc::new(AtomicBool::new(false)), handler)
    }

    /// Creates an observer that only cares about values.
    pub fn from_next<F>(on_next: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::new(move |event| {
            if let Event::Next(value) = event {
                on_next(value);
            }
        })
    }

    /// Creates an observer whose stopped state is shared with `stopped`.
    ///
    /// Operators that must stop their upstream from inside the handler keep a
    /// clone of the flag.
    pub(crate) fn with_stop_flag<F>(stopped: Arc<AtomicBool>, handler: F) -> Self
    where
        F: Fn(Event<T>) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ObserverInner {
                handler: Box::new(handler),
                stopped,
            }),
        }
    }

    /// Delivers an event, honouring the terminal contract.
    pub fn on_event(&self, event: Event<T>) {
        if self.is_stopped() {
            return;
        }
        if event.is_terminal() && self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        (self.inner.handler)(event);
    }

    /// Delivers a value.
    pub fn on_next(&self, value: T) {
        self.on_event(Event::Next(value));
    }

    /// Delivers a failure.
    pub fn on_error(&self, error: StreamError) {
        self.on_event(Event::Error(error));
    }

    /// Delivers completion.
    pub fn on_completed(&self) {
        self.on_event(Event::Completed);
    }

    /// Stops the observer without delivering anything.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
    }

    /// Returns `true` once the observer will ignore further events.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Observer")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// =============================================================================
// Observable
// =============================================================================

type SubscribeFn<T> = dyn Fn(Observer<T>) -> Subscription + Send + Sync + 'static;

/// A cold, push-based stream of values.
///
/// An `Observable` is a description of how to produce values for an
/// [`Observer`]. Each subscription runs that description independently; use
/// [`share`](Self::share) to turn it into a hot stream with a single upstream
/// subscription.
pub struct Observable<T> {
    subscribe: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe: self.subscribe.clone(),
        }
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Observable").finish_non_exhaustive()
    }
}

impl<T: StreamValue> Observable<T> {
    /// Creates an observable from a subscribe function.
    ///
    /// The function is invoked once per subscription and returns the
    /// subscription that tears the producer down.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cyclens::observable::{Observable, Subscription};
    ///
    /// let numbers = Observable::create(|observer| {
    ///     observer.on_next(1);
    ///     observer.on_next(2);
    ///     observer.on_completed();
    ///     Subscription::default()
    /// });
    /// # let _ = numbers;
    /// ```
    pub fn create<F>(subscribe: F) -> Self
    where
        F: Fn(Observer<T>) -> Subscription + Send + Sync + 'static,
    {
        Self {
            subscribe: Arc::new(subscribe),
        }
    }

    /// Emits `value` once, then completes.
    pub fn just(value: T) -> Self {
        Self::create(move |observer| {
            observer.on_next(value.clone());
            observer.on_completed();
            Subscription::default()
        })
    }

    /// Emits every item of `items`, then completes.
    ///
    /// Emission stops early once the observer is stopped.
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    {
        Self::create(move |observer| {
            for item in items.clone() {
                if observer.is_stopped() {
                    return Subscription::default();
                }
                observer.on_next(item);
            }
            observer.on_completed();
            Subscription::default()
        })
    }

    /// Completes immediately without emitting.
    pub fn empty() -> Self {
        Self::create(|observer| {
            observer.on_completed();
            Subscription::default()
        })
    }

    /// Never emits and never terminates.
    pub fn never() -> Self {
        Self::create(|_| Subscription::default())
    }

    /// Fails immediately with `error`.
    pub fn error(error: StreamError) -> Self {
        Self::create(move |observer| {
            observer.on_error(error.clone());
            Subscription::default()
        })
    }

    /// Subscribes an observer.
    ///
    /// Cancelling the returned subscription stops `observer` first, so no
    /// event reaches it afterwards even if the upstream is mid-delivery.
    /// The subscription cancels itself once `observer` stops, after a
    /// terminal event or because an operator such as [`take`](Self::take)
    /// stopped it, releasing the upstream's resources; a hot upstream
    /// therefore drops finished observers.
    pub fn subscribe_with(&self, observer: Observer<T>) -> Subscription {
        let subscription = Subscription::default();
        let finished = subscription.clone();
        let guard = observer.clone();
        let stopped = Arc::new(AtomicBool::new(false));
        let forward_stopped = stopped.clone();
        let forward = Observer::with_stop_flag(stopped, move |event: Event<T>| {
            observer.on_event(event);
            if observer.is_stopped() {
                forward_stopped.store(true, Ordering::Release);
                finished.cancel();
            }
        });
        let forward_guard = forward.clone();
        let upstream = (self.subscribe)(forward);
        // Runs at once if a terminal event arrived during subscription.
        subscription.add(move || {
            guard.stop();
            forward_guard.stop();
            upstream.cancel();
        });
        subscription
    }

    /// Subscribes a value handler, ignoring errors and completion.
    pub fn subscribe<F>(&self, on_next: F) -> Subscription
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe_with(Observer::from_next(on_next))
    }

    /// Subscribes one handler per kind of event.
    pub fn subscribe_all<N, E, C>(&self, on_next: N, on_error: E, on_completed: C) -> Subscription
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(StreamError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.subscribe_with(Observer::new(move |event| match event {
            Event::Next(value) => on_next(value),
            Event::Error(error) => on_error(error),
            Event::Completed => on_completed(),
        }))
    }

    /// Forwards every event of this observable into `channel`.
    pub fn bind_to(&self, channel: &LatestChannel<T>) -> Subscription {
        self.subscribe_with(channel.as_observer())
    }
}

static_assertions::assert_impl_all!(Observable<i32>: Send, Sync, Clone);
static_assertions::assert_impl_all!(Observer<String>: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rstest::rstest;

    fn record<T: StreamValue>(observable: &Observable<T>) -> Arc<Mutex<Vec<Event<T>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        observable.subscribe_with(Observer::new(move |event| events_clone.lock().push(event)));
        events
    }

    #[rstest]
    fn test_just_emits_then_completes() {
        let events = record(&Observable::just(7));
        assert_eq!(*events.lock(), vec![Event::Next(7), Event::Completed]);
    }

    #[rstest]
    fn test_error_is_terminal() {
        let error = StreamError::failed("test", "boom");
        let events = record(&Observable::<i32>::error(error.clone()));
        assert_eq!(*events.lock(), vec![Event::Error(error)]);
    }

    #[rstest]
    fn test_observer_ignores_events_after_terminal() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let observer = Observer::new(move |event| events_clone.lock().push(event));

        observer.on_next(1);
        observer.on_completed();
        observer.on_next(2);
        observer.on_completed();

        assert_eq!(*events.lock(), vec![Event::Next(1), Event::Completed]);
    }

    #[rstest]
    fn test_cancel_stops_delivery() {
        let subject = PublishSubject::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let subscription = subject
            .observable()
            .subscribe(move |value| events_clone.lock().push(value));

        subject.on_next(1);
        subscription.cancel();
        subject.on_next(2);

        assert_eq!(*events.lock(), vec![1]);
    }

    #[rstest]
    fn test_nothing_happens_before_subscribe() {
        let evaluated = Arc::new(AtomicBool::new(false));
        let evaluated_clone = evaluated.clone();
        let observable = Observable::just(1).map(move |value| {
            evaluated_clone.store(true, Ordering::SeqCst);
            value
        });

        assert!(!evaluated.load(Ordering::SeqCst));
        observable.subscribe(|_| {});
        assert!(evaluated.load(Ordering::SeqCst));
    }

    #[rstest]
    #[case(Event::Next(1), false)]
    #[case(Event::Completed, true)]
    #[case(Event::Error(StreamError::failed("x", "y")), true)]
    fn test_event_is_terminal(#[case] event: Event<i32>, #[case] expected: bool) {
        assert_eq!(event.is_terminal(), expected);
    }
}
