//! The feedback engine.
//!
//! A [`Cycle`] threads an application state through a set of drivers and
//! back:
//!
//! ```text
//! seed ──► channel ──► Router::effects(incoming, drivers) ──► output ─┐
//!            ▲                                                        │
//!            └────────────────────── republish ◄──────────────────────┘
//! ```
//!
//! The channel is a [`LatestChannel`]: every driver reads the most recently
//! *published* state, and a late subscriber sees only that one state.
//!
//! # Bootstrap
//!
//! Starting the engine runs, in order:
//!
//! 1. create the channel;
//! 2. build the drivers from the seed ([`Router::drivers_from`]);
//! 3. obtain the output stream from [`Router::effects`];
//! 4. publish the seed;
//! 5. subscribe the output back onto the channel.
//!
//! The seed is published while nothing is subscribed, so it only becomes the
//! channel's latest value; wiring then replays it to every subscriber of
//! `incoming` before any driver event can arrive. Step 5 runs under a
//! [`DeliveryHold`](crate::observable::DeliveryHold): states produced while
//! drivers are still being wired are queued and broadcast once wiring is
//! complete. Every driver therefore observes the seed as state #0, and an
//! event a driver emits as soon as it is subscribed is folded into the seed
//! instead of being dropped.
//!
//! # Examples
//!
//! ```rust
//! use cyclens::cycle::{Cycle, Router, reduce};
//! use cyclens::error::DriverError;
//! use cyclens::observable::{Observable, PublishSubject};
//!
//! struct Counter {
//!     taps: PublishSubject<i64>,
//! }
//!
//! impl Router for Counter {
//!     type State = i64;
//!     type Drivers = PublishSubject<i64>;
//!
//!     fn seed(&self) -> i64 {
//!         0
//!     }
//!
//!     fn drivers_from(&self, _seed: &i64) -> Result<Self::Drivers, DriverError> {
//!         Ok(self.taps.clone())
//!     }
//!
//!     fn effects(&self, incoming: Observable<i64>, taps: &Self::Drivers) -> Observable<i64> {
//!         reduce(&taps.observable(), &incoming, |delta, total| total + delta)
//!     }
//! }
//!
//! let taps = PublishSubject::new();
//! let cycle = Cycle::new(Counter { taps: taps.clone() }).expect("drivers build");
//! taps.on_next(5);
//! taps.on_next(-2);
//! assert_eq!(cycle.latest(), Some(3));
//! ```

mod config;
pub mod cycled_lens;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Span;

use crate::error::{CycleError, DriverError};
use crate::observable::{Event, LatestChannel, Observable, Observer, StreamValue, SubscriptionBag};

pub use config::CycleConfig;
pub use cycled_lens::CycledLens;

// =============================================================================
// Router
// =============================================================================

/// The application policy a [`Cycle`] drives.
pub trait Router {
    /// The application state. Never mutated in place: each transition
    /// produces a new value.
    type State: StreamValue + PartialEq + fmt::Debug;

    /// The drivers this router composes, usually a struct or a tuple.
    type Drivers;

    /// The initial state, always published as state #0.
    fn seed(&self) -> Self::State;

    /// Builds the drivers from the seed.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] if a driver cannot be constructed; the
    /// engine then refuses to start.
    fn drivers_from(&self, seed: &Self::State) -> Result<Self::Drivers, DriverError>;

    /// Turns the incoming state stream into the stream of next states.
    ///
    /// Called once per engine. `incoming` replays the latest published state
    /// to every subscriber.
    fn effects(&self, incoming: Observable<Self::State>, drivers: &Self::Drivers) -> Observable<Self::State>;
}

/// Folds driver events into the next state.
///
/// Each event is combined with the most recently published state. Events
/// arriving before the first state are dropped. Inside a [`Cycle`] the seed
/// is replayed to `incoming`, which is subscribed before `events`, so every
/// driver event has a state to fold into.
///
/// # Arguments
///
/// * `events` - Driver events, usually merged from several drivers
/// * `incoming` - The engine's incoming state stream
/// * `reducer` - Computes the next state from an event and the latest state
pub fn reduce<E, S, F>(events: &Observable<E>, incoming: &Observable<S>, reducer: F) -> Observable<S>
where
    E: StreamValue,
    S: StreamValue,
    F: Fn(E, S) -> S + Send + Sync + 'static,
{
    events.with_latest_from(incoming, reducer)
}

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle of a [`Cycle`].
///
/// Effects flow only while `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Constructed, nothing subscribed.
    ///
    /// Only held while [`Cycle::new`] wires the loop; an engine handed back
    /// to the caller is already `Running`.
    Uninitialized,
    /// Subscribed; the loop is active.
    Running,
    /// Every subscription released; the channel is inert.
    Disposed,
}

// =============================================================================
// Feedback
// =============================================================================

pub(crate) type FailureSlot = Arc<Mutex<Option<CycleError>>>;

/// The observer that closes the fixed point.
///
/// Captures the channel handle, never the engine, so the engine can be
/// dropped while the subscription is still registered.
pub(crate) fn feedback<S>(channel: LatestChannel<S>, failure: FailureSlot, log_states: bool, span: Span) -> Observer<S>
where
    S: StreamValue + fmt::Debug,
{
    Observer::new(move |event: Event<S>| {
        let _entered = span.enter();
        match event {
            Event::Next(state) => {
                if log_states {
                    tracing::trace!(?state, "publishing state");
                }
                channel.publish(state);
            }
            Event::Error(error) => {
                tracing::error!(%error, "effect stream failed; the loop has stopped");
                *failure.lock() = Some(CycleError::StreamFailed(error.clone()));
                channel.error(error);
            }
            Event::Completed => {
                tracing::warn!("effect stream completed; the loop has stopped");
                *failure.lock() = Some(CycleError::StreamCompleted);
                channel.complete();
            }
        }
    })
}

// =============================================================================
// Cycle
// =============================================================================

/// The fixed-point engine.
///
/// Owns the router, its drivers, the channel and the subscription that
/// feeds the output back. Dropping the engine disposes it.
pub struct Cycle<R: Router> {
    router: R,
    drivers: R::Drivers,
    channel: LatestChannel<R::State>,
    subscriptions: SubscriptionBag,
    phase: Phase,
    failure: FailureSlot,
    config: CycleConfig,
    span: Span,
}

impl<R: Router> Cycle<R> {
    /// Starts an engine with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::DriverConstruction`] if the router cannot build
    /// its drivers.
    pub fn new(router: R) -> Result<Self, CycleError> {
        Self::with_config(router, CycleConfig::default())
    }

    /// Starts an engine with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::DriverConstruction`] if the router cannot build
    /// its drivers.
    pub fn with_config(router: R, config: CycleConfig) -> Result<Self, CycleError> {
        let span = tracing::info_span!("cycle", name = %config.name());
        let channel = LatestChannel::new();
        let seed = router.seed();
        let drivers = span
            .in_scope(|| router.drivers_from(&seed))
            .map_err(CycleError::DriverConstruction)?;

        let mut cycle = Self {
            router,
            drivers,
            channel,
            subscriptions: SubscriptionBag::new(),
            phase: Phase::Uninitialized,
            failure: Arc::new(Mutex::new(None)),
            config,
            span,
        };
        cycle.start(seed);
        Ok(cycle)
    }

    fn start(&mut self, seed: R::State) {
        let _entered = self.span.clone().entered();
        let incoming = if self.config.dedupes_states() {
            self.channel.observable().distinct_until_changed()
        } else {
            self.channel.observable()
        };
        let output = self.router.effects(incoming, &self.drivers);

        tracing::debug!(?seed, "publishing seed");
        self.channel.publish(seed);
        let hold = self.channel.hold();
        let feedback = feedback(
            self.channel.clone(),
            self.failure.clone(),
            self.config.logs_states(),
            self.span.clone(),
        );
        self.subscriptions.insert(output.subscribe_with(feedback));
        self.phase = Phase::Running;
        tracing::info!("cycle started");
        drop(hold);
    }

    /// Stops the loop.
    ///
    /// Cancels the feedback subscription and completes the channel, so
    /// drivers observe termination. Idempotent.
    pub fn dispose(&mut self) {
        if self.phase == Phase::Disposed {
            return;
        }
        self.subscriptions.dispose();
        self.channel.complete();
        self.phase = Phase::Disposed;
        let _entered = self.span.enter();
        tracing::info!("cycle disposed");
    }

    /// The current lifecycle phase.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The most recently published state.
    pub fn latest(&self) -> Option<R::State> {
        self.channel.latest()
    }

    /// A read-only view of the published states.
    ///
    /// A new subscriber receives the latest state first, then every later
    /// one.
    pub fn states(&self) -> Observable<R::State> {
        self.channel.observable()
    }

    /// The drivers built from the seed.
    pub const fn drivers(&self) -> &R::Drivers {
        &self.drivers
    }

    /// The router.
    pub const fn router(&self) -> &R {
        &self.router
    }

    /// The configuration the engine was started with.
    pub const fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// Why the loop stopped on its own, if it did.
    ///
    /// `None` while the loop runs and after an explicit [`dispose`](Self::dispose).
    pub fn failure(&self) -> Option<CycleError> {
        self.failure.lock().clone()
    }

    /// Returns `Err` if the loop is not running.
    ///
    /// # Errors
    ///
    /// [`CycleError::Disposed`] after disposal, or the recorded failure if
    /// the effect stream terminated.
    pub fn ensure_running(&self) -> Result<(), CycleError> {
        if self.phase == Phase::Disposed {
            return Err(CycleError::Disposed);
        }
        self.failure().map_or(Ok(()), Err)
    }
}

impl<R: Router> Drop for Cycle<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<R: Router> fmt::Debug for Cycle<R> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Cycle")
            .field("name", &self.config.name())
            .field("phase", &self.phase)
            .field("latest", &self.channel.latest())
            .field("failure", &self.failure())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::observable::PublishSubject;
    use rstest::rstest;

    struct Echo {
        events: PublishSubject<i32>,
        broken: bool,
    }

    impl Router for Echo {
        type State = i32;
        type Drivers = PublishSubject<i32>;

        fn seed(&self) -> i32 {
            10
        }

        fn drivers_from(&self, seed: &i32) -> Result<Self::Drivers, DriverError> {
            if self.broken {
                return Err(DriverError::failed("echo", format!("cannot start from {seed}")));
            }
            Ok(self.events.clone())
        }

        fn effects(&self, incoming: Observable<i32>, drivers: &Self::Drivers) -> Observable<i32> {
            reduce(&drivers.observable(), &incoming, |event, state| state + event)
        }
    }

    fn echo() -> (PublishSubject<i32>, Cycle<Echo>) {
        let events = PublishSubject::new();
        let cycle = Cycle::new(Echo {
            events: events.clone(),
            broken: false,
        })
        .expect("drivers build");
        (events, cycle)
    }

    #[rstest]
    fn test_start_publishes_seed_and_runs() {
        let (_, cycle) = echo();
        assert_eq!(cycle.phase(), Phase::Running);
        assert_eq!(cycle.latest(), Some(10));
        assert!(cycle.ensure_running().is_ok());
    }

    #[rstest]
    fn test_driver_construction_failure() {
        let result = Cycle::new(Echo {
            events: PublishSubject::new(),
            broken: true,
        });
        assert!(matches!(result, Err(CycleError::DriverConstruction(error)) if error.driver() == "echo"));
    }

    #[rstest]
    fn test_dispose_is_idempotent_and_stops_publishes() {
        let (events, mut cycle) = echo();
        events.on_next(1);
        cycle.dispose();
        cycle.dispose();
        events.on_next(100);

        assert_eq!(cycle.phase(), Phase::Disposed);
        assert_eq!(cycle.latest(), Some(11));
        assert_eq!(cycle.failure(), None);
        assert_eq!(cycle.ensure_running(), Err(CycleError::Disposed));
    }

    #[rstest]
    #[case::failed(Event::Error(StreamError::failed("echo", "lost")), CycleError::StreamFailed(StreamError::failed("echo", "lost")))]
    #[case::completed(Event::Completed, CycleError::StreamCompleted)]
    fn test_output_termination_is_recorded(#[case] terminal: Event<i32>, #[case] expected: CycleError) {
        let (events, cycle) = echo();
        events.as_observer().on_event(terminal);

        assert_eq!(cycle.phase(), Phase::Running);
        assert_eq!(cycle.failure(), Some(expected.clone()));
        assert_eq!(cycle.ensure_running(), Err(expected));
    }
}
