//! A self-referential lens.
//!
//! [`CycledLens`] is the thin variant of [`Cycle`](super::Cycle) used when the
//! thing being driven is itself a lens rather than a router: a closure
//! receives the state stream and returns a lens over it. The lens's view
//! becomes the exposed *receiver* (for instance a root view model), and its
//! effect streams are merged and fed back into the state stream.
//!
//! Two details keep the loop finite and shallow:
//!
//! - the state stream handed to the closure drops consecutive equal states,
//!   so a reducer returning an unchanged state does not wake every driver
//!   again;
//! - effects are re-delivered through a [`Scheduler`], so a state produced
//!   while handling another state is published on the next tick instead of
//!   on the same stack frame.
//!
//! # Examples
//!
//! ```rust
//! use cyclens::cycle::CycledLens;
//! use cyclens::observable::ManualScheduler;
//!
//! let scheduler = ManualScheduler::new();
//! let cycled = CycledLens::new(scheduler.clone(), |states| {
//!     states
//!         .lens(
//!             |_| "root",
//!             |_, states| vec![states.filter(|state| *state < 3).map(|state| state + 1)],
//!         )
//!         .prefixed_with(0)
//! });
//!
//! assert_eq!(cycled.receiver(), &"root");
//! assert_eq!(cycled.latest(), None);
//!
//! scheduler.run_until_idle();
//! assert_eq!(cycled.latest(), Some(3));
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{FailureSlot, feedback};
use crate::error::CycleError;
use crate::lens::MutatingLens;
use crate::observable::{LatestChannel, Observable, Scheduler, StreamValue, SubscriptionBag};

/// The lens a [`CycledLens`] closure returns: a view `R` over the state
/// stream and the effect streams that produce the next states.
pub type StateLens<S, R> = MutatingLens<Observable<S>, R, Observable<S>>;

/// A lens whose effects feed its own input.
pub struct CycledLens<S: StreamValue, R> {
    receiver: R,
    producer: LatestChannel<S>,
    subscriptions: SubscriptionBag,
    failure: FailureSlot,
    disposed: bool,
}

impl<S, R> CycledLens<S, R>
where
    S: StreamValue + PartialEq + fmt::Debug,
{
    /// Builds the lens and closes the loop.
    ///
    /// `function` runs once, now. Effects are delivered through `scheduler`;
    /// with a deferring scheduler no state is published before its first
    /// tick.
    pub fn new<Sch, F>(scheduler: Sch, function: F) -> Self
    where
        Sch: Scheduler + Clone,
        F: FnOnce(Observable<S>) -> StateLens<S, R>,
    {
        let span = tracing::debug_span!("cycled_lens");
        let producer = LatestChannel::new();
        let failure: FailureSlot = Arc::new(Mutex::new(None));

        let lens = span.in_scope(|| function(producer.observable().distinct_until_changed()));
        let effects = lens.merged_effects().observe_on(scheduler);
        let receiver = lens.into_view();

        // Prefixed states are published as soon as they arrive, so effects
        // wired after them are replayed the current state.
        let mut subscriptions = SubscriptionBag::new();
        let observer = feedback(producer.clone(), failure.clone(), false, span.clone());
        subscriptions.insert(effects.subscribe_with(observer));
        span.in_scope(|| tracing::debug!("cycled lens wired"));

        Self {
            receiver,
            producer,
            subscriptions,
            failure,
            disposed: false,
        }
    }

    /// The view the closure produced, captured once at construction.
    pub const fn receiver(&self) -> &R {
        &self.receiver
    }

    /// The most recently published state.
    pub fn latest(&self) -> Option<S> {
        self.producer.latest()
    }

    /// A read-only view of the published states, including repeats.
    pub fn states(&self) -> Observable<S> {
        self.producer.observable()
    }

    /// Why the loop stopped on its own, if it did.
    pub fn failure(&self) -> Option<CycleError> {
        self.failure.lock().clone()
    }

    /// Returns `true` once [`dispose`](Self::dispose) has run.
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<S: StreamValue, R> CycledLens<S, R> {
    /// Cancels the feedback subscription and completes the state stream.
    /// Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.subscriptions.dispose();
        self.producer.complete();
        self.disposed = true;
        tracing::debug!("cycled lens disposed");
    }
}

impl<S: StreamValue, R> Drop for CycledLens<S, R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<S: StreamValue + fmt::Debug, R: fmt::Debug> fmt::Debug for CycledLens<S, R> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CycledLens")
            .field("receiver", &self.receiver)
            .field("latest", &self.producer.latest())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::observable::{ImmediateScheduler, ManualScheduler, TrampolineScheduler};
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_to(limit: i32) -> impl FnOnce(Observable<i32>) -> StateLens<i32, ()> {
        move |states| {
            states
                .lens(|_| (), move |_, states| vec![states.map(move |state| (state + 1).min(limit))])
                .prefixed_with(0)
        }
    }

    #[rstest]
    fn test_each_rebind_waits_for_the_next_tick() {
        let scheduler = ManualScheduler::new();
        let cycled = CycledLens::new(scheduler.clone(), counting_to(2));

        assert_eq!(cycled.latest(), None);
        assert!(scheduler.run_next());
        assert_eq!(cycled.latest(), Some(0));
        assert!(scheduler.run_next());
        assert_eq!(cycled.latest(), Some(1));
        assert!(scheduler.run_next());
        assert_eq!(cycled.latest(), Some(2));
    }

    #[rstest]
    fn test_equal_state_does_not_retrigger() {
        let scheduler = ManualScheduler::new();
        let cycled = CycledLens::new(scheduler.clone(), counting_to(2));

        // 0, 1, 2, and one republish of 2 that the dedupe absorbs.
        assert_eq!(scheduler.run_until_idle(), 4);
        assert_eq!(cycled.latest(), Some(2));
        assert_eq!(scheduler.pending(), 0);
    }

    #[rstest]
    fn test_trampoline_runs_to_fixed_point_without_recursion() {
        let cycled = CycledLens::new(TrampolineScheduler, counting_to(50_000));
        assert_eq!(cycled.latest(), Some(50_000));
    }

    #[rstest]
    fn test_closure_runs_once_and_receiver_is_kept() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let cycled = CycledLens::new(ImmediateScheduler, move |states: Observable<i32>| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            states.lens(|_| String::from("root"), |_, _| Vec::new()).prefixed_with(7)
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cycled.receiver(), "root");
        assert_eq!(cycled.latest(), Some(7));
    }

    #[rstest]
    fn test_effect_emitting_on_subscription_sees_prefixed_state() {
        let cycled = CycledLens::new(ImmediateScheduler, |states: Observable<i32>| {
            states
                .lens(
                    |_| (),
                    |_, states| vec![Observable::just(5).with_latest_from(states, |delta, state| state + delta)],
                )
                .prefixed_with(1)
        });
        assert_eq!(cycled.latest(), Some(6));
    }

    #[rstest]
    fn test_dispose_stops_the_loop() {
        let scheduler = ManualScheduler::new();
        let mut cycled = CycledLens::new(scheduler.clone(), counting_to(10));
        scheduler.run_next();
        cycled.dispose();
        scheduler.run_until_idle();

        assert!(cycled.is_disposed());
        assert_eq!(cycled.latest(), Some(0));
    }

    #[rstest]
    fn test_failing_effect_is_recorded() {
        let cycled = CycledLens::new(ImmediateScheduler, |states: Observable<i32>| {
            states
                .lens(|_| (), |_, _| vec![Observable::error(StreamError::failed("effect", "boom"))])
                .prefixed_with(1)
        });
        assert_eq!(
            cycled.failure(),
            Some(CycleError::StreamFailed(StreamError::failed("effect", "boom")))
        );
    }
}
