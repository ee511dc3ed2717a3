//! Hot multicast streams: [`PublishSubject`] and [`LatestChannel`].
//!
//! Both are built on one serialized fan-out core. An emission issued while a
//! delivery is in progress, re-entrantly from inside an observer or from
//! another thread, is queued and delivered by the thread that is already
//! delivering, after the current value has reached every observer. This
//! keeps a single logical timeline: every observer sees values in emission
//! order, and a feedback loop that publishes from inside its own observer
//! cannot grow the stack.
//!
//! # Latest-value-wins
//!
//! [`LatestChannel`] retains exactly one value, the most recently delivered
//! one. A late subscriber receives that value and then the live stream, never
//! older history:
//!
//! ```rust
//! use cyclens::observable::LatestChannel;
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! let channel = LatestChannel::new();
//! channel.publish("S1");
//! channel.publish("S2");
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let seen_clone = seen.clone();
//! channel.observable().subscribe(move |state| seen_clone.lock().push(state));
//!
//! assert_eq!(*seen.lock(), vec!["S2"]);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::{Event, Observable, Observer, StreamValue, Subscription};
use crate::error::StreamError;

// =============================================================================
// Fan-out core
// =============================================================================

enum Delivery<T> {
    /// An event for every current observer.
    Broadcast(Event<T>),
    /// The retained value for one newly subscribed observer.
    Replay(Observer<T>, T),
}

#[derive(Clone)]
enum Terminal {
    Completed,
    Failed(StreamError),
}

/// One unit of work popped from the queue.
enum Step<T> {
    Replay(Observer<T>, T),
    Broadcast(SmallVec<[Observer<T>; 4]>, Event<T>),
}

struct Slot<T> {
    id: u64,
    observer: Observer<T>,
}

struct FanoutState<T> {
    observers: Vec<Slot<T>>,
    next_id: u64,
    latest: Option<T>,
    pending: VecDeque<Delivery<T>>,
    delivering: bool,
    holds: usize,
    /// A terminal event has been accepted; later emissions are ignored.
    closed: bool,
    /// A terminal event has been delivered.
    terminal: Option<Terminal>,
}

struct Fanout<T> {
    state: Mutex<FanoutState<T>>,
    replay: bool,
}

/// Resets the delivering flag if an observer panics mid-delivery.
struct DrainGuard<'a, T> {
    fanout: &'a Fanout<T>,
}

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.fanout.state.lock().delivering = false;
        }
    }
}

impl<T: StreamValue> Fanout<T> {
    fn new(replay: bool) -> Self {
        Self {
            state: Mutex::new(FanoutState {
                observers: Vec::new(),
                next_id: 0,
                latest: None,
                pending: VecDeque::new(),
                delivering: false,
                holds: 0,
                closed: false,
                terminal: None,
            }),
            replay,
        }
    }

    fn emit(&self, event: Event<T>) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            if event.is_terminal() {
                state.closed = true;
            }
            state.pending.push_back(Delivery::Broadcast(event));
            if !Self::claim_delivery(&mut state) {
                return;
            }
        }
        self.drain();
    }

    fn subscribe(&self, observer: Observer<T>) -> (Option<u64>, bool) {
        let mut state = self.state.lock();
        if let Some(terminal) = state.terminal.clone() {
            let latest = if self.replay { state.latest.clone() } else { None };
            drop(state);
            if let Some(latest) = latest {
                observer.on_next(latest);
            }
            match terminal {
                Terminal::Completed => observer.on_completed(),
                Terminal::Failed(error) => observer.on_error(error),
            }
            return (None, false);
        }

        let id = state.next_id;
        state.next_id += 1;
        state.observers.push(Slot {
            id,
            observer: observer.clone(),
        });
        let replay = if self.replay { state.latest.clone() } else { None };
        match replay {
            Some(latest) => {
                // Ahead of queued broadcasts, which are all newer than `latest`.
                state.pending.push_front(Delivery::Replay(observer, latest));
                let must_drain = Self::claim_delivery(&mut state);
                (Some(id), must_drain)
            }
            None => (Some(id), false),
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.state.lock().observers.retain(|slot| slot.id != id);
    }

    fn hold(&self) {
        self.state.lock().holds += 1;
    }

    fn release(&self) {
        let must_drain = {
            let mut state = self.state.lock();
            state.holds = state.holds.saturating_sub(1);
            !state.pending.is_empty() && Self::claim_delivery(&mut state)
        };
        if must_drain {
            self.drain();
        }
    }

    fn claim_delivery(state: &mut FanoutState<T>) -> bool {
        if state.delivering || Self::is_held(state) {
            return false;
        }
        state.delivering = true;
        true
    }

    /// A hold defers broadcasts only; a replay at the front still goes out.
    fn is_held(state: &FanoutState<T>) -> bool {
        state.holds > 0 && !matches!(state.pending.front(), Some(Delivery::Replay(..)))
    }

    fn drain(&self) {
        let _guard = DrainGuard { fanout: self };
        loop {
            let delivery = {
                let mut state = self.state.lock();
                if Self::is_held(&state) {
                    state.delivering = false;
                    return;
                }
                let Some(delivery) = state.pending.pop_front() else {
                    state.delivering = false;
                    return;
                };
                match delivery {
                    Delivery::Replay(observer, value) => Step::Replay(observer, value),
                    Delivery::Broadcast(event) => {
                        match &event {
                            Event::Next(value) => {
                                if self.replay {
                                    state.latest = Some(value.clone());
                                }
                            }
                            Event::Error(error) => {
                                state.terminal = Some(Terminal::Failed(error.clone()));
                            }
                            Event::Completed => state.terminal = Some(Terminal::Completed),
                        }
                        let observers: SmallVec<[Observer<T>; 4]> = state
                            .observers
                            .iter()
                            .map(|slot| slot.observer.clone())
                            .collect();
                        if event.is_terminal() {
                            state.observers.clear();
                        }
                        Step::Broadcast(observers, event)
                    }
                }
            };
            match delivery {
                Step::Replay(observer, value) => observer.on_next(value),
                Step::Broadcast(observers, event) => {
                    for observer in observers {
                        observer.on_event(event.clone());
                    }
                }
            }
        }
    }

    fn latest(&self) -> Option<T> {
        self.state.lock().latest.clone()
    }

    fn subscriber_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    fn is_terminated(&self) -> bool {
        self.state.lock().closed
    }
}

fn observable_of<T: StreamValue>(fanout: &Arc<Fanout<T>>) -> Observable<T> {
    let fanout = fanout.clone();
    Observable::create(move |observer| {
        let (id, must_drain) = fanout.subscribe(observer);
        if must_drain {
            fanout.drain();
        }
        match id {
            Some(id) => {
                let fanout = Arc::downgrade(&fanout);
                Subscription::new(move || {
                    if let Some(fanout) = fanout.upgrade() {
                        fanout.unsubscribe(id);
                    }
                })
            }
            None => Subscription::default(),
        }
    })
}

fn observer_of<T: StreamValue>(fanout: &Arc<Fanout<T>>) -> Observer<T> {
    let fanout = fanout.clone();
    Observer::new(move |event| fanout.emit(event))
}

// =============================================================================
// PublishSubject
// =============================================================================

/// A hot stream that multicasts to its current observers, without replay.
pub struct PublishSubject<T> {
    fanout: Arc<Fanout<T>>,
}

impl<T> Clone for PublishSubject<T> {
    fn clone(&self) -> Self {
        Self {
            fanout: self.fanout.clone(),
        }
    }
}

impl<T: StreamValue> PublishSubject<T> {
    /// Creates a subject with no observers.
    pub fn new() -> Self {
        Self {
            fanout: Arc::new(Fanout::new(false)),
        }
    }

    /// Emits a value to every current observer.
    pub fn on_next(&self, value: T) {
        self.fanout.emit(Event::Next(value));
    }

    /// Terminates the subject with `error`.
    pub fn on_error(&self, error: StreamError) {
        self.fanout.emit(Event::Error(error));
    }

    /// Completes the subject.
    pub fn on_completed(&self) {
        self.fanout.emit(Event::Completed);
    }

    /// The stream of values emitted from now on.
    pub fn observable(&self) -> Observable<T> {
        observable_of(&self.fanout)
    }

    /// An observer that forwards into this subject.
    pub fn as_observer(&self) -> Observer<T> {
        observer_of(&self.fanout)
    }

    /// Number of current observers.
    pub fn subscriber_count(&self) -> usize {
        self.fanout.subscriber_count()
    }
}

impl<T: StreamValue> Default for PublishSubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PublishSubject<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("PublishSubject").finish_non_exhaustive()
    }
}

// =============================================================================
// LatestChannel
// =============================================================================

/// A latest-value broadcast channel: single-slot replay with fan-out.
///
/// This is the conduit of the feedback loop. It retains only the most
/// recently delivered value; new subscribers receive that value first and
/// then every later value in publish order. The channel never de-duplicates:
/// publishing an equal value twice delivers it twice.
///
/// Cloning the channel yields another handle to the same channel.
pub struct LatestChannel<T> {
    fanout: Arc<Fanout<T>>,
}

impl<T> Clone for LatestChannel<T> {
    fn clone(&self) -> Self {
        Self {
            fanout: self.fanout.clone(),
        }
    }
}

impl<T: StreamValue> LatestChannel<T> {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self {
            fanout: Arc::new(Fanout::new(true)),
        }
    }

    /// Publishes a value. Ignored once the channel is terminated.
    pub fn publish(&self, value: T) {
        self.fanout.emit(Event::Next(value));
    }

    /// Terminates the channel with `error`.
    pub fn error(&self, error: StreamError) {
        self.fanout.emit(Event::Error(error));
    }

    /// Completes the channel.
    pub fn complete(&self) {
        self.fanout.emit(Event::Completed);
    }

    /// The most recently delivered value.
    pub fn latest(&self) -> Option<T> {
        self.fanout.latest()
    }

    /// The channel as a read-only stream, replaying the latest value.
    pub fn observable(&self) -> Observable<T> {
        observable_of(&self.fanout)
    }

    /// An observer that publishes into this channel.
    pub fn as_observer(&self) -> Observer<T> {
        observer_of(&self.fanout)
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.fanout.subscriber_count()
    }

    /// Returns `true` once a terminal event has been accepted.
    pub fn is_terminated(&self) -> bool {
        self.fanout.is_terminated()
    }

    /// Defers broadcasts until the returned hold is dropped.
    ///
    /// Publishes issued while a hold is alive are queued in order and
    /// delivered when the last hold is released; [`latest`](Self::latest)
    /// only moves on at that point. A subscriber added under the hold still
    /// receives the current latest value right away. Used to wire a set of
    /// subscribers that must all observe the current value before any value
    /// published during wiring.
    pub fn hold(&self) -> DeliveryHold<T> {
        self.fanout.hold();
        DeliveryHold {
            fanout: self.fanout.clone(),
        }
    }
}

impl<T: StreamValue> Default for LatestChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StreamValue + fmt::Debug> fmt::Debug for LatestChannel<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LatestChannel")
            .field("latest", &self.latest())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Keeps a [`LatestChannel`] from delivering until dropped.
#[must_use = "delivery resumes as soon as the hold is dropped"]
pub struct DeliveryHold<T: StreamValue> {
    fanout: Arc<Fanout<T>>,
}

impl<T: StreamValue> Drop for DeliveryHold<T> {
    fn drop(&mut self) {
        self.fanout.release();
    }
}

impl<T: StreamValue> fmt::Debug for DeliveryHold<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("DeliveryHold").finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(LatestChannel<u64>: Send, Sync, Clone);
static_assertions::assert_impl_all!(PublishSubject<u64>: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record<T: StreamValue>(observable: &Observable<T>) -> Arc<Mutex<Vec<Event<T>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        observable.subscribe_with(Observer::new(move |event| events_clone.lock().push(event)));
        events
    }

    #[rstest]
    fn test_publish_subject_does_not_replay() {
        let subject = PublishSubject::new();
        subject.on_next(1);
        let events = record(&subject.observable());
        subject.on_next(2);
        assert_eq!(*events.lock(), vec![Event::Next(2)]);
    }

    #[rstest]
    fn test_latest_channel_keeps_only_latest() {
        let channel = LatestChannel::new();
        channel.publish(1);
        channel.publish(2);
        assert_eq!(channel.latest(), Some(2));

        let events = record(&channel.observable());
        channel.publish(3);
        assert_eq!(*events.lock(), vec![Event::Next(2), Event::Next(3)]);
    }

    #[rstest]
    fn test_latest_channel_does_not_deduplicate() {
        let channel = LatestChannel::new();
        let events = record(&channel.observable());
        channel.publish(4);
        channel.publish(4);
        assert_eq!(*events.lock(), vec![Event::Next(4), Event::Next(4)]);
    }

    #[rstest]
    fn test_reentrant_publish_is_delivered_after_current_value() {
        let channel = LatestChannel::new();
        let feedback = channel.clone();
        let first = Arc::new(Mutex::new(Vec::new()));
        let first_clone = first.clone();
        channel.observable().subscribe(move |value: u32| {
            first_clone.lock().push(value);
            if value < 3 {
                feedback.publish(value + 1);
            }
        });
        let second = record(&channel.observable());

        channel.publish(0);

        assert_eq!(*first.lock(), vec![0, 1, 2, 3]);
        assert_eq!(
            *second.lock(),
            vec![Event::Next(0), Event::Next(1), Event::Next(2), Event::Next(3)]
        );
    }

    #[rstest]
    fn test_deep_feedback_does_not_overflow_stack() {
        let channel = LatestChannel::new();
        let feedback = channel.clone();
        channel.observable().subscribe(move |value: u32| {
            if value < 100_000 {
                feedback.publish(value + 1);
            }
        });
        channel.publish(0);
        assert_eq!(channel.latest(), Some(100_000));
    }

    #[rstest]
    fn test_hold_defers_delivery_until_released() {
        let channel = LatestChannel::new();
        let hold = channel.hold();
        channel.publish("seed");
        let events = record(&channel.observable());
        assert!(events.lock().is_empty());
        assert_eq!(channel.latest(), None);

        drop(hold);
        assert_eq!(*events.lock(), vec![Event::Next("seed")]);
    }

    #[rstest]
    fn test_hold_still_replays_current_value() {
        let channel = LatestChannel::new();
        channel.publish("seed");
        let hold = channel.hold();
        let early = record(&channel.observable());
        channel.publish("next");
        let late = record(&channel.observable());

        assert_eq!(*early.lock(), vec![Event::Next("seed")]);
        assert_eq!(*late.lock(), vec![Event::Next("seed")]);
        assert_eq!(channel.latest(), Some("seed"));

        drop(hold);
        assert_eq!(*early.lock(), vec![Event::Next("seed"), Event::Next("next")]);
        assert_eq!(*late.lock(), vec![Event::Next("seed"), Event::Next("next")]);
    }

    #[rstest]
    fn test_terminated_channel_replays_latest_then_terminal() {
        let channel = LatestChannel::new();
        channel.publish(1);
        channel.complete();
        channel.publish(2);

        let events = record(&channel.observable());
        assert!(channel.is_terminated());
        assert_eq!(*events.lock(), vec![Event::Next(1), Event::Completed]);
    }

    #[rstest]
    fn test_error_reaches_current_subscribers() {
        let channel = LatestChannel::<i32>::new();
        let events = record(&channel.observable());
        let error = StreamError::failed("channel", "closed");
        channel.error(error.clone());
        assert_eq!(*events.lock(), vec![Event::Error(error)]);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[rstest]
    fn test_unsubscribe_removes_observer() {
        let channel = LatestChannel::<i32>::new();
        let subscription = channel.observable().subscribe(|_| {});
        assert_eq!(channel.subscriber_count(), 1);
        subscription.cancel();
        assert_eq!(channel.subscriber_count(), 0);
    }
}
