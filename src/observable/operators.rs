//! Stream operators.
//!
//! Every operator returns a new cold [`Observable`]; per-subscription state
//! (accumulators, last-seen values, counters) is created when the result is
//! subscribed, never when the pipeline is built. User closures are always
//! invoked without holding an internal lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{Event, Observable, Observer, Scheduler, StreamValue, Subscription};
use crate::error::StreamError;

// =============================================================================
// Transformations
// =============================================================================

impl<T: StreamValue> Observable<T> {
    /// Transforms every value with `function`.
    pub fn map<U, F>(&self, function: F) -> Observable<U>
    where
        U: StreamValue,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        let function = Arc::new(function);
        Observable::create(move |observer: Observer<U>| {
            let function = function.clone();
            source.subscribe_with(Observer::new(move |event: Event<T>| {
                observer.on_event(event.map(|value| function(value)));
            }))
        })
    }

    /// Keeps only the values satisfying `predicate`.
    pub fn filter<P>(&self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter_map(move |value| predicate(&value).then_some(value))
    }

    /// Transforms values, dropping those mapped to `None`.
    pub fn filter_map<U, F>(&self, function: F) -> Observable<U>
    where
        U: StreamValue,
        F: Fn(T) -> Option<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let function = Arc::new(function);
        Observable::create(move |observer: Observer<U>| {
            let function = function.clone();
            source.subscribe_with(Observer::new(move |event: Event<T>| match event {
                Event::Next(value) => {
                    if let Some(mapped) = function(value) {
                        observer.on_next(mapped);
                    }
                }
                Event::Error(error) => observer.on_error(error),
                Event::Completed => observer.on_completed(),
            }))
        })
    }

    /// Folds values into an accumulator, emitting every intermediate result.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cyclens::observable::Observable;
    /// use std::sync::Arc;
    /// use parking_lot::Mutex;
    ///
    /// let totals = Arc::new(Mutex::new(Vec::new()));
    /// let totals_clone = totals.clone();
    /// Observable::from_iter(vec![1, 2, 3])
    ///     .scan(0, |total, value| total + value)
    ///     .subscribe(move |total| totals_clone.lock().push(total));
    ///
    /// assert_eq!(*totals.lock(), vec![1, 3, 6]);
    /// ```
    pub fn scan<U, F>(&self, initial: U, function: F) -> Observable<U>
    where
        U: StreamValue,
        F: Fn(U, T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        let function = Arc::new(function);
        Observable::create(move |observer: Observer<U>| {
            let function = function.clone();
            let accumulator = Mutex::new(initial.clone());
            source.subscribe_with(Observer::new(move |event: Event<T>| match event {
                Event::Next(value) => {
                    let current = accumulator.lock().clone();
                    let next = function(current, value);
                    *accumulator.lock() = next.clone();
                    observer.on_next(next);
                }
                Event::Error(error) => observer.on_error(error),
                Event::Completed => observer.on_completed(),
            }))
        })
    }

    /// Emits `value` before anything from the upstream.
    pub fn start_with(&self, value: T) -> Self {
        let source = self.clone();
        Self::create(move |observer| {
            observer.on_next(value.clone());
            if observer.is_stopped() {
                return Subscription::default();
            }
            source.subscribe_with(observer)
        })
    }

    /// Drops values equal to the previously emitted one.
    pub fn distinct_until_changed(&self) -> Self
    where
        T: PartialEq,
    {
        let source = self.clone();
        Self::create(move |observer| {
            let last: Mutex<Option<T>> = Mutex::new(None);
            source.subscribe_with(Observer::new(move |event: Event<T>| match event {
                Event::Next(value) => {
                    {
                        let mut last = last.lock();
                        if last.as_ref() == Some(&value) {
                            return;
                        }
                        *last = Some(value.clone());
                    }
                    observer.on_next(value);
                }
                terminal => observer.on_event(terminal),
            }))
        })
    }

    /// Calls `inspector` for every value before passing it on.
    pub fn inspect<F>(&self, inspector: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.map(move |value| {
            inspector(&value);
            value
        })
    }

    /// Calls `callback` right before a terminal event is forwarded.
    ///
    /// The callback receives the error for failures and `None` for completion.
    pub fn on_terminate<F>(&self, callback: F) -> Self
    where
        F: Fn(Option<&StreamError>) + Send + Sync + 'static,
    {
        let source = self.clone();
        let callback = Arc::new(callback);
        Self::create(move |observer| {
            let callback = callback.clone();
            source.subscribe_with(Observer::new(move |event: Event<T>| {
                match &event {
                    Event::Error(error) => callback(Some(error)),
                    Event::Completed => callback(None),
                    Event::Next(_) => {}
                }
                observer.on_event(event);
            }))
        })
    }
}

// =============================================================================
// Limiting
// =============================================================================

impl<T: StreamValue> Observable<T> {
    /// Emits the first `count` values, then completes and unsubscribes from
    /// the upstream.
    pub fn take(&self, count: usize) -> Self {
        let source = self.clone();
        Self::create(move |observer| {
            if count == 0 {
                observer.on_completed();
                return Subscription::default();
            }
            let remaining = AtomicUsize::new(count);
            let stopped = Arc::new(AtomicBool::new(false));
            let upstream_stopped = stopped.clone();
            let upstream = Observer::with_stop_flag(stopped, move |event: Event<T>| match event {
                Event::Next(value) => {
                    let before = remaining.fetch_sub(1, Ordering::AcqRel);
                    observer.on_next(value);
                    if before == 1 {
                        upstream_stopped.store(true, Ordering::Release);
                        observer.on_completed();
                    }
                }
                terminal => observer.on_event(terminal),
            });
            source.subscribe_with(upstream)
        })
    }

    /// Ignores the first `count` values.
    pub fn skip(&self, count: usize) -> Self {
        let source = self.clone();
        Self::create(move |observer| {
            let skipped = AtomicUsize::new(0);
            source.subscribe_with(Observer::new(move |event: Event<T>| match event {
                Event::Next(value) => {
                    if skipped.load(Ordering::Acquire) < count {
                        skipped.fetch_add(1, Ordering::AcqRel);
                    } else {
                        observer.on_next(value);
                    }
                }
                terminal => observer.on_event(terminal),
            }))
        })
    }
}

// =============================================================================
// Combination
// =============================================================================

impl<T: StreamValue> Observable<T> {
    /// Merges `sources` into one stream.
    ///
    /// Sources are subscribed in order, so values that sources emit
    /// synchronously on subscription appear in argument order. The result
    /// completes once every source has completed; the first error is
    /// forwarded immediately and unsubscribes every other source.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cyclens::observable::Observable;
    /// use std::sync::Arc;
    /// use parking_lot::Mutex;
    ///
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let seen_clone = seen.clone();
    /// Observable::merge(vec![Observable::just("e1"), Observable::just("e2")])
    ///     .subscribe(move |value| seen_clone.lock().push(value));
    ///
    /// assert_eq!(*seen.lock(), vec!["e1", "e2"]);
    /// ```
    pub fn merge(sources: Vec<Self>) -> Self {
        let sources: Arc<[Self]> = sources.into();
        Self::create(move |observer| {
            if sources.is_empty() {
                observer.on_completed();
                return Subscription::default();
            }
            let remaining = Arc::new(AtomicUsize::new(sources.len()));
            let composite = Subscription::default();
            for source in sources.iter() {
                if observer.is_stopped() {
                    break;
                }
                let observer = observer.clone();
                let remaining = remaining.clone();
                let siblings = composite.clone();
                let subscription = source.subscribe_with(Observer::new(move |event: Event<T>| {
                    match event {
                        Event::Completed => {
                            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                                observer.on_completed();
                            }
                        }
                        Event::Error(error) => {
                            observer.on_error(error);
                            siblings.cancel();
                        }
                        next => observer.on_event(next),
                    }
                }));
                composite.add_subscription(subscription);
            }
            composite
        })
    }

    /// Merges this stream with `other`.
    pub fn merge_with(&self, other: &Self) -> Self {
        Self::merge(vec![self.clone(), other.clone()])
    }

    /// Combines each value with the latest value of `other`.
    ///
    /// `other` is subscribed first, so a replaying `other` (such as a
    /// [`LatestChannel`](super::LatestChannel)) is known before the first
    /// value of `self` arrives. Values arriving before `other` has emitted
    /// are dropped. Completion of `other` is ignored; its errors are
    /// forwarded.
    pub fn with_latest_from<U, R, F>(&self, other: &Observable<U>, combine: F) -> Observable<R>
    where
        U: StreamValue,
        R: StreamValue,
        F: Fn(T, U) -> R + Send + Sync + 'static,
    {
        let source = self.clone();
        let other = other.clone();
        let combine = Arc::new(combine);
        Observable::create(move |observer: Observer<R>| {
            let latest: Arc<Mutex<Option<U>>> = Arc::new(Mutex::new(None));
            let composite = Subscription::default();

            let latest_writer = latest.clone();
            let other_observer = observer.clone();
            composite.add_subscription(other.subscribe_with(Observer::new(
                move |event: Event<U>| match event {
                    Event::Next(value) => *latest_writer.lock() = Some(value),
                    Event::Error(error) => other_observer.on_error(error),
                    Event::Completed => {}
                },
            )));

            let combine = combine.clone();
            composite.add_subscription(source.subscribe_with(Observer::new(
                move |event: Event<T>| match event {
                    Event::Next(value) => {
                        let current = latest.lock().clone();
                        if let Some(current) = current {
                            observer.on_next(combine(value, current));
                        }
                    }
                    Event::Error(error) => observer.on_error(error),
                    Event::Completed => observer.on_completed(),
                },
            )));
            composite
        })
    }

    /// Replaces a failure with the stream returned by `handler`.
    pub fn catch_error<F>(&self, handler: F) -> Self
    where
        F: Fn(StreamError) -> Self + Send + Sync + 'static,
    {
        let source = self.clone();
        let handler = Arc::new(handler);
        Self::create(move |observer| {
            let composite = Subscription::default();
            let fallback_holder = composite.clone();
            let handler = handler.clone();
            composite.add_subscription(source.subscribe_with(Observer::new(
                move |event: Event<T>| match event {
                    Event::Error(error) => {
                        let fallback = handler(error).subscribe_with(observer.clone());
                        fallback_holder.add_subscription(fallback);
                    }
                    other => observer.on_event(other),
                },
            )));
            composite
        })
    }
}

// =============================================================================
// Scheduling
// =============================================================================

impl<T: StreamValue> Observable<T> {
    /// Re-delivers every event through `scheduler`.
    ///
    /// With a deferring scheduler this moves downstream work off the
    /// upstream's stack frame.
    pub fn observe_on<S>(&self, scheduler: S) -> Self
    where
        S: Scheduler + Clone,
    {
        let source = self.clone();
        Self::create(move |observer| {
            let scheduler = scheduler.clone();
            source.subscribe_with(Observer::new(move |event: Event<T>| {
                let observer = observer.clone();
                scheduler.schedule(Box::new(move || observer.on_event(event)));
            }))
        })
    }
}
