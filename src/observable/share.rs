//! Hot, shared observables.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{LatestChannel, Observable, Observer, PublishSubject, StreamValue, Subscription};

/// The single upstream subscription behind a shared observable.
///
/// Dropped together with the last clone of the shared observable, at which
/// point the upstream is cancelled.
struct Connection {
    connected: AtomicBool,
    subscription: Mutex<Option<Subscription>>,
}

impl Connection {
    const fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            subscription: Mutex::new(None),
        }
    }

    fn connect_once<F>(&self, connect: F)
    where
        F: FnOnce() -> Subscription,
    {
        if self.connected.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscription = connect();
        *self.subscription.lock() = Some(subscription);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().take() {
            subscription.cancel();
        }
    }
}

impl<T: StreamValue> Observable<T> {
    /// Turns this observable into a hot stream.
    ///
    /// The upstream is subscribed exactly once, lazily, when the first
    /// observer subscribes, and stays connected for as long as any clone of
    /// the returned observable is alive. Every observer sees the same
    /// upstream values; side effects of the upstream are never duplicated.
    /// Late observers miss values emitted before they subscribed.
    pub fn share(&self) -> Self {
        let subject = PublishSubject::new();
        self.shared_through(subject.as_observer(), subject.observable())
    }

    /// Like [`share`](Self::share), but a late observer first receives the
    /// most recent value.
    pub fn share_latest(&self) -> Self {
        let channel = LatestChannel::new();
        self.shared_through(channel.as_observer(), channel.observable())
    }

    fn shared_through(&self, sink: Observer<T>, output: Self) -> Self {
        let source = self.clone();
        let connection = Connection::new();
        Self::create(move |observer| {
            let subscription = output.subscribe_with(observer);
            connection.connect_once(|| source.subscribe_with(sink.clone()));
            subscription
        })
    }
}
