//! Cancellation tokens for observable subscriptions.
//!
//! A [`Subscription`] is returned by every `subscribe` call. Cancelling it
//! stops delivery to the subscribed observer and runs the teardown closures
//! registered by the upstream exactly once. Dropping a `Subscription` does
//! not cancel it; collect subscriptions in a [`SubscriptionBag`] to tie their
//! lifetime to an owner.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;

type Teardown = Box<dyn FnOnce() + Send + 'static>;

struct SubscriptionInner {
    cancelled: AtomicBool,
    teardowns: Mutex<SmallVec<[Teardown; 2]>>,
}

// =============================================================================
// Subscription
// =============================================================================

/// A cancellation token for a running subscription.
///
/// Cloning a `Subscription` yields another handle to the same token.
///
/// # Examples
///
/// ```rust
/// use cyclens::observable::Subscription;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let counter = Arc::new(AtomicUsize::new(0));
/// let counter_clone = counter.clone();
/// let subscription = Subscription::new(move || {
///     counter_clone.fetch_add(1, Ordering::SeqCst);
/// });
///
/// subscription.cancel();
/// subscription.cancel();
/// assert_eq!(counter.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    /// Creates a live subscription that runs `teardown` when cancelled.
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let subscription = Self::default();
        subscription.add(teardown);
        subscription
    }

    /// Creates a subscription that is already cancelled.
    pub fn cancelled() -> Self {
        let subscription = Self::default();
        subscription.cancel();
        subscription
    }

    /// Registers a teardown closure.
    ///
    /// If the subscription is already cancelled, the closure runs immediately.
    pub fn add<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut teardowns = self.inner.teardowns.lock();
            if !self.inner.cancelled.load(Ordering::Acquire) {
                teardowns.push(Box::new(teardown));
                return;
            }
        }
        teardown();
    }

    /// Ties `child` to this subscription: cancelling `self` cancels `child`.
    pub fn add_subscription(&self, child: Self) {
        self.add(move || child.cancel());
    }

    /// Cancels the subscription. Idempotent.
    pub fn cancel(&self) {
        let teardowns = {
            let mut teardowns = self.inner.teardowns.lock();
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *teardowns)
        };
        for teardown in teardowns {
            teardown();
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                cancelled: AtomicBool::new(false),
                teardowns: Mutex::new(SmallVec::new()),
            }),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// =============================================================================
// SubscriptionBag
// =============================================================================

/// Owns a set of subscriptions and cancels all of them on disposal or drop.
#[derive(Debug, Default)]
pub struct SubscriptionBag {
    subscriptions: Vec<Subscription>,
    disposed: bool,
}

impl SubscriptionBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription. Inserting into a disposed bag cancels it at once.
    pub fn insert(&mut self, subscription: Subscription) {
        if self.disposed {
            subscription.cancel();
        } else {
            self.subscriptions.push(subscription);
        }
    }

    /// Cancels every subscription in the bag. Idempotent.
    pub fn dispose(&mut self) {
        self.disposed = true;
        for subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
    }

    /// Returns `true` once the bag has been disposed.
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Number of subscriptions currently held.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns `true` if the bag holds no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl Drop for SubscriptionBag {
    fn drop(&mut self) {
        self.dispose();
    }
}
