//! Ordered windows of states.
//!
//! A [`Frame`] is what time-windowed drivers (animations, interpolators)
//! work on: the most recently committed state, the *head*, followed by the
//! states still pending, the *tail*, oldest first. Frames are values: every
//! transition returns a new frame and leaves the original untouched.
//!
//! # Examples
//!
//! ```rust
//! use cyclens::frame::Frame;
//!
//! let frame = Frame::new(0).pushed(1).pushed(2);
//! assert_eq!(frame.head(), &0);
//! assert_eq!(frame.latest(), &2);
//!
//! let advanced = frame.advanced();
//! assert_eq!(advanced.head(), &1);
//! assert_eq!(advanced.tail().collect::<Vec<_>>(), vec![&2]);
//!
//! assert!(frame.settled().is_settled());
//! assert_eq!(frame.len(), 3);
//! ```

use std::collections::VecDeque;
use std::collections::vec_deque;
use std::iter::{self, Chain, Once};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A committed head state and its pending successors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame<S> {
    head: S,
    tail: VecDeque<S>,
}

#[allow(clippy::len_without_is_empty)]
impl<S> Frame<S> {
    /// Creates a settled frame holding only `head`.
    pub fn new(head: S) -> Self {
        Self {
            head,
            tail: VecDeque::new(),
        }
    }

    /// Creates a frame with pending states, oldest first.
    pub fn with_tail<I>(head: S, tail: I) -> Self
    where
        I: IntoIterator<Item = S>,
    {
        Self {
            head,
            tail: tail.into_iter().collect(),
        }
    }

    /// The committed state.
    pub const fn head(&self) -> &S {
        &self.head
    }

    /// The pending states, oldest first.
    pub fn tail(&self) -> vec_deque::Iter<'_, S> {
        self.tail.iter()
    }

    /// The newest state, pending or not.
    pub fn latest(&self) -> &S {
        self.tail.back().unwrap_or(&self.head)
    }

    /// Returns `true` when nothing is pending.
    pub fn is_settled(&self) -> bool {
        self.tail.is_empty()
    }

    /// Number of states, head included. Never zero.
    pub fn len(&self) -> usize {
        self.tail.len() + 1
    }

    /// Iterates head first, then the pending states.
    pub fn iter(&self) -> Chain<Once<&S>, vec_deque::Iter<'_, S>> {
        iter::once(&self.head).chain(self.tail.iter())
    }
}

impl<S: Clone> Frame<S> {
    /// Appends `state` to the pending states.
    #[must_use]
    pub fn pushed(&self, state: S) -> Self {
        let mut next = self.clone();
        next.tail.push_back(state);
        next
    }

    /// Commits the oldest pending state into the head.
    ///
    /// A settled frame is returned unchanged.
    #[must_use]
    pub fn advanced(&self) -> Self {
        let mut next = self.clone();
        if let Some(head) = next.tail.pop_front() {
            next.head = head;
        }
        next
    }

    /// Commits every pending state; the newest becomes the head.
    #[must_use]
    pub fn settled(&self) -> Self {
        Self::new(self.latest().clone())
    }
}

impl<'a, S> IntoIterator for &'a Frame<S> {
    type Item = &'a S;
    type IntoIter = Chain<Once<&'a S>, vec_deque::Iter<'a, S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_new_is_settled() {
        let frame = Frame::new("idle");
        assert!(frame.is_settled());
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.latest(), &"idle");
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(5, 3)]
    fn test_advancing_commits_in_order(#[case] steps: usize, #[case] expected_head: i32) {
        let mut frame = Frame::with_tail(0, vec![1, 2, 3]);
        for _ in 0..steps {
            frame = frame.advanced();
        }
        assert_eq!(frame.head(), &expected_head);
        assert_eq!(frame.latest(), &3);
    }

    #[rstest]
    fn test_transitions_leave_original_untouched() {
        let frame = Frame::with_tail('a', ['b']);
        let _ = frame.pushed('c');
        let _ = frame.advanced();
        assert_eq!(frame.iter().copied().collect::<String>(), "ab");
    }

    #[cfg(feature = "serde")]
    #[rstest]
    fn test_serializes_head_and_tail() {
        let frame = Frame::with_tail(1, vec![2, 3]);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"head":1,"tail":[2,3]}"#);
        let decoded: Frame<i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, frame);
    }
}
