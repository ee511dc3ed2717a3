//! Mutating lenses: the composition primitive of the feedback loop.
//!
//! A [`MutatingLens<A, B, C>`] is a frozen snapshot of one transformation
//! step. It holds an upstream `value: A`, a derived `view: B` (the `get`
//! side, typically a driver or a tuple of drivers) and an ordered list of
//! `effects: Vec<C>` (the `set` side, typically streams that eventually
//! produce new state).
//!
//! Construction evaluates `get(value)` exactly once and then
//! `set(view, value)` exactly once. Nothing is re-evaluated afterwards:
//! reactivity comes from the streams a lens holds, or from building one lens
//! per upstream value with [`Observable::lens_each`].
//!
//! # Ordering
//!
//! Every combinator that joins lenses concatenates their effects left to
//! right. That order is part of the contract: merged effect streams keep
//! positional stability, so the effect of the first lens always comes first.
//!
//! # Laws
//!
//! 1. **Zip**: `zip2(l1, l2).view() == (l1.view(), l2.view())` and
//!    `zip2(l1, l2).effects() == l1.effects() ++ l2.effects()`
//! 2. **Prefixed**: `l.prefixed(p).effects() == [p] ++ l.effects()`
//! 3. **Map**: `l.map(f).effects() == l.effects()`
//! 4. **FlatMap**: `l.flat_map(f).effects() == l.effects() ++ f(..).effects()`
//!
//! # Examples
//!
//! ```rust
//! use cyclens::lens::{MutatingLens, zip2};
//!
//! let counter = MutatingLens::new(10, |value: &i32| value * 2, |view, _| vec![*view + 1]);
//! let label = MutatingLens::with_effect(10, |value: &i32| format!("#{value}"), |_, value| value - 1);
//!
//! let zipped = zip2(counter, label).prefixed(0);
//! assert_eq!(zipped.view(), &(20, "#10".to_string()));
//! assert_eq!(zipped.effects(), &[0, 21, 9]);
//! ```

mod zip;

use crate::observable::{Observable, StreamValue};

pub use zip::{zip2, zip3, zip4, zip5, zip6};

// =============================================================================
// MutatingLens
// =============================================================================

/// A value, the view derived from it, and the effects derived from both.
///
/// # Type Parameters
///
/// - `A`: The upstream value, usually a state stream
/// - `B`: The derived view
/// - `C`: The element type of the effect list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutatingLens<A, B, C> {
    value: A,
    view: B,
    effects: Vec<C>,
}

impl<A, B, C> MutatingLens<A, B, C> {
    /// Builds a lens, evaluating `get` once and then `set` once.
    ///
    /// # Arguments
    ///
    /// * `value` - The upstream value
    /// * `get` - Derives the view from the value
    /// * `set` - Derives the effects from the view and the value
    pub fn new<G, S>(value: A, get: G, set: S) -> Self
    where
        G: FnOnce(&A) -> B,
        S: FnOnce(&B, &A) -> Vec<C>,
    {
        let view = get(&value);
        let effects = set(&view, &value);
        Self {
            value,
            view,
            effects,
        }
    }

    /// Builds a lens whose `set` produces exactly one effect.
    pub fn with_effect<G, S>(value: A, get: G, set: S) -> Self
    where
        G: FnOnce(&A) -> B,
        S: FnOnce(&B, &A) -> C,
    {
        Self::new(value, get, |view, value| vec![set(view, value)])
    }

    /// Builds a read-only lens: a view and no effects.
    pub fn read_only<G>(value: A, get: G) -> Self
    where
        G: FnOnce(&A) -> B,
    {
        Self::new(value, get, |_, _| Vec::new())
    }

    /// Assembles a lens from already computed parts.
    pub const fn from_parts(value: A, view: B, effects: Vec<C>) -> Self {
        Self {
            value,
            view,
            effects,
        }
    }

    /// The upstream value.
    pub const fn value(&self) -> &A {
        &self.value
    }

    /// The derived view (the `get` side).
    pub const fn view(&self) -> &B {
        &self.view
    }

    /// The effects (the `set` side), in order.
    pub fn effects(&self) -> &[C] {
        &self.effects
    }

    /// Splits the lens into `(value, view, effects)`.
    pub fn into_parts(self) -> (A, B, Vec<C>) {
        (self.value, self.view, self.effects)
    }

    /// Consumes the lens, keeping the view.
    pub fn into_view(self) -> B {
        self.view
    }

    /// Consumes the lens, keeping the effects.
    pub fn into_effects(self) -> Vec<C> {
        self.effects
    }

    /// Rewrites the view. The effect list is left untouched.
    pub fn map<X, F>(self, function: F) -> MutatingLens<A, X, C>
    where
        F: FnOnce(&A, B) -> X,
    {
        let view = function(&self.value, self.view);
        MutatingLens {
            value: self.value,
            view,
            effects: self.effects,
        }
    }

    /// Rewrites every effect, keeping their order.
    pub fn map_effects<D, F>(self, function: F) -> MutatingLens<A, B, D>
    where
        F: FnMut(C) -> D,
    {
        MutatingLens {
            value: self.value,
            view: self.view,
            effects: self.effects.into_iter().map(function).collect(),
        }
    }

    /// Puts `effect` in front of every other effect.
    ///
    /// This is how a loop guarantees an initial emission that does not wait
    /// on any driver.
    pub fn prefixed(mut self, effect: C) -> Self {
        self.effects.insert(0, effect);
        self
    }

    /// Sequences a lens derived from this one's value and view.
    ///
    /// The result keeps this lens's value, takes the derived lens's view and
    /// carries `self.effects ++ derived.effects`.
    pub fn flat_map<X, F>(self, function: F) -> MutatingLens<A, X, C>
    where
        F: FnOnce(&A, &B) -> MutatingLens<A, X, C>,
    {
        let derived = function(&self.value, &self.view);
        let mut effects = self.effects;
        effects.extend(derived.effects);
        MutatingLens {
            value: self.value,
            view: derived.view,
            effects,
        }
    }

    /// Pairs this lens with `other`; see [`zip2`].
    pub fn zip<X>(self, other: MutatingLens<A, X, C>) -> MutatingLens<A, (B, X), C> {
        zip2(self, other)
    }
}

// =============================================================================
// Stream-valued lenses
// =============================================================================

impl<A, B, T: StreamValue> MutatingLens<A, B, Observable<T>> {
    /// Puts a stream emitting just `value` in front of every other effect.
    pub fn prefixed_with(self, value: T) -> Self {
        self.prefixed(Observable::just(value))
    }

    /// Merges the effect streams, preserving their order.
    pub fn merged_effects(&self) -> Observable<T> {
        Observable::merge(self.effects.clone())
    }
}

impl<T: StreamValue> Observable<T> {
    /// Builds a lens whose value is this stream.
    ///
    /// `get` typically constructs a driver bound to the stream and `set`
    /// returns the driver's effect streams. Both run once, now; the streams
    /// they return stay idle until subscribed.
    pub fn lens<B, C, G, S>(self, get: G, set: S) -> MutatingLens<Self, B, C>
    where
        G: FnOnce(&Self) -> B,
        S: FnOnce(&B, &Self) -> Vec<C>,
    {
        MutatingLens::new(self, get, set)
    }

    /// Builds one lens per upstream value.
    ///
    /// `get` and `set` are evaluated once for every value, when it arrives.
    /// If the upstream never emits they are never evaluated.
    pub fn lens_each<B, C, G, S>(&self, get: G, set: S) -> Observable<MutatingLens<T, B, C>>
    where
        B: StreamValue,
        C: StreamValue,
        G: Fn(&T) -> B + Send + Sync + 'static,
        S: Fn(&B, &T) -> Vec<C> + Send + Sync + 'static,
    {
        self.map(move |value| MutatingLens::new(value, &get, &set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::cell::Cell;

    #[rstest]
    fn test_construction_evaluates_get_then_set_once() {
        let get_calls = Cell::new(0);
        let set_calls = Cell::new(0);
        let lens = MutatingLens::new(
            3,
            |value: &i32| {
                get_calls.set(get_calls.get() + 1);
                value * 2
            },
            |view: &i32, value: &i32| {
                assert_eq!(get_calls.get(), 1);
                set_calls.set(set_calls.get() + 1);
                vec![view + value]
            },
        );

        assert_eq!(get_calls.get(), 1);
        assert_eq!(set_calls.get(), 1);
        assert_eq!(lens.effects(), &[9]);
    }

    #[rstest]
    fn test_read_only_has_no_effects() {
        let lens: MutatingLens<i32, String, i32> = MutatingLens::read_only(1, |value| value.to_string());
        assert_eq!(lens.view(), "1");
        assert!(lens.effects().is_empty());
    }

    #[rstest]
    fn test_map_keeps_effects() {
        let lens = MutatingLens::new(2, |value: &i32| *value, |_, _| vec!["a", "b"]);
        let mapped = lens.map(|value, view| format!("{value}:{view}"));
        assert_eq!(mapped.view(), "2:2");
        assert_eq!(mapped.effects(), &["a", "b"]);
    }

    #[rstest]
    fn test_map_effects_keeps_order() {
        let lens = MutatingLens::new((), |_| (), |_, _| vec![1, 2, 3]);
        assert_eq!(lens.map_effects(|effect| effect * 10).effects(), &[10, 20, 30]);
    }

    #[rstest]
    fn test_flat_map_concatenates_left_to_right() {
        let lens = MutatingLens::new(1, |value: &i32| *value, |_, _| vec!["outer"]);
        let sequenced = lens.flat_map(|value, view| {
            MutatingLens::new(*value, |_| view + 1, |_, _| vec!["inner"])
        });
        assert_eq!(sequenced.view(), &2);
        assert_eq!(sequenced.effects(), &["outer", "inner"]);
        assert_eq!(sequenced.value(), &1);
    }

    #[rstest]
    fn test_prefixed_with_emits_prefix_first() {
        use parking_lot::Mutex;
        use std::sync::Arc;

        let lens = Observable::just(5).lens(|_| (), |_, states| vec![states.map(|state| state + 1)]);
        let lens = lens.prefixed_with(0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        lens.merged_effects().subscribe(move |value| seen_clone.lock().push(value));
        assert_eq!(*seen.lock(), vec![0, 6]);
    }

    #[rstest]
    fn test_lens_each_is_lazy_until_upstream_emits() {
        use crate::observable::PublishSubject;
        use parking_lot::Mutex;
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let evaluations = Arc::new(AtomicUsize::new(0));
        let evaluations_clone = evaluations.clone();
        let upstream = PublishSubject::new();
        let lenses = upstream.observable().lens_each(
            move |state: &i32| {
                evaluations_clone.fetch_add(1, Ordering::SeqCst);
                *state
            },
            |view, _| vec![view * 3],
        );
        let effects = Arc::new(Mutex::new(Vec::new()));
        let effects_clone = effects.clone();
        lenses.subscribe(move |lens| effects_clone.lock().extend(lens.into_effects()));

        assert_eq!(evaluations.load(Ordering::SeqCst), 0);
        upstream.on_next(2);
        upstream.on_next(4);
        assert_eq!(evaluations.load(Ordering::SeqCst), 2);
        assert_eq!(*effects.lock(), vec![6, 12]);
    }
}
