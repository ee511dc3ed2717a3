//! Property-based tests for the `MutatingLens` algebra.
//!
//! - **Zip Law**: `zip2(l1, l2).view() == (l1.view(), l2.view())` and
//!   `zip2(l1, l2).effects() == l1.effects() ++ l2.effects()`
//! - **Prefixed Law**: `l.prefixed(p).effects() == [p] ++ l.effects()`
//! - **Map Law**: `l.map(f).effects() == l.effects()`
//! - **FlatMap Law**: `l.flat_map(f).effects() == l.effects() ++ f(..).effects()`
//! - **Zip Associativity**: regrouping zips keeps the effect order

use cyclens::lens::{MutatingLens, zip2, zip3};
use proptest::prelude::*;

type TestLens = MutatingLens<i32, i64, u8>;

fn lens_from(value: i32, effects: Vec<u8>) -> TestLens {
    MutatingLens::new(value, |value| i64::from(*value) * 3, move |_, _| effects)
}

fn effects_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..8)
}

fn concatenated(lists: &[&[u8]]) -> Vec<u8> {
    lists.iter().flat_map(|list| list.iter().copied()).collect()
}

proptest! {
    /// Zip Law: views pair up, effects concatenate left to right
    #[test]
    fn prop_zip_tuple_law(
        first_value in any::<i32>(),
        second_value in any::<i32>(),
        first_effects in effects_strategy(),
        second_effects in effects_strategy()
    ) {
        let first = lens_from(first_value, first_effects.clone());
        let second = lens_from(second_value, second_effects.clone());
        let expected_view = (*first.view(), *second.view());

        let zipped = zip2(first, second);
        prop_assert_eq!(zipped.view(), &expected_view);
        let expected_effects = concatenated(&[&first_effects, &second_effects]);
        prop_assert_eq!(zipped.effects(), expected_effects.as_slice());
        prop_assert_eq!(zipped.value(), &first_value);
    }

    /// Prefixed Law: the prefix comes before every other effect
    #[test]
    fn prop_prefixed_law(value in any::<i32>(), effects in effects_strategy(), prefix in any::<u8>()) {
        let prefixed = lens_from(value, effects.clone()).prefixed(prefix);
        let expected_effects = concatenated(&[&[prefix], &effects]);
        prop_assert_eq!(prefixed.effects(), expected_effects.as_slice());
    }

    /// Map Law: rewriting the view leaves the effects untouched
    #[test]
    fn prop_map_preserves_effects(value in any::<i32>(), effects in effects_strategy()) {
        let mapped = lens_from(value, effects.clone()).map(|value, view| view - i64::from(*value));
        prop_assert_eq!(mapped.effects(), effects.as_slice());
        prop_assert_eq!(mapped.view(), &(i64::from(value) * 2));
    }

    /// FlatMap Law: outer effects first, then the derived lens's effects
    #[test]
    fn prop_flat_map_ordering_law(
        value in any::<i32>(),
        outer_effects in effects_strategy(),
        inner_effects in effects_strategy()
    ) {
        let inner = inner_effects.clone();
        let sequenced = lens_from(value, outer_effects.clone())
            .flat_map(move |value, _| lens_from(*value, inner));
        let expected_effects = concatenated(&[&outer_effects, &inner_effects]);
        prop_assert_eq!(sequenced.effects(), expected_effects.as_slice());
    }

    /// Zip Associativity: (a, b), c and a, (b, c) carry the same effect order
    #[test]
    fn prop_zip_regrouping_keeps_effect_order(
        first in effects_strategy(),
        second in effects_strategy(),
        third in effects_strategy()
    ) {
        let left = zip2(zip2(lens_from(0, first.clone()), lens_from(1, second.clone())), lens_from(2, third.clone()));
        let right = zip2(lens_from(0, first.clone()), zip2(lens_from(1, second.clone()), lens_from(2, third.clone())));
        let flat = zip3(lens_from(0, first), lens_from(1, second), lens_from(2, third));

        prop_assert_eq!(left.effects(), right.effects());
        prop_assert_eq!(left.effects(), flat.effects());
    }
}
