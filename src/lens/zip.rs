//! N-ary lens products.
//!
//! `zipN` combines lenses over the same upstream value into one lens whose
//! view is the tuple of their views and whose effects are the concatenation
//! of their effects in argument order. The value of the first lens is kept.

use super::MutatingLens;

macro_rules! define_zip {
    ($(#[$attr:meta])* $arity:literal; $first:ident: $first_view:ident $(, $rest:ident: $rest_view:ident)+) => {
        paste::paste! {
            $(#[$attr])*
            pub fn [<zip $arity>]<A, C, $first_view, $($rest_view),+>(
                $first: MutatingLens<A, $first_view, C>,
                $($rest: MutatingLens<A, $rest_view, C>),+
            ) -> MutatingLens<A, ($first_view, $($rest_view),+), C> {
                let (value, [<$first _view>], mut effects) = $first.into_parts();
                $(
                    let (_, [<$rest _view>], [<$rest _effects>]) = $rest.into_parts();
                    effects.extend([<$rest _effects>]);
                )+
                MutatingLens::from_parts(value, ([<$first _view>], $([<$rest _view>]),+), effects)
            }
        }
    };
}

define_zip!(
    /// Zips two lenses.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cyclens::lens::{MutatingLens, zip2};
    ///
    /// let left = MutatingLens::new((), |_| 'l', |_, _| vec!["e1"]);
    /// let right = MutatingLens::new((), |_| 'r', |_, _| vec!["e2"]);
    ///
    /// let zipped = zip2(left, right);
    /// assert_eq!(zipped.view(), &('l', 'r'));
    /// assert_eq!(zipped.effects(), &["e1", "e2"]);
    /// ```
    2; first: B1, second: B2
);
define_zip!(
    /// Zips three lenses.
    3; first: B1, second: B2, third: B3
);
define_zip!(
    /// Zips four lenses.
    4; first: B1, second: B2, third: B3, fourth: B4
);
define_zip!(
    /// Zips five lenses.
    5; first: B1, second: B2, third: B3, fourth: B4, fifth: B5
);
define_zip!(
    /// Zips six lenses.
    6; first: B1, second: B2, third: B3, fourth: B4, fifth: B5, sixth: B6
);
