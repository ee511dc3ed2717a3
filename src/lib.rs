//! # cyclens
//!
//! A unidirectional-dataflow runtime: a feedback loop that threads an
//! immutable application state through a set of drivers, folds the events
//! they produce back into a new state, and republishes it, starting from a
//! seed.
//!
//! ## Overview
//!
//! - **Observable**: cold push-based streams, subjects and schedulers
//!   ([`observable`])
//! - **Lens**: [`MutatingLens`](lens::MutatingLens) and its algebra (`map`,
//!   `flat_map`, `prefixed`, `zip2`..`zip6`) ([`lens`])
//! - **Driver**: the capability drivers implement, and the isolation
//!   boundary that keeps one failing driver from stopping the loop
//!   ([`driver`])
//! - **Cycle**: the [`Router`](cycle::Router) contract, the
//!   [`Cycle`](cycle::Cycle) engine and [`CycledLens`](cycle::CycledLens)
//!   ([`cycle`])
//! - **Frame**: ordered windows of states for time-based drivers ([`frame`])
//!
//! ## Feature Flags
//!
//! - `async` (default): tokio scheduler and `futures::Stream` bridge
//! - `serde`: `Serialize`/`Deserialize` for [`Frame`](frame::Frame)
//! - `full`: Enable all features
//!
//! ## Example
//!
//! ```rust
//! use cyclens::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Model {
//!     total: i64,
//! }
//!
//! struct Counter {
//!     buttons: PublishSubject<&'static str>,
//! }
//!
//! impl Router for Counter {
//!     type State = Model;
//!     type Drivers = PublishSubject<&'static str>;
//!
//!     fn seed(&self) -> Model {
//!         Model { total: 0 }
//!     }
//!
//!     fn drivers_from(&self, _seed: &Model) -> Result<Self::Drivers, DriverError> {
//!         Ok(self.buttons.clone())
//!     }
//!
//!     fn effects(&self, incoming: Observable<Model>, buttons: &Self::Drivers) -> Observable<Model> {
//!         reduce(&buttons.observable(), &incoming, |button, model| match button {
//!             "increment" => Model { total: model.total + 1 },
//!             "decrement" => Model { total: model.total - 1 },
//!             _ => model,
//!         })
//!     }
//! }
//!
//! let buttons = PublishSubject::new();
//! let cycle = Cycle::new(Counter { buttons: buttons.clone() })?;
//! buttons.on_next("increment");
//! buttons.on_next("increment");
//! buttons.on_next("decrement");
//! assert_eq!(cycle.latest(), Some(Model { total: 1 }));
//! # Ok::<(), CycleError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types and traits.
///
/// # Usage
///
/// ```rust
/// use cyclens::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cycle::{Cycle, CycleConfig, CycledLens, Phase, Router, reduce};
    pub use crate::driver::{
        Driver, DriverExt, FailurePolicy, Isolated, RenderCache, RenderDriver, Rendering, isolate,
    };
    pub use crate::error::{CycleError, DriverError, StreamError};
    pub use crate::frame::Frame;
    pub use crate::lens::{MutatingLens, zip2, zip3, zip4, zip5, zip6};
    pub use crate::observable::{
        Event, LatestChannel, Observable, Observer, PublishSubject, Scheduler, StreamValue,
        Subscription, SubscriptionBag, TrampolineScheduler,
    };
}

pub mod cycle;
pub mod driver;
pub mod error;
pub mod frame;
pub mod lens;
pub mod observable;
