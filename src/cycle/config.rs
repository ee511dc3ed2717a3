//! Engine configuration.

use std::borrow::Cow;

/// Settings for a [`Cycle`](super::Cycle).
///
/// # Examples
///
/// ```rust
/// use cyclens::cycle::CycleConfig;
///
/// let config = CycleConfig::new("counter").dedupe_states(true);
/// assert_eq!(config.name(), "counter");
/// assert!(config.dedupes_states());
/// assert!(!config.logs_states());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleConfig {
    name: Cow<'static, str>,
    dedupe_states: bool,
    log_states: bool,
}

impl CycleConfig {
    /// Creates a configuration with every option off.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            dedupe_states: false,
            log_states: false,
        }
    }

    /// Sets the engine name, used as the tracing span name field.
    #[must_use]
    pub fn name_as(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Hides consecutive equal states from the router's effect function.
    ///
    /// Off by default: de-duplication is a driver concern, and an engine
    /// that dedupes centrally would hide a republish some driver may rely on.
    #[must_use]
    pub const fn dedupe_states(mut self, enabled: bool) -> Self {
        self.dedupe_states = enabled;
        self
    }

    /// Emits a `trace!` event for every published state.
    #[must_use]
    pub const fn log_states(mut self, enabled: bool) -> Self {
        self.log_states = enabled;
        self
    }

    /// The engine name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether consecutive equal states are hidden from the router.
    pub const fn dedupes_states(&self) -> bool {
        self.dedupe_states
    }

    /// Whether every published state is traced.
    pub const fn logs_states(&self) -> bool {
        self.log_states
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self::new("cycle")
    }
}
