//! Condition store adapter
//!
//! Services may gate their start on a named condition expression. The
//! dependency graph behind conditions lives elsewhere; the supervisor core
//! only needs assert/deassert bookkeeping and the reload discipline that
//! marks everything in flux until re-asserted.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondState {
    On,
    Off,
    /// Asserted before the last reconfiguration and not yet re-confirmed.
    Flux,
}

#[derive(Debug, Default)]
pub struct CondStore {
    on: HashSet<String>,
    flux: HashSet<String>,
}

impl CondStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assert(&mut self, name: &str) {
        self.flux.remove(name);
        self.on.insert(name.to_string());
    }

    pub fn deassert(&mut self, name: &str) {
        self.on.remove(name);
        self.flux.remove(name);
    }

    pub fn state(&self, name: &str) -> CondState {
        if self.on.contains(name) {
            CondState::On
        } else if self.flux.contains(name) {
            CondState::Flux
        } else {
            CondState::Off
        }
    }

    pub fn is_on(&self, name: &str) -> bool {
        self.state(name) == CondState::On
    }

    /// Move every asserted condition to flux. Services depending on them
    /// stop or wait until the condition is re-asserted after the reload.
    pub fn reload(&mut self) {
        for name in self.on.drain() {
            self.flux.insert(name);
        }
    }
}
