//! In-process counter state for the counter app

use parking_lot::{Mutex, MutexGuard};

/// Mutation requested by a client form submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAction {
    Increment,
    Reset,
}

impl CounterAction {
    /// Parse the `action` form field. Unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "increment" => Some(CounterAction::Increment),
            "reset" => Some(CounterAction::Reset),
            _ => None,
        }
    }
}

/// A single non-negative integer guarded by a mutex
#[derive(Debug, Default)]
pub struct Counter {
    value: Mutex<u64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value
    pub fn get(&self) -> u64 {
        *self.value.lock()
    }

    /// Add one and return the new value
    pub fn increment(&self) -> u64 {
        let mut value = self.value.lock();
        Self::apply_locked(&mut value, CounterAction::Increment)
    }

    /// Set the value back to zero
    pub fn reset(&self) {
        let mut value = self.value.lock();
        Self::apply_locked(&mut value, CounterAction::Reset);
    }

    /// Apply an action and return the resulting value
    pub fn apply(&self, action: CounterAction) -> u64 {
        let mut value = self.value.lock();
        Self::apply_locked(&mut value, action)
    }

    /// Take the lock so a caller can mutate and read under one critical section
    pub fn lock(&self) -> MutexGuard<'_, u64> {
        self.value.lock()
    }

    /// Apply an action through a guard obtained from [`Counter::lock`]
    pub fn apply_locked(value: &mut u64, action: CounterAction) -> u64 {
        match action {
            CounterAction::Increment => *value = value.saturating_add(1),
            CounterAction::Reset => *value = 0,
        }
        *value
    }
}
