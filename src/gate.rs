//! # Gate
//!
//! An AND-gate over named conditions. Callbacks registered with a set of
//! conditions run once all of those conditions are true.
//!
//! Callbacks are dispatched on `tokio::spawn` so a slow callback never holds
//! the gate lock, each fires at most once, and fired callbacks are removed.
//! The runtime uses a gate to flip `/readyz` once startup has finished.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Pending<C> {
    conditions: Vec<C>,
    callback: Callback,
}

struct GateState<C> {
    conditions: HashMap<C, bool>,
    pending: Vec<Pending<C>>,
}

pub struct Gate<C> {
    state: Mutex<GateState<C>>,
}

impl<C: Debug> Debug for Gate<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Gate")
            .field("conditions", &state.conditions)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl<C: Eq + Hash + Clone + Send + 'static> Default for Gate<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Eq + Hash + Clone + Send + 'static> Gate<C> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                conditions: HashMap::new(),
                pending: Vec::new(),
            }),
        }
    }

    /// Register a callback that runs once every condition in `conditions` is
    /// true. Unknown conditions start out false.
    ///
    /// Must be called within a Tokio runtime.
    pub fn register(&self, conditions: impl IntoIterator<Item = C>, callback: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let conditions: Vec<C> = conditions.into_iter().collect();
        for c in &conditions {
            state.conditions.entry(c.clone()).or_insert(false);
        }
        state.pending.push(Pending {
            conditions,
            callback: Box::new(callback),
        });
        Self::dispatch(&mut state);
    }

    /// Set a condition. Setting it true may release callbacks.
    ///
    /// Must be called within a Tokio runtime.
    pub fn set(&self, condition: C, value: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.conditions.insert(condition, value);
        if value {
            Self::dispatch(&mut state);
        }
    }

    /// True if the condition has been set true
    pub fn is_set(&self, condition: &C) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.conditions.get(condition).copied().unwrap_or(false)
    }

    /// Callbacks still waiting on at least one condition
    pub fn pending(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending.len()
    }

    fn dispatch(state: &mut GateState<C>) {
        let (ready, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut state.pending).into_iter().partition(|p| {
                p.conditions
                    .iter()
                    .all(|c| state.conditions.get(c).copied().unwrap_or(false))
            });
        state.pending = waiting;
        for p in ready {
            tokio::spawn(async move { (p.callback)() });
        }
    }
}
