//! Bounded window of recently delivered event identifiers.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of identifiers remembered by a receiver.
pub const DEFAULT_DEDUP_WINDOW_SIZE: usize = 1000;

/// FIFO-evicting set of recently seen event identifiers.
///
/// A capacity of zero disables deduplication entirely, and empty identifiers
/// are never recorded. When the window is full, recording a new identifier
/// evicts the oldest one.
///
/// [`seen`](Self::seen) and [`record`](Self::record) are separate calls, so two
/// concurrent deliveries of the same event can both pass the check before
/// either records. Webhook delivery is at-least-once, so handlers must already
/// tolerate the occasional duplicate.
#[derive(Debug)]
pub struct DedupWindow {
    capacity: usize,
    state: Mutex<WindowState>,
}

#[derive(Debug, Default)]
struct WindowState {
    members: HashSet<String>,
    order: VecDeque<String>,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Check whether `id` is in the window.
    pub fn seen(&self, id: &str) -> bool {
        if !self.is_enabled() || id.is_empty() {
            return false;
        }
        self.lock().members.contains(id)
    }

    /// Add `id` to the window, evicting the oldest entry when full.
    ///
    /// Recording an identifier that is already present does not refresh its
    /// position.
    pub fn record(&self, id: &str) {
        if !self.is_enabled() || id.is_empty() {
            return;
        }

        let mut state = self.lock();
        if state.members.contains(id) {
            return;
        }

        while state.order.len() >= self.capacity {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.members.remove(&oldest);
                }
                None => break,
            }
        }

        state.members.insert(id.to_string());
        state.order.push_back(id.to_string());
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // No code path panics while holding the guard.
    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW_SIZE)
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
