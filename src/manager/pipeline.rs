//! Windowed pipelining
//!
//! Bookkeeping for in-flight requests: a map from request name to its
//! continuation, bounded by the window size. The drain loop lives in
//! the manager; this type guards the bound.

use std::collections::HashMap;

use crate::manager::Continuation;
use crate::name::Name;

/// The set of in-flight requests, at most `window_size` of them.
#[derive(Debug)]
pub struct Pipeline {
    pending: HashMap<Name, Continuation>,
    window_size: usize,
}

impl Pipeline {
    /// An empty pipeline admitting `window_size` in-flight requests.
    pub fn new(window_size: usize) -> Self {
        Pipeline {
            pending: HashMap::new(),
            window_size,
        }
    }

    /// Whether another request may enter the window.
    pub fn has_capacity(&self) -> bool {
        self.pending.len() < self.window_size
    }

    /// Track a request as in flight.
    pub fn insert(&mut self, name: Name, continuation: Continuation) {
        self.pending.insert(name, continuation);
    }

    /// Stop tracking a completed request, yielding its continuation.
    pub fn remove(&mut self, name: &Name) -> Option<Continuation> {
        self.pending.remove(name)
    }

    /// Whether a request for `name` is in flight.
    pub fn contains(&self, name: &Name) -> bool {
        self.pending.contains_key(name)
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no requests are in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The configured window size.
    pub fn window_size(&self) -> usize {
        self.window_size
    }
}
