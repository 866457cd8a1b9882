//! User-facing trace buffer
//!
//! Traces are session data: a branch collects entries keyed by
//! hierarchical category names (`elab.step`, `task.wait`, ...) and the
//! driver folds them into the result tree when the branch ends. Category
//! enablement is inherited through the context and checked by name
//! prefix, so enabling `elab` also enables `elab.step`.
//!
//! This is distinct from the crate's own `tracing` output, which is
//! operator observability, not part of any reported result.

use quill_kernel::Name;
use serde::{Deserialize, Serialize};

/// One trace entry, possibly with nested detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub category: Name,
    pub text: String,
    pub children: Vec<TraceEntry>,
}

impl TraceEntry {
    pub fn new(category: Name, text: impl Into<String>) -> Self {
        TraceEntry {
            category,
            text: text.into(),
            children: Vec::new(),
        }
    }
}

/// The trace entries collected by one branch, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceState {
    entries: Vec<TraceEntry>,
}

impl TraceState {
    pub fn new() -> Self {
        TraceState::default()
    }

    pub fn add(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move the entries out, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<TraceEntry> {
        std::mem::take(&mut self.entries)
    }
}

/// Whether `category` is switched on by the enabled set.
pub fn is_trace_enabled(enabled: &im::HashSet<Name>, category: &Name) -> bool {
    enabled.iter().any(|c| c.is_prefix_of(category))
}
