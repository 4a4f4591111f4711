//! Codec configuration.

use crate::wire::DEFAULT_RECURSION_LIMIT;

/// Configuration shared by every operation run through a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Maximum depth of nested message frames accepted on decode
    pub recursion_limit: usize,
    /// Fail a fresh decode when a required field never appears
    pub enforce_required: bool,
    /// Initial capacity of workspaces created by the registry
    pub initial_capacity: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            enforce_required: true,
            initial_capacity: 64,
        }
    }
}

impl CodecConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Sets whether missing required fields fail a decode
    pub fn enforce_required(mut self, enforce: bool) -> Self {
        self.enforce_required = enforce;
        self
    }

    /// Sets the initial workspace capacity
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}
