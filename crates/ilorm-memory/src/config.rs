//! Memory connector configuration.

/// Memory connector configuration.
///
/// The pacing knobs make cursors behave like a remote backend: slow to
/// become readable and delivering rows in batches.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Name reported by the connector in logs and errors
    pub name: String,
    /// Polls a cursor answers with `Pending` before becoming readable
    pub pending_polls: usize,
    /// Yield (`Pending` + wake) after every N rows; 0 never yields
    pub yield_every: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            pending_polls: 0,
            yield_every: 0,
        }
    }
}

impl MemoryConfig {
    /// Create a configuration with the given connector name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set how many polls cursors stay unreadable.
    pub fn pending_polls(mut self, n: usize) -> Self {
        self.pending_polls = n;
        self
    }

    /// Set the batch size after which cursors yield.
    pub fn yield_every(mut self, n: usize) -> Self {
        self.yield_every = n;
        self
    }
}
