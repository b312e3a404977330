//! Read configuration passed explicitly to streams and validators.

/// Default number of elements held in memory per block.
pub const DEFAULT_MEMORY_BUDGET: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Upper bound on the number of elements loaded per block.
    pub memory_budget: u64,
}

impl ReadOptions {
    pub fn with_memory_budget(memory_budget: u64) -> Self {
        Self { memory_budget }
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_MEMORY_BUDGET,
        }
    }
}
