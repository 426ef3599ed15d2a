//! Size Accounting Module
//!
//! Estimates entry sizes and keeps the running byte total for the store.

use serde_json::Value;

// == Size Accountant ==
/// Tracks the summed estimated size of all stored entries.
#[derive(Debug, Default)]
pub struct SizeAccountant {
    used_bytes: usize,
}

impl SizeAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    // == Estimate ==
    /// Estimated footprint of an entry: key bytes plus compact JSON bytes.
    pub fn estimate(key: &str, value: &Value) -> usize {
        key.len() + value.to_string().len()
    }

    pub fn add(&mut self, bytes: usize) {
        self.used_bytes += bytes;
    }

    pub fn sub(&mut self, bytes: usize) {
        self.used_bytes = self.used_bytes.saturating_sub(bytes);
    }

    /// Bytes currently accounted for.
    pub fn used(&self) -> usize {
        self.used_bytes
    }

    pub fn reset(&mut self) {
        self.used_bytes = 0;
    }
}
