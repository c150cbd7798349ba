//! Identifier generation
//!
//! Model identifiers are minted before the model exists (the artifact is named
//! after them), so generation lives apart from any persistence layer.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of fresh identifiers
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Uuid;
}

/// Random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn generate(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Predictable identifiers `00000000-0000-0000-0000-000000000001`, `...02`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier the `n`th call to `generate` returns (1-based)
    pub fn nth(n: u64) -> Uuid {
        Uuid::from_u128(n as u128)
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Self::nth(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new();
        assert_eq!(ids.generate(), SequentialIds::nth(1));
        assert_eq!(ids.generate(), SequentialIds::nth(2));
        assert_eq!(
            SequentialIds::nth(1).to_string(),
            "00000000-0000-0000-0000-000000000001"
        );
    }

    #[test]
    fn test_random_ids_differ() {
        let ids = RandomIds;
        assert_ne!(ids.generate(), ids.generate());
    }
}
