use std::sync::atomic::{AtomicU64, Ordering};

/// Request ids: a random per-process seed xor-ed with a sequence number.
pub(crate) struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self::with_seed((seed_hi << 64) | seed_lo)
    }

    #[must_use]
    pub(crate) fn with_seed(seed: u128) -> Self {
        Self {
            seed,
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_id(&self) -> uuid::Uuid {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        uuid::Uuid::from_u128(self.seed ^ u128::from(seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_and_seeded() {
        let ids = RequestIdGenerator::with_seed(0);
        assert_eq!(ids.next_id(), uuid::Uuid::from_u128(1));
        assert_eq!(ids.next_id(), uuid::Uuid::from_u128(2));

        let random = RequestIdGenerator::new();
        assert_ne!(random.next_id(), random.next_id());
    }
}
