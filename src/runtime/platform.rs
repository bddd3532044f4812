use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use uuid::{Builder, Uuid};

/// Clock source for time-valued internal parameters.
pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Randomness source for random-valued internal parameters.
pub trait RandomProvider: Send + Sync {
    fn next_u64(&self) -> u64;
    fn next_f64(&self) -> f64;

    fn next_uuid(&self) -> Uuid {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.next_u64().to_le_bytes());
        bytes[8..].copy_from_slice(&self.next_u64().to_le_bytes());
        Builder::from_random_bytes(bytes).into_uuid()
    }
}

pub struct SystemClock;

impl TimeProvider for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant.
pub struct FixedClock {
    instant: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }
}

impl TimeProvider for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}

/// OS-seeded generator backed by the thread-local RNG.
pub struct ThreadRandom;

impl RandomProvider for ThreadRandom {
    fn next_u64(&self) -> u64 {
        rand::thread_rng().gen()
    }

    fn next_f64(&self) -> f64 {
        rand::thread_rng().gen()
    }
}

/// Deterministic generator for reproducible runs.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomProvider for SeededRandom {
    fn next_u64(&self) -> u64 {
        self.rng.lock().gen()
    }

    fn next_f64(&self) -> f64 {
        self.rng.lock().gen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_random_is_reproducible() {
        let a = SeededRandom::new(7);
        let b = SeededRandom::new(7);
        assert_eq!(a.next_u64(), b.next_u64());
        assert_eq!(a.next_uuid(), b.next_uuid());
        let x = a.next_f64();
        assert!((0.0..1.0).contains(&x));
    }

    #[test]
    fn generated_uuids_are_version_four() {
        let uuid = ThreadRandom.next_uuid();
        assert_eq!(uuid.get_version_num(), 4);
    }
}
