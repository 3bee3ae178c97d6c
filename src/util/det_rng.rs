//! Deterministic pseudo-random number generator for backoff jitter.
//!
//! Uses xorshift64. Given the same seed, the sequence of generated numbers
//! is always identical, so a seeded retry policy produces reproducible
//! delays. NOT cryptographically secure.

/// A deterministic pseudo-random number generator using xorshift64.
#[derive(Debug, Clone)]
pub struct DetRng {
    state: u64,
}

impl DetRng {
    /// Creates a new PRNG with the given seed.
    ///
    /// A zero seed is replaced with 1; xorshift never leaves zero.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Generates the next pseudo-random u64 value.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Generates a value in `[0.0, 1.0]`.
    #[allow(clippy::cast_precision_loss)]
    pub fn next_unit(&mut self) -> f64 {
        self.next_u64() as f64 / u64::MAX as f64
    }
}
