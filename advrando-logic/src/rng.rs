use serde::{Deserialize, Serialize};

/// xorshift64* seeded through splitmix64. Every operation consumes the
/// generator and returns the advanced one with its result, so a seed yields the
/// same sequence on every platform.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedRng {
    state: u64,
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl SeedRng {
    pub fn new(seed: u64) -> Self {
        let state = splitmix64(seed);
        // xorshift has a fixed point at zero.
        SeedRng {
            state: if state == 0 { 0x9E37_79B9_7F4A_7C15 } else { state },
        }
    }

    pub fn next_u64(self) -> (u64, SeedRng) {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        (x.wrapping_mul(0x2545_F491_4F6C_DD1D), SeedRng { state: x })
    }

    /// Uniform float in [0, 1).
    pub fn next_f64(self) -> (f64, SeedRng) {
        let (x, rng) = self.next_u64();
        ((x >> 11) as f64 * (1.0 / (1u64 << 53) as f64), rng)
    }

    /// Uniform integer in [lo, hi). Returns `lo` when the range is empty.
    pub fn range(self, lo: i64, hi: i64) -> (i64, SeedRng) {
        if hi <= lo {
            return (lo, self);
        }
        let span = hi.wrapping_sub(lo) as u64;
        let (x, rng) = self.next_u64();
        let offset = ((x as u128 * span as u128) >> 64) as u64;
        (lo.wrapping_add(offset as i64), rng)
    }

    /// Uniform index in [0, len). Returns 0 for an empty range.
    pub fn index(self, len: usize) -> (usize, SeedRng) {
        let (i, rng) = self.range(0, len as i64);
        (i as usize, rng)
    }

    pub fn choice<T>(self, items: &[T]) -> (Option<&T>, SeedRng) {
        if items.is_empty() {
            return (None, self);
        }
        let (i, rng) = self.index(items.len());
        (items.get(i), rng)
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(self, mut items: Vec<T>) -> (Vec<T>, SeedRng) {
        let mut rng = self;
        for i in (1..items.len()).rev() {
            let (j, next) = rng.index(i + 1);
            rng = next;
            items.swap(i, j);
        }
        (items, rng)
    }

    /// Splits off an independent generator, e.g. to give each attempt its own seed.
    pub fn fork(self) -> (SeedRng, SeedRng) {
        let (x, rng) = self.next_u64();
        (SeedRng::new(x), rng)
    }

    pub fn next_seed(self) -> (u64, SeedRng) {
        let (x, rng) = self.next_u64();
        (x & 0xFFFF_FFFF, rng)
    }
}
