// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It is used only for simulation noise and sequence shuffling.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
    spare_gaussian: Option<f64>,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self {
            state: seed,
            spare_gaussian: None,
        }
    }

    /// Seed from the system clock. Good enough for non-reproducible runs.
    pub fn from_entropy() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::new(nanos)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        // Marsaglia / Vigna family. Simple, fast, decent for simulation noise.
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    pub fn next_f64_01(&mut self) -> f64 {
        // Convert to [0,1).
        let x = self.next_u32();
        (x as f64) / (u32::MAX as f64 + 1.0)
    }

    #[inline]
    pub fn gen_range_f64(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64_01()
    }

    #[inline]
    pub fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        let span = (high - low) as u32;
        let v = self.next_u32() % span;
        low + v as usize
    }

    /// Standard normal via Box-Muller. Caches the spare deviate.
    pub fn next_gaussian(&mut self) -> f64 {
        if let Some(z) = self.spare_gaussian.take() {
            return z;
        }
        loop {
            let u = self.next_f64_01();
            if u <= f64::EPSILON {
                continue;
            }
            let v = self.next_f64_01();
            let r = (-2.0 * u.ln()).sqrt();
            let theta = std::f64::consts::TAU * v;
            self.spare_gaussian = Some(r * theta.sin());
            return r * theta.cos();
        }
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.gen_range_usize(0, i + 1);
            items.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_stays_in_bounds() {
        let mut rng = Prng::new(42);
        for _ in 0..1000 {
            let v = rng.gen_range_f64(-1.0, 1.0);
            assert!((-1.0..1.0).contains(&v));
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let mut a = Prng::new(7);
        let mut b = Prng::new(7);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn gaussian_is_roughly_centered() {
        let mut rng = Prng::new(1234);
        let n = 10_000;
        let mean: f64 = (0..n).map(|_| rng.next_gaussian()).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean was {mean}");
    }

    #[test]
    fn shuffle_keeps_all_elements() {
        let mut rng = Prng::new(9);
        let mut v = vec![1, 2, 3, 4, 5];
        rng.shuffle(&mut v);
        let mut sorted = v.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
    }
}
