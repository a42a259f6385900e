//! Data-parallel stages over a numeric buffer
//!
//! Every stage is a rayon parallel iterator, so it returns only after all of
//! its chunks are done: no stage can overlap the next. Stages run on whatever
//! pool is current; the runner installs its fixed-size [`WorkPool`] around
//! them.
//!
//! [`WorkPool`]: crate::pipeline::pool::WorkPool

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

/// Inner accumulation steps of [`transform`]
pub const TRANSFORM_ITERATIONS: usize = 10;

/// Fill `buffer` with pseudo-random values in [0, 1)
///
/// Chunk `i` of `chunk_size` elements draws from its own xoshiro256++ stream
/// seeded with `seed + i`, so the contents depend only on `seed` and
/// `chunk_size`, never on the thread count or scheduling.
pub fn initialize(buffer: &mut [f64], seed: u64, chunk_size: usize) {
    let chunk_size = chunk_size.max(1);

    buffer
        .par_chunks_mut(chunk_size)
        .enumerate()
        .for_each(|(index, chunk)| {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(index as u64));
            for value in chunk.iter_mut() {
                *value = rng.gen::<f64>();
            }
        });
}

/// Mean of all elements
///
/// Each chunk is summed with Neumaier compensation and the partial sums are
/// combined by rayon's tree reduction. An empty buffer averages to 0.0.
pub fn compute_average(buffer: &[f64], chunk_size: usize) -> f64 {
    if buffer.is_empty() {
        return 0.0;
    }

    let total = buffer
        .par_chunks(chunk_size.max(1))
        .map(|chunk| {
            let mut sum = CompensatedSum::default();
            for &value in chunk {
                sum.add(value);
            }
            sum
        })
        .reduce(CompensatedSum::default, CompensatedSum::merge);

    total.value() / buffer.len() as f64
}

/// Scale every element by `factor`, then replace it with the mean of the
/// weighted accumulation `sum(scaled * j for j in 0..10)`
///
/// Equivalent to `x * factor * 4.5` up to rounding.
pub fn transform(buffer: &mut [f64], factor: f64) {
    buffer.par_iter_mut().for_each(|value| {
        let scaled = *value * factor;

        let mut accumulated = 0.0;
        for j in 0..TRANSFORM_ITERATIONS {
            accumulated += scaled * j as f64;
        }
        *value = accumulated / TRANSFORM_ITERATIONS as f64;
    });
}

/// Neumaier (improved Kahan) running sum
#[derive(Debug, Clone, Copy, Default)]
struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    #[inline]
    fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    fn merge(mut self, other: Self) -> Self {
        self.add(other.sum);
        self.compensation += other.compensation;
        self
    }

    fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}
