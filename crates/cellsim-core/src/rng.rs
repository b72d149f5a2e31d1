//! Uniform random capability and reproducible per-cell streams.

use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use slotmap::Key;

use crate::{CellId, Tick};

/// Mixing constant applied to the tick counter when deriving streams.
const TICK_PRIME: u64 = 0x9E37_79B9_7F4A_7C15;
/// Mixing constant applied to the pass discriminant.
const PASS_PRIME: u64 = 0xC2B2_AE3D_27D4_EB4F;
/// Mixing constant applied to the cell handle.
const CELL_PRIME: u64 = 0x1656_67B1_9E37_79F9;

/// Source of uniform draws in `[0, 1)`.
pub trait UniformRandom {
    fn uniform(&mut self) -> f64;

    /// True with probability `probability`; zero or negative never fires.
    fn chance(&mut self, probability: f64) -> bool {
        self.uniform() < probability
    }
}

impl<R: RngCore> UniformRandom for R {
    fn uniform(&mut self) -> f64 {
        self.random::<f64>()
    }
}

/// Scheduler sub-pass a stream is drawn for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Phenotype = 1,
    Division = 2,
    Velocity = 3,
    Springs = 4,
    Interactions = 5,
}

/// Independent stream for one cell in one pass of one tick.
///
/// Streams depend only on the seed and their coordinates, never on which
/// worker thread evaluates the cell.
#[must_use]
pub fn cell_stream(seed: u64, tick: Tick, pass: Pass, id: CellId) -> SmallRng {
    let slot = id.data().as_ffi();
    let mixed = seed
        .wrapping_add(tick.0.wrapping_mul(TICK_PRIME))
        .wrapping_add((pass as u64).wrapping_mul(PASS_PRIME))
        ^ slot.wrapping_mul(CELL_PRIME);
    SmallRng::seed_from_u64(mixed)
}

/// Replays a fixed list of draws, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: Vec<f64>,
    cursor: usize,
}

impl SequenceRandom {
    #[must_use]
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, cursor: 0 }
    }

    /// Stream that always yields `value`.
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }

    /// Number of draws taken so far.
    #[must_use]
    pub fn draws(&self) -> usize {
        self.cursor
    }
}

impl UniformRandom for SequenceRandom {
    fn uniform(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        value
    }
}

/// Uniformly distributed point on the unit sphere.
pub fn unit_sphere(rng: &mut dyn UniformRandom) -> glam::DVec3 {
    let z = 2.0 * rng.uniform() - 1.0;
    let theta = rng.uniform() * std::f64::consts::TAU;
    let r = (1.0 - z * z).max(0.0).sqrt();
    glam::DVec3::new(r * theta.cos(), r * theta.sin(), z)
}

/// Uniformly distributed point on the unit circle in the xy plane.
pub fn unit_circle(rng: &mut dyn UniformRandom) -> glam::DVec3 {
    let theta = rng.uniform() * std::f64::consts::TAU;
    glam::DVec3::new(theta.cos(), theta.sin(), 0.0)
}
