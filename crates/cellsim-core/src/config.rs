//! Simulation-wide configuration.

use cellsim_index::DomainBounds;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating a [`SimConfig`].
#[derive(Debug, Error, PartialEq)]
pub enum SimConfigError {
    /// A timestep, domain extent or capacity is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// What happens to a cell pushed through a domain face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryCondition {
    /// File it in the outer bucket and stop updating it.
    #[default]
    Ignore,
    /// File it in the outer bucket and remove it at the next barrier.
    Remove,
    /// Project it back just inside the domain.
    Clamp,
}

/// Position update rule applied after velocities are accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrator {
    /// `x += dt * v`
    #[default]
    ForwardEuler,
    /// `x += dt * (1.5 v - 0.5 v_prev)`
    AdamsBashforth2,
}

/// Static configuration for a simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Simulation domain in length units (microns).
    pub domain: DomainBounds,
    /// Edge length of the mechanics voxels.
    pub voxel_size: f64,
    /// Interval between scheduler ticks (minutes).
    pub diffusion_dt: f64,
    /// Interval between phenotype updates (minutes).
    pub phenotype_dt: f64,
    /// Interval between mechanics updates (minutes).
    pub mechanics_dt: f64,
    /// Policy for cells that leave the domain.
    pub boundary_condition: BoundaryCondition,
    /// Position integration scheme.
    pub integrator: Integrator,
    /// Run the dynamic spring attach/detach and elastic spring passes.
    pub automated_spring_adhesions: bool,
    /// Number of tick summaries retained in memory; 0 disables history.
    pub history_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            domain: DomainBounds::default(),
            voxel_size: 30.0,
            diffusion_dt: 0.01,
            phenotype_dt: 6.0,
            mechanics_dt: 0.1,
            boundary_condition: BoundaryCondition::default(),
            integrator: Integrator::default(),
            automated_spring_adhesions: true,
            history_capacity: 256,
        }
    }
}

impl SimConfig {
    /// Check that every value can be used to build a simulation.
    pub fn validate(&self) -> Result<(), SimConfigError> {
        if self.domain.validate().is_err() {
            return Err(SimConfigError::InvalidConfig(
                "domain bounds must be finite with min < max on every axis",
            ));
        }
        if !self.voxel_size.is_finite() || self.voxel_size <= 0.0 {
            return Err(SimConfigError::InvalidConfig(
                "voxel_size must be positive and finite",
            ));
        }
        for dt in [self.diffusion_dt, self.phenotype_dt, self.mechanics_dt] {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(SimConfigError::InvalidConfig(
                    "diffusion_dt, phenotype_dt and mechanics_dt must be positive",
                ));
            }
        }
        Ok(())
    }

    /// Seed for the per-cell streams; drawn from entropy when unset.
    pub(crate) fn resolve_seed(&self) -> u64 {
        self.rng_seed.unwrap_or_else(rand::random)
    }
}
