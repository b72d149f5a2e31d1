//! Core types for the cellsim engine: cell agents with phase-transition life
//! cycles, force-based mechanics and pairwise interactions, advanced on a
//! uniform voxel grid by a multi-rate scheduler.

mod arena;
pub mod cell;
pub mod config;
pub mod cycle;
pub mod environment;
pub mod interactions;
pub mod mechanics;
pub mod phenotype;
pub mod rng;
mod schedule;
mod simulation;
pub mod standard_models;
pub mod volume;

pub use arena::CellArena;
pub use cell::{Cell, CellDefinition, CellFunctions, CellParameters, CellState};
pub use cellsim_index::{DomainBounds, Face, Location, Relocation, VoxelIndex};
pub use config::{BoundaryCondition, Integrator, SimConfig, SimConfigError};
pub use cycle::{CycleModel, CycleModelError, CycleState, ModelFamily, PhaseCode};
pub use environment::{
    AgentFactory, Intracellular, Microenvironment, NullEnvironment, StandardDivision,
    UniformEnvironment,
};
pub use phenotype::Phenotype;
pub use schedule::{Cadence, DeferredSet};
pub use simulation::{Simulation, TickSummary};
pub use standard_models::StandardModels;

use cellsim_index::IndexError;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use thiserror::Error;

new_key_type! {
    /// Stable handle for cells backed by a generational slot map.
    pub struct CellId;
}

/// Monotonic counter of scheduler invocations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Counter value after one more scheduler call.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Counter of a simulation that has not ticked yet.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Errors that can occur when constructing or populating a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] SimConfigError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    CycleModel(#[from] CycleModelError),
    /// A cell was requested for a type id with no registered definition.
    #[error("unknown cell type {0}")]
    UnknownCellType(usize),
}
