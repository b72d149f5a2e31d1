//! Boundaries to the collaborators the engine drives but does not own: the
//! transport solver, intracellular models and the agent factory.

use std::fmt;

use glam::DVec3;

use crate::cell::Cell;
use crate::phenotype::Phenotype;
use crate::rng::{UniformRandom, unit_circle, unit_sphere};

/// Continuum substrate field the cells live in.
pub trait Microenvironment: Send + Sync {
    /// Exchange substrates between `cell` and its surroundings for `dt` minutes.
    fn secretion_uptake(&self, _cell: &Cell, _dt: f64) {}

    /// Substrate densities sampled at `position`, indexed by substrate.
    fn density_at(&self, _position: DVec3) -> Vec<f64> {
        Vec::new()
    }

    /// Index of the substrate called `name`, if present.
    fn density_index(&self, _name: &str) -> Option<usize> {
        None
    }
}

/// Environment without substrates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEnvironment;

impl Microenvironment for NullEnvironment {}

/// Spatially uniform densities, fixed for the whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformEnvironment {
    names: Vec<String>,
    values: Vec<f64>,
}

impl UniformEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite substrate `name`.
    #[must_use]
    pub fn with_substrate(mut self, name: impl Into<String>, value: f64) -> Self {
        let name = name.into();
        match self.names.iter().position(|existing| *existing == name) {
            Some(index) => self.values[index] = value,
            None => {
                self.names.push(name);
                self.values.push(value);
            }
        }
        self
    }
}

impl Microenvironment for UniformEnvironment {
    fn density_at(&self, _position: DVec3) -> Vec<f64> {
        self.values.clone()
    }

    fn density_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|existing| existing == name)
    }
}

/// Intracellular sub-model stepped ahead of the phenotype block.
pub trait Intracellular: fmt::Debug + Send + Sync {
    fn needs_update(&self) -> bool;

    fn update(&mut self, phenotype: &mut Phenotype, dt: f64);

    fn clone_box(&self) -> Box<dyn Intracellular>;
}

impl Clone for Box<dyn Intracellular> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Creates daughter cells when a queued division is flushed.
pub trait AgentFactory: Send + Sync {
    /// Split `parent`, returning the child. The caller registers both.
    fn divide(&self, parent: &mut Cell, rng: &mut dyn UniformRandom) -> Cell;
}

/// Distance of each daughter from the parent's centre, relative to its radius.
const DIVISION_OFFSET: f64 = 0.20784;

/// Halves the parent and places the daughters back to back along a random axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDivision;

impl AgentFactory for StandardDivision {
    fn divide(&self, parent: &mut Cell, rng: &mut dyn UniformRandom) -> Cell {
        let direction = if parent.phenotype.motility.restrict_to_2d {
            unit_circle(rng)
        } else {
            unit_sphere(rng)
        };
        let offset = direction * (DIVISION_OFFSET * parent.phenotype.geometry.radius);

        parent.phenotype.volume.multiply_by_ratio(0.5);
        parent.phenotype.update_geometry();

        let mut child = parent.clone();
        child.position = parent.position + offset;
        child.velocity = DVec3::ZERO;
        child.previous_velocity = DVec3::ZERO;
        child.state.neighbors.clear();
        child.state.spring_attachments.clear();
        child.state.attached_cells.clear();
        child.state.simple_pressure = 0.0;
        child.state.damage = 0.0;
        child.state.total_attack_time = 0.0;

        let nuclei = parent.state.number_of_nuclei;
        child.state.number_of_nuclei = (nuclei / 2).max(1);
        parent.state.number_of_nuclei = nuclei.saturating_sub(nuclei / 2).max(1);
        parent.position -= offset;
        child
    }
}
