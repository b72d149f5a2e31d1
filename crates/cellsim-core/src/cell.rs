//! Cell agents, their per-type templates and pluggable behaviour.

use std::fmt;
use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::CellId;
use crate::environment::{Intracellular, Microenvironment};
use crate::mechanics::{VelocityContext, VelocityUpdate};
use crate::phenotype::Phenotype;
use crate::rng::UniformRandom;

/// Per-cell rule with mutable access to the cell it runs on.
pub type CellRule = Arc<dyn Fn(&mut Cell, &dyn Microenvironment, f64) + Send + Sync>;

/// Velocity rule; reads the population and returns the update to apply.
pub type VelocityRule = Arc<
    dyn Fn(&VelocityContext<'_>, CellId, &Cell, f64, &mut dyn UniformRandom) -> VelocityUpdate
        + Send
        + Sync,
>;

/// Basement-membrane contribution to a cell's velocity.
pub type MembraneRule = Arc<dyn Fn(&Cell, f64) -> DVec3 + Send + Sync>;

/// Velocity contribution of one attached partner on a cell.
pub type ContactRule = Arc<dyn Fn(&Cell, &Cell, f64) -> DVec3 + Send + Sync>;

/// Optional behaviour hooks. An absent hook is skipped.
#[derive(Clone, Default)]
pub struct CellFunctions {
    pub update_phenotype: Option<CellRule>,
    pub update_volume: Option<CellRule>,
    pub custom_rule: Option<CellRule>,
    pub pre_intracellular: Option<CellRule>,
    pub post_intracellular: Option<CellRule>,
    pub update_velocity: Option<VelocityRule>,
    pub basement_membrane: Option<MembraneRule>,
    pub contact: Option<ContactRule>,
}

impl fmt::Debug for CellFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellFunctions")
            .field("update_phenotype", &self.update_phenotype.is_some())
            .field("update_volume", &self.update_volume.is_some())
            .field("custom_rule", &self.custom_rule.is_some())
            .field("pre_intracellular", &self.pre_intracellular.is_some())
            .field("post_intracellular", &self.post_intracellular.is_some())
            .field("update_velocity", &self.update_velocity.is_some())
            .field("basement_membrane", &self.basement_membrane.is_some())
            .field("contact", &self.contact.is_some())
            .finish()
    }
}

/// How the oxygen rule drives necrosis once pO2 drops below threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NecrosisType {
    #[default]
    Stochastic,
    Deterministic,
}

/// Oxygen response thresholds used by the default phenotype rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellParameters {
    pub o2_proliferation_saturation: f64,
    pub o2_proliferation_threshold: f64,
    pub o2_reference: f64,
    pub o2_necrosis_threshold: f64,
    pub o2_necrosis_max: f64,
    pub max_necrosis_rate: f64,
    pub necrosis_type: NecrosisType,
}

impl Default for CellParameters {
    fn default() -> Self {
        Self {
            o2_proliferation_saturation: 160.0,
            o2_proliferation_threshold: 5.0,
            o2_reference: 160.0,
            o2_necrosis_threshold: 5.0,
            o2_necrosis_max: 2.5,
            max_necrosis_rate: 1.0 / (6.0 * 60.0),
            necrosis_type: NecrosisType::default(),
        }
    }
}

/// Relational state rebuilt or maintained by the mechanics and interaction passes.
#[derive(Debug, Clone, PartialEq)]
pub struct CellState {
    /// Cells within adhesion range, recomputed every mechanics tick.
    pub neighbors: Vec<CellId>,
    /// Symmetric spring partners, persistent across ticks.
    pub spring_attachments: Vec<CellId>,
    /// Symmetric manual attachments consumed by the contact rule.
    pub attached_cells: Vec<CellId>,
    pub simple_pressure: f64,
    pub damage: f64,
    pub total_attack_time: f64,
    pub number_of_nuclei: u32,
}

impl Default for CellState {
    fn default() -> Self {
        Self {
            neighbors: Vec::new(),
            spring_attachments: Vec::new(),
            attached_cells: Vec::new(),
            simple_pressure: 0.0,
            damage: 0.0,
            total_attack_time: 0.0,
            number_of_nuclei: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub type_id: usize,
    pub position: DVec3,
    pub velocity: DVec3,
    pub previous_velocity: DVec3,
    pub is_movable: bool,
    pub phenotype: Phenotype,
    pub state: CellState,
    pub parameters: CellParameters,
    pub functions: CellFunctions,
    pub intracellular: Option<Box<dyn Intracellular>>,
}

impl Cell {
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.phenotype.death.dead
    }

    /// Largest distance at which this cell still adheres to another.
    #[must_use]
    pub fn reach(&self) -> f64 {
        self.phenotype.geometry.radius * self.phenotype.mechanics.relative_maximum_adhesion_distance
    }

    /// Adopt `definition`'s behaviour while keeping this cell's size and place.
    pub fn transform_into(&mut self, definition: &CellDefinition) {
        let volume = self.phenotype.volume;
        let geometry = self.phenotype.geometry;
        self.type_id = definition.type_id;
        self.phenotype = definition.phenotype.clone();
        self.phenotype.volume = volume;
        self.phenotype.geometry = geometry;
        self.parameters = definition.parameters.clone();
        self.functions = definition.functions.clone();
        self.intracellular = definition.intracellular.clone();
        self.is_movable = definition.is_movable;
    }
}

/// Template every cell of one type is instantiated from.
#[derive(Debug, Clone)]
pub struct CellDefinition {
    pub name: String,
    /// Assigned when the definition is registered on a simulation.
    pub type_id: usize,
    pub phenotype: Phenotype,
    pub parameters: CellParameters,
    pub functions: CellFunctions,
    pub intracellular: Option<Box<dyn Intracellular>>,
    pub is_movable: bool,
}

impl CellDefinition {
    /// A movable definition with no behaviour hooks.
    #[must_use]
    pub fn new(name: impl Into<String>, phenotype: Phenotype) -> Self {
        Self {
            name: name.into(),
            type_id: 0,
            phenotype,
            parameters: CellParameters::default(),
            functions: CellFunctions::default(),
            intracellular: None,
            is_movable: true,
        }
    }

    /// A fresh cell of this type at `position`.
    #[must_use]
    pub fn instantiate(&self, position: DVec3) -> Cell {
        let mut phenotype = self.phenotype.clone();
        phenotype.update_geometry();
        Cell {
            type_id: self.type_id,
            position,
            velocity: DVec3::ZERO,
            previous_velocity: DVec3::ZERO,
            is_movable: self.is_movable,
            phenotype,
            state: CellState::default(),
            parameters: self.parameters.clone(),
            functions: self.functions.clone(),
            intracellular: self.intracellular.clone(),
        }
    }
}
