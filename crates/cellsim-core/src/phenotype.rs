//! Per-cell phenotype: cycle position, death, volume, geometry, mechanics,
//! motility and interaction parameters.

use std::f64::consts::PI;
use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::cycle::{CycleModel, CycleState};
use crate::rng::UniformRandom;

/// Volume components in cubic microns together with their relaxation targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub total: f64,
    pub solid: f64,
    pub fluid: f64,
    pub fluid_fraction: f64,
    pub nuclear: f64,
    pub nuclear_fluid: f64,
    pub nuclear_solid: f64,
    pub cytoplasmic: f64,
    pub cytoplasmic_fluid: f64,
    pub cytoplasmic_solid: f64,
    pub calcified_fraction: f64,
    pub cytoplasmic_to_nuclear_ratio: f64,
    pub rupture_volume: f64,

    pub cytoplasmic_biomass_change_rate: f64,
    pub nuclear_biomass_change_rate: f64,
    pub fluid_change_rate: f64,
    pub calcification_rate: f64,

    pub target_solid_cytoplasmic: f64,
    pub target_solid_nuclear: f64,
    pub target_fluid_fraction: f64,
    pub target_cytoplasmic_to_nuclear_ratio: f64,
    pub relative_rupture_volume: f64,
}

impl Default for Volume {
    fn default() -> Self {
        let total = 2494.0;
        let fluid_fraction = 0.75;
        let nuclear = 540.0;
        let cytoplasmic = total - nuclear;
        let nuclear_solid = (1.0 - fluid_fraction) * nuclear;
        let cytoplasmic_solid = (1.0 - fluid_fraction) * cytoplasmic;
        let relative_rupture_volume = 2.0;
        Self {
            total,
            solid: (1.0 - fluid_fraction) * total,
            fluid: fluid_fraction * total,
            fluid_fraction,
            nuclear,
            nuclear_fluid: fluid_fraction * nuclear,
            nuclear_solid,
            cytoplasmic,
            cytoplasmic_fluid: fluid_fraction * cytoplasmic,
            cytoplasmic_solid,
            calcified_fraction: 0.0,
            cytoplasmic_to_nuclear_ratio: cytoplasmic / nuclear,
            rupture_volume: relative_rupture_volume * total,
            cytoplasmic_biomass_change_rate: 0.27 / 60.0,
            nuclear_biomass_change_rate: 0.33 / 60.0,
            fluid_change_rate: 3.0 / 60.0,
            calcification_rate: 0.0,
            target_solid_cytoplasmic: cytoplasmic_solid,
            target_solid_nuclear: nuclear_solid,
            target_fluid_fraction: fluid_fraction,
            target_cytoplasmic_to_nuclear_ratio: cytoplasmic / nuclear,
            relative_rupture_volume,
        }
    }
}

impl Volume {
    /// Scale every component and target by `ratio`.
    pub fn multiply_by_ratio(&mut self, ratio: f64) {
        self.total *= ratio;
        self.solid *= ratio;
        self.fluid *= ratio;
        self.nuclear *= ratio;
        self.nuclear_fluid *= ratio;
        self.nuclear_solid *= ratio;
        self.cytoplasmic *= ratio;
        self.cytoplasmic_fluid *= ratio;
        self.cytoplasmic_solid *= ratio;
        self.rupture_volume *= ratio;
        self.target_solid_nuclear *= ratio;
        self.target_solid_cytoplasmic *= ratio;
    }

    /// Recompute the aggregate fields from the four fluid/solid components.
    pub fn recompute_totals(&mut self) {
        self.nuclear = self.nuclear_fluid + self.nuclear_solid;
        self.cytoplasmic = self.cytoplasmic_fluid + self.cytoplasmic_solid;
        self.fluid = self.nuclear_fluid + self.cytoplasmic_fluid;
        self.solid = self.nuclear_solid + self.cytoplasmic_solid;
        self.total = self.nuclear + self.cytoplasmic;
        self.fluid_fraction = self.fluid / (1e-16 + self.total);
        if self.nuclear > 0.0 {
            self.cytoplasmic_to_nuclear_ratio = self.cytoplasmic / self.nuclear;
        }
    }

    /// Zero every component; the cell has been absorbed.
    pub fn clear(&mut self) {
        self.multiply_by_ratio(0.0);
        self.fluid_fraction = 0.0;
    }
}

/// Geometric quantities derived from the volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub radius: f64,
    pub nuclear_radius: f64,
    pub surface_area: f64,
    pub polarity: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        let mut geometry = Self {
            radius: 0.0,
            nuclear_radius: 0.0,
            surface_area: 0.0,
            polarity: 0.0,
        };
        geometry.update(&Volume::default());
        geometry
    }
}

fn sphere_radius(volume: f64) -> f64 {
    (0.75 * volume.max(0.0) / PI).cbrt()
}

impl Geometry {
    /// Radius, nuclear radius and surface area of a sphere of `volume`.
    pub fn update(&mut self, volume: &Volume) {
        self.radius = sphere_radius(volume.total);
        self.nuclear_radius = sphere_radius(volume.nuclear);
        self.surface_area = 4.0 * PI * self.radius * self.radius;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mechanics {
    pub cell_cell_adhesion_strength: f64,
    pub cell_bm_adhesion_strength: f64,
    pub cell_cell_repulsion_strength: f64,
    pub cell_bm_repulsion_strength: f64,
    /// Adhesion affinity towards each cell type, indexed by type id.
    pub cell_adhesion_affinities: Vec<f64>,
    pub relative_maximum_adhesion_distance: f64,
    pub maximum_number_of_attachments: usize,
    pub attachment_elastic_constant: f64,
    pub attachment_rate: f64,
    pub detachment_rate: f64,
}

impl Default for Mechanics {
    fn default() -> Self {
        Self {
            cell_cell_adhesion_strength: 0.4,
            cell_bm_adhesion_strength: 4.0,
            cell_cell_repulsion_strength: 10.0,
            cell_bm_repulsion_strength: 10.0,
            cell_adhesion_affinities: Vec::new(),
            relative_maximum_adhesion_distance: 1.25,
            maximum_number_of_attachments: 12,
            attachment_elastic_constant: 0.01,
            attachment_rate: 0.0,
            detachment_rate: 0.0,
        }
    }
}

impl Mechanics {
    /// Affinity towards `type_id`; unlisted types get full affinity.
    #[must_use]
    pub fn affinity(&self, type_id: usize) -> f64 {
        self.cell_adhesion_affinities
            .get(type_id)
            .copied()
            .unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motility {
    pub is_motile: bool,
    pub persistence_time: f64,
    pub migration_speed: f64,
    pub migration_bias_direction: DVec3,
    pub migration_bias: f64,
    pub restrict_to_2d: bool,
    pub motility_vector: DVec3,
}

impl Default for Motility {
    fn default() -> Self {
        Self {
            is_motile: false,
            persistence_time: 1.0,
            migration_speed: 1.0,
            migration_bias_direction: DVec3::ZERO,
            migration_bias: 0.0,
            restrict_to_2d: false,
            motility_vector: DVec3::ZERO,
        }
    }
}

/// Rates for the pairwise interaction rules, per target type where indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interactions {
    pub dead_phagocytosis_rate: f64,
    pub live_phagocytosis_rates: Vec<f64>,
    pub attack_rates: Vec<f64>,
    /// How visible this cell is to attackers of each type.
    pub immunogenicities: Vec<f64>,
    pub fusion_rates: Vec<f64>,
    pub damage_rate: f64,
}

impl Default for Interactions {
    fn default() -> Self {
        Self {
            dead_phagocytosis_rate: 0.0,
            live_phagocytosis_rates: Vec::new(),
            attack_rates: Vec::new(),
            immunogenicities: Vec::new(),
            fusion_rates: Vec::new(),
            damage_rate: 1.0,
        }
    }
}

impl Interactions {
    #[must_use]
    pub fn live_phagocytosis_rate(&self, type_id: usize) -> f64 {
        self.live_phagocytosis_rates.get(type_id).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn attack_rate(&self, type_id: usize) -> f64 {
        self.attack_rates.get(type_id).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn immunogenicity(&self, type_id: usize) -> f64 {
        self.immunogenicities.get(type_id).copied().unwrap_or(1.0)
    }

    #[must_use]
    pub fn fusion_rate(&self, type_id: usize) -> f64 {
        self.fusion_rates.get(type_id).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transformations {
    /// Rate of turning into each cell type, indexed by type id.
    pub transformation_rates: Vec<f64>,
}

/// Volume-change rates installed when a death chain starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeathParameters {
    pub time_units: f64,
    pub unlysed_fluid_change_rate: f64,
    pub lysed_fluid_change_rate: f64,
    pub cytoplasmic_biomass_change_rate: f64,
    pub nuclear_biomass_change_rate: f64,
    pub calcification_rate: f64,
    pub relative_rupture_volume: f64,
}

impl Default for DeathParameters {
    fn default() -> Self {
        Self {
            time_units: 1.0,
            unlysed_fluid_change_rate: 3.0 / 60.0,
            lysed_fluid_change_rate: 0.05 / 60.0,
            cytoplasmic_biomass_change_rate: 1.0 / 60.0,
            nuclear_biomass_change_rate: 0.35 / 60.0,
            calcification_rate: 0.0,
            relative_rupture_volume: 2.0,
        }
    }
}

impl DeathParameters {
    #[must_use]
    pub fn apoptosis() -> Self {
        Self {
            lysed_fluid_change_rate: 0.0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn necrosis() -> Self {
        Self {
            unlysed_fluid_change_rate: 0.67 / 60.0,
            lysed_fluid_change_rate: 0.050 / 60.0,
            cytoplasmic_biomass_change_rate: 0.0032 / 60.0,
            nuclear_biomass_change_rate: 0.013 / 60.0,
            calcification_rate: 0.0042 / 60.0,
            ..Self::default()
        }
    }
}

/// A death chain a cell can be switched onto, with its trigger rate.
#[derive(Debug, Clone)]
pub struct DeathModelEntry {
    pub model: Arc<CycleModel>,
    pub parameters: DeathParameters,
    pub rate: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Death {
    pub models: Vec<DeathModelEntry>,
    pub dead: bool,
    pub current_model: usize,
}

impl Death {
    /// Register a death chain and return its index.
    pub fn add_death_model(
        &mut self,
        rate: f64,
        model: Arc<CycleModel>,
        parameters: DeathParameters,
    ) -> usize {
        self.models.push(DeathModelEntry {
            model,
            parameters,
            rate: rate.max(0.0),
        });
        self.models.len() - 1
    }

    #[must_use]
    pub fn find_death_model_index(&self, name: &str) -> Option<usize> {
        self.models.iter().position(|entry| entry.model.name() == name)
    }

    /// Draw once per death model in order; the first success is returned.
    pub fn check_for_death(&self, dt: f64, rng: &mut dyn UniformRandom) -> Option<usize> {
        if self.dead {
            return None;
        }
        self.models
            .iter()
            .position(|entry| rng.chance(entry.rate * dt))
    }

    /// Parameters of the active death chain, or the defaults before death.
    #[must_use]
    pub fn current_parameters(&self) -> DeathParameters {
        self.models
            .get(self.current_model)
            .map(|entry| entry.parameters)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Phenotype {
    pub cycle: CycleState,
    pub death: Death,
    pub volume: Volume,
    pub geometry: Geometry,
    pub mechanics: Mechanics,
    pub motility: Motility,
    pub interactions: Interactions,
    pub transformations: Transformations,
}

impl Phenotype {
    /// Switch onto death chain `index`. Irreversible; returns false when the
    /// cell is already dead or the index is unknown.
    pub fn start_death(&mut self, index: usize) -> bool {
        if self.death.dead {
            return false;
        }
        let Some(entry) = self.death.models.get(index) else {
            return false;
        };
        let model = Arc::clone(&entry.model);
        self.death.dead = true;
        self.death.current_model = index;
        self.cycle.switch_model(model);
        self.motility.is_motile = false;
        self.motility.motility_vector = DVec3::ZERO;
        if let Some(entry) = self.cycle.current_phase().map(|phase| phase.entry) {
            entry.apply(self);
        }
        true
    }

    pub fn update_geometry(&mut self) {
        self.geometry.update(&self.volume);
    }
}
