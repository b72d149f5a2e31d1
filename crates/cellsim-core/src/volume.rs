//! Volume relaxation and the bundled per-cell phenotype update.

use crate::cell::Cell;
use crate::cycle::{self, PhaseTransition};
use crate::environment::Microenvironment;
use crate::rng::UniformRandom;

/// Relax fluid, nuclear solid and cytoplasmic solid towards their targets,
/// accumulate calcification and refresh the geometry.
pub fn standard_volume_update(cell: &mut Cell, _environment: &dyn Microenvironment, dt: f64) {
    let volume = &mut cell.phenotype.volume;

    volume.fluid += dt * volume.fluid_change_rate * (volume.target_fluid_fraction * volume.total - volume.fluid);
    volume.fluid = volume.fluid.max(0.0);

    volume.nuclear_fluid = (volume.nuclear / (volume.total + 1e-16)) * volume.fluid;
    volume.cytoplasmic_fluid = volume.fluid - volume.nuclear_fluid;

    volume.nuclear_solid +=
        dt * volume.nuclear_biomass_change_rate * (volume.target_solid_nuclear - volume.nuclear_solid);
    volume.nuclear_solid = volume.nuclear_solid.max(0.0);

    volume.target_solid_cytoplasmic =
        volume.target_cytoplasmic_to_nuclear_ratio * volume.target_solid_nuclear;
    volume.cytoplasmic_solid += dt
        * volume.cytoplasmic_biomass_change_rate
        * (volume.target_solid_cytoplasmic - volume.cytoplasmic_solid);
    volume.cytoplasmic_solid = volume.cytoplasmic_solid.max(0.0);

    volume.solid = volume.nuclear_solid + volume.cytoplasmic_solid;
    volume.nuclear = volume.nuclear_solid + volume.nuclear_fluid;
    volume.cytoplasmic = volume.cytoplasmic_solid + volume.cytoplasmic_fluid;

    volume.calcified_fraction += dt * volume.calcification_rate * (1.0 - volume.calcified_fraction);

    volume.total = volume.cytoplasmic + volume.nuclear;
    volume.fluid_fraction = volume.fluid / (1e-16 + volume.total);

    cell.phenotype.update_geometry();
}

/// What one bundled phenotype update asks of the barrier.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhenotypeOutcome {
    pub transition: Option<PhaseTransition>,
    /// A death chain started during this update.
    pub died: bool,
    /// Interaction reach after the geometry update.
    pub reach: f64,
}

/// Phenotype hook, volume and geometry, death check, then cycle advance.
pub fn advance_bundled(
    cell: &mut Cell,
    environment: &dyn Microenvironment,
    dt: f64,
    rng: &mut dyn UniformRandom,
) -> PhenotypeOutcome {
    if let Some(rule) = cell.functions.update_phenotype.clone() {
        rule(cell, environment, dt);
    }
    if let Some(rule) = cell.functions.update_volume.clone() {
        rule(cell, environment, dt);
    }
    cell.phenotype.update_geometry();

    let mut died = false;
    if let Some(index) = cell.phenotype.death.check_for_death(dt, rng) {
        died = cell.phenotype.start_death(index);
    }

    let transition = cycle::advance(&mut cell.phenotype, dt, rng);
    PhenotypeOutcome {
        transition,
        died,
        reach: cell.reach(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellDefinition;
    use crate::environment::NullEnvironment;
    use crate::phenotype::Phenotype;
    use crate::rng::SequenceRandom;
    use glam::DVec3;

    fn cell() -> Cell {
        CellDefinition::new("t", Phenotype::default()).instantiate(DVec3::ZERO)
    }

    #[test]
    fn equilibrium_volume_is_stationary() {
        let mut cell = cell();
        let before = cell.phenotype.volume;
        standard_volume_update(&mut cell, &NullEnvironment, 6.0);
        let after = cell.phenotype.volume;
        assert!((after.total - before.total).abs() < 1e-9);
        assert!((after.nuclear - before.nuclear).abs() < 1e-9);
    }

    #[test]
    fn doubled_targets_grow_the_cell() {
        let mut cell = cell();
        cell.phenotype.volume.target_solid_nuclear *= 2.0;
        cell.phenotype.volume.target_solid_cytoplasmic *= 2.0;
        let total = cell.phenotype.volume.total;
        let radius = cell.phenotype.geometry.radius;
        for _ in 0..200 {
            standard_volume_update(&mut cell, &NullEnvironment, 6.0);
        }
        assert!(cell.phenotype.volume.total > 1.5 * total);
        assert!(cell.phenotype.geometry.radius > radius);
    }

    #[test]
    fn zero_volume_stays_finite() {
        let mut cell = cell();
        cell.phenotype.volume.clear();
        cell.phenotype.volume.target_solid_nuclear = 0.0;
        standard_volume_update(&mut cell, &NullEnvironment, 6.0);
        assert_eq!(cell.phenotype.volume.total, 0.0);
        assert!(cell.phenotype.volume.fluid_fraction.is_finite());
        assert_eq!(cell.phenotype.geometry.radius, 0.0);
    }

    #[test]
    fn bundled_update_without_hooks_only_refreshes_geometry() {
        let mut cell = cell();
        cell.phenotype.volume.multiply_by_ratio(0.5);
        let mut rng = SequenceRandom::constant(0.0);
        let outcome = advance_bundled(&mut cell, &NullEnvironment, 6.0, &mut rng);
        assert_eq!(outcome.transition, None);
        assert!(!outcome.died);
        assert!((outcome.reach - cell.reach()).abs() < 1e-12);
        assert!(cell.phenotype.geometry.radius < 8.0);
    }
}
