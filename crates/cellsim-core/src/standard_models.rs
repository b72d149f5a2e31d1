//! Built-in cycle and death graphs, owned per simulation.

use std::sync::Arc;

use crate::cell::{Cell, CellDefinition, CellFunctions, CellRule, NecrosisType, VelocityRule};
use crate::cycle::{CycleModel, CycleModelError, CycleState, ModelFamily, PhaseArrest, PhaseCode, PhaseEntry};
use crate::environment::Microenvironment;
use crate::mechanics::standard_update_velocity;
use crate::phenotype::{DeathParameters, Phenotype};
use crate::volume::standard_volume_update;

/// Rate used for links that should fire on the first unvetoed update.
const NEAR_CERTAIN_RATE: f64 = 9e9;
/// Necrosis rate that makes death effectively immediate.
const DETERMINISTIC_NECROSIS_RATE: f64 = 9e99;
const DEFAULT_APOPTOSIS_RATE: f64 = 0.00319 / 60.0;

/// The standard phase-graph library.
#[derive(Debug, Clone)]
pub struct StandardModels {
    pub advanced_ki67: Arc<CycleModel>,
    pub basic_ki67: Arc<CycleModel>,
    pub flow_cytometry: Arc<CycleModel>,
    pub flow_cytometry_separated: Arc<CycleModel>,
    pub live: Arc<CycleModel>,
    pub cycling_quiescent: Arc<CycleModel>,
    pub apoptosis: Arc<CycleModel>,
    pub necrosis: Arc<CycleModel>,
}

impl StandardModels {
    pub fn new() -> Result<Self, CycleModelError> {
        use PhaseCode as P;

        let basic_ki67 = CycleModel::builder("Ki67 (basic)", ModelFamily::BasicKi67)
            .phase(P::KI67_NEGATIVE, "Ki67-")
            .phase(P::KI67_POSITIVE, "Ki67+")
            .division_at_exit(P::KI67_POSITIVE)
            .entry(P::KI67_POSITIVE, PhaseEntry::DoubleBiomass)
            .link(P::KI67_NEGATIVE, P::KI67_POSITIVE, 1.0 / (4.59 * 60.0))
            .fixed_link(P::KI67_POSITIVE, P::KI67_NEGATIVE, 1.0 / (15.5 * 60.0))
            .build()?;

        let advanced_ki67 = CycleModel::builder("Ki67 (advanced)", ModelFamily::AdvancedKi67)
            .phase(P::KI67_NEGATIVE, "Ki67-")
            .phase(P::KI67_POSITIVE_PREMITOTIC, "Ki67+ (premitotic)")
            .phase(P::KI67_POSITIVE_POSTMITOTIC, "Ki67+ (postmitotic)")
            .division_at_exit(P::KI67_POSITIVE_PREMITOTIC)
            .entry(P::KI67_POSITIVE_PREMITOTIC, PhaseEntry::DoubleBiomass)
            .link(P::KI67_NEGATIVE, P::KI67_POSITIVE_PREMITOTIC, 1.0 / (3.62 * 60.0))
            .fixed_link(P::KI67_POSITIVE_PREMITOTIC, P::KI67_POSITIVE_POSTMITOTIC, 1.0 / (13.0 * 60.0))
            .fixed_link(P::KI67_POSITIVE_POSTMITOTIC, P::KI67_NEGATIVE, 1.0 / (2.5 * 60.0))
            .build()?;

        let live = CycleModel::builder("Live", ModelFamily::LiveCells)
            .phase(P::LIVE, "Live")
            .division_at_exit(P::LIVE)
            .entry(P::LIVE, PhaseEntry::DoubleBiomass)
            .link(P::LIVE, P::LIVE, 0.0432 / 60.0)
            .build()?;

        let flow_cytometry = CycleModel::builder("Flow cytometry model (basic)", ModelFamily::FlowCytometry)
            .phase(P::G0G1, "G0/G1")
            .phase(P::S, "S")
            .phase(P::G2M, "G2/M")
            .division_at_exit(P::G2M)
            .entry(P::S, PhaseEntry::DoubleBiomass)
            .link(P::G0G1, P::S, 0.00324)
            .link(P::S, P::G2M, 0.00208)
            .link(P::G2M, P::G0G1, 0.00333)
            .build()?;

        let flow_cytometry_separated = CycleModel::builder(
            "Flow cytometry model (separated)",
            ModelFamily::FlowCytometrySeparated,
        )
        .phase(P::G0G1, "G0/G1")
        .phase(P::S, "S")
        .phase(P::G2, "G2")
        .phase(P::M, "M")
        .division_at_exit(P::M)
        .entry(P::S, PhaseEntry::DoubleBiomass)
        .link(P::G0G1, P::S, 0.00335)
        .link(P::S, P::G2, 0.00208)
        .link(P::G2, P::M, 0.00417)
        .link(P::M, P::G0G1, 0.0167)
        .build()?;

        let cycling_quiescent = CycleModel::builder("Cycling-Quiescent model", ModelFamily::CyclingQuiescent)
            .phase(P::QUIESCENT, "Quiescent")
            .phase(P::CYCLING, "Cycling")
            .division_at_exit(P::CYCLING)
            .entry(P::CYCLING, PhaseEntry::DoubleBiomass)
            .link(P::QUIESCENT, P::CYCLING, 1.0 / (4.59 * 60.0))
            .fixed_link(P::CYCLING, P::QUIESCENT, 1.0 / (15.5 * 60.0))
            .build()?;

        let apoptosis = CycleModel::builder("Apoptosis", ModelFamily::Apoptosis)
            .phase(P::APOPTOTIC, "Apoptotic")
            .phase(P::DEBRIS, "Debris")
            .removal_at_exit(P::APOPTOTIC)
            .entry(P::APOPTOTIC, PhaseEntry::Apoptotic)
            .fixed_link(P::APOPTOTIC, P::DEBRIS, 1.0 / (8.6 * 60.0))
            .build()?;

        let necrosis = CycleModel::builder("Necrosis", ModelFamily::Necrosis)
            .phase(P::NECROTIC_SWELLING, "Necrotic (swelling)")
            .phase(P::NECROTIC_LYSED, "Necrotic (lysed)")
            .phase(P::DEBRIS, "Debris")
            .removal_at_exit(P::NECROTIC_LYSED)
            .entry(P::NECROTIC_SWELLING, PhaseEntry::NecroticSwelling)
            .entry(P::NECROTIC_LYSED, PhaseEntry::NecroticLysed)
            .arrested_link(
                P::NECROTIC_SWELLING,
                P::NECROTIC_LYSED,
                NEAR_CERTAIN_RATE,
                PhaseArrest::BelowRuptureVolume,
            )
            .fixed_link(P::NECROTIC_LYSED, P::DEBRIS, 1.0 / (60.0 * 24.0 * 60.0))
            .build()?;

        Ok(Self {
            advanced_ki67: Arc::new(advanced_ki67),
            basic_ki67: Arc::new(basic_ki67),
            flow_cytometry: Arc::new(flow_cytometry),
            flow_cytometry_separated: Arc::new(flow_cytometry_separated),
            live: Arc::new(live),
            cycling_quiescent: Arc::new(cycling_quiescent),
            apoptosis: Arc::new(apoptosis),
            necrosis: Arc::new(necrosis),
        })
    }

    /// Look a model up by its display name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Arc<CycleModel>> {
        [
            &self.advanced_ki67,
            &self.basic_ki67,
            &self.flow_cytometry,
            &self.flow_cytometry_separated,
            &self.live,
            &self.cycling_quiescent,
            &self.apoptosis,
            &self.necrosis,
        ]
        .into_iter()
        .find(|model| model.name() == name)
    }

    /// Default phenotype: advanced Ki67 cycling with apoptosis and necrosis
    /// death chains.
    #[must_use]
    pub fn default_phenotype(&self) -> Phenotype {
        let mut phenotype = Phenotype {
            cycle: CycleState::new(Arc::clone(&self.advanced_ki67)),
            ..Phenotype::default()
        };
        phenotype.death.add_death_model(
            DEFAULT_APOPTOSIS_RATE,
            Arc::clone(&self.apoptosis),
            DeathParameters::apoptosis(),
        );
        phenotype.death.add_death_model(
            0.0,
            Arc::clone(&self.necrosis),
            DeathParameters::necrosis(),
        );
        phenotype
    }

    /// Definition wired with the oxygen phenotype rule, the standard volume
    /// rule and the standard velocity rule.
    #[must_use]
    pub fn default_definition(&self, name: impl Into<String>) -> CellDefinition {
        let mut definition = CellDefinition::new(name, self.default_phenotype());
        definition.functions = standard_functions();
        definition
    }
}

/// Hooks used by [`StandardModels::default_definition`].
#[must_use]
pub fn standard_functions() -> CellFunctions {
    let phenotype: CellRule = Arc::new(o2_based_phenotype);
    let volume: CellRule = Arc::new(standard_volume_update);
    let velocity: VelocityRule = Arc::new(standard_update_velocity);
    CellFunctions {
        update_phenotype: Some(phenotype),
        update_volume: Some(volume),
        update_velocity: Some(velocity),
        ..CellFunctions::default()
    }
}

/// Entry link of the proliferative phase for each model family.
fn proliferation_link(family: ModelFamily) -> Option<(PhaseCode, PhaseCode)> {
    match family {
        ModelFamily::AdvancedKi67 => Some((PhaseCode::KI67_NEGATIVE, PhaseCode::KI67_POSITIVE_PREMITOTIC)),
        ModelFamily::BasicKi67 => Some((PhaseCode::KI67_NEGATIVE, PhaseCode::KI67_POSITIVE)),
        ModelFamily::LiveCells => Some((PhaseCode::LIVE, PhaseCode::LIVE)),
        ModelFamily::FlowCytometry | ModelFamily::FlowCytometrySeparated => {
            Some((PhaseCode::G0G1, PhaseCode::S))
        }
        ModelFamily::CyclingQuiescent => Some((PhaseCode::QUIESCENT, PhaseCode::CYCLING)),
        _ => None,
    }
}

/// Scale proliferation and necrosis with the local oxygen partial pressure.
///
/// Proliferation falls linearly from full rate at saturation to zero at the
/// proliferation threshold. Necrosis rises linearly from zero at the
/// necrosis threshold to `max_necrosis_rate` at the necrosis maximum.
pub fn o2_based_phenotype(cell: &mut Cell, environment: &dyn Microenvironment, _dt: f64) {
    if cell.is_dead() {
        return;
    }
    let Some(oxygen) = environment.density_index("oxygen") else {
        return;
    };
    let Some(po2) = environment.density_at(cell.position).get(oxygen).copied() else {
        return;
    };
    let params = &cell.parameters;

    let mut multiplier = 1.0;
    if po2 < params.o2_proliferation_saturation {
        multiplier = (po2 - params.o2_proliferation_threshold)
            / (params.o2_proliferation_saturation - params.o2_proliferation_threshold);
    }
    if po2 < params.o2_proliferation_threshold {
        multiplier = 0.0;
    }
    let cycle = &mut cell.phenotype.cycle;
    let model = Arc::clone(cycle.model());
    if let Some((from, to)) = proliferation_link(model.family()) {
        if let (Some(from), Some(to)) = (model.find_phase_index(from), model.find_phase_index(to)) {
            cycle.modify_transition_rate(from, to, multiplier);
        }
    }

    let mut necrosis = 0.0;
    if po2 < params.o2_necrosis_threshold {
        necrosis = (params.o2_necrosis_threshold - po2)
            / (params.o2_necrosis_threshold - params.o2_necrosis_max);
    }
    if po2 < params.o2_necrosis_max {
        necrosis = 1.0;
    }
    let mut rate = necrosis * params.max_necrosis_rate;
    if params.necrosis_type == NecrosisType::Deterministic && necrosis > 1e-16 {
        rate = DETERMINISTIC_NECROSIS_RATE;
    }
    let death = &mut cell.phenotype.death;
    if let Some(index) = death.find_death_model_index("Necrosis") {
        death.models[index].rate = rate;
    }
}
