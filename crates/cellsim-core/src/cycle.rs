//! Directed-graph phase-transition models driving the cell cycle and death.
//!
//! A [`CycleModel`] is an immutable, shareable graph of phases and links.
//! Each cell carries a [`CycleState`] pointing into one model together with
//! its own copy of the link rates, so rates can be modulated per cell
//! without touching the shared graph.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::phenotype::{DeathParameters, Phenotype};
use crate::rng::UniformRandom;

/// Numeric identifier of a phase, stable across models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhaseCode(pub u16);

impl PhaseCode {
    pub const KI67_POSITIVE_PREMITOTIC: Self = Self(0);
    pub const KI67_POSITIVE_POSTMITOTIC: Self = Self(1);
    pub const KI67_POSITIVE: Self = Self(2);
    pub const KI67_NEGATIVE: Self = Self(3);
    pub const G0G1: Self = Self(4);
    pub const G0: Self = Self(5);
    pub const G1: Self = Self(6);
    pub const S: Self = Self(10);
    pub const G2M: Self = Self(11);
    pub const G2: Self = Self(12);
    pub const M: Self = Self(13);
    pub const LIVE: Self = Self(14);
    pub const CYCLING: Self = Self(17);
    pub const QUIESCENT: Self = Self(18);
    pub const APOPTOTIC: Self = Self(100);
    pub const NECROTIC_SWELLING: Self = Self(101);
    pub const NECROTIC_LYSED: Self = Self(102);
    pub const NECROTIC: Self = Self(103);
    pub const DEBRIS: Self = Self(104);
    pub const CUSTOM: Self = Self(9999);
}

impl fmt::Display for PhaseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Family a cycle model belongs to; rules key their behaviour off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    AdvancedKi67,
    BasicKi67,
    FlowCytometry,
    LiveCells,
    FlowCytometrySeparated,
    CyclingQuiescent,
    Apoptosis,
    Necrosis,
    Custom,
}

impl ModelFamily {
    /// Legacy numeric model code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::AdvancedKi67 => 0,
            Self::BasicKi67 => 1,
            Self::FlowCytometry => 2,
            Self::LiveCells => 5,
            Self::FlowCytometrySeparated => 6,
            Self::CyclingQuiescent => 7,
            Self::Apoptosis => 100,
            Self::Necrosis => 101,
            Self::Custom => 9999,
        }
    }

    #[must_use]
    pub const fn is_death_model(self) -> bool {
        matches!(self, Self::Apoptosis | Self::Necrosis)
    }
}

/// Hook executed when a cell enters a phase. `None` is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseEntry {
    #[default]
    None,
    /// Double the nuclear and cytoplasmic solid targets ahead of division.
    DoubleBiomass,
    /// Shrink towards zero solid and fluid at the apoptotic rates.
    Apoptotic,
    /// Swell towards an all-fluid volume at the unlysed necrotic rates.
    NecroticSwelling,
    /// Shrink towards zero after the membrane ruptures.
    NecroticLysed,
}

impl PhaseEntry {
    /// Apply the hook to `phenotype`.
    pub fn apply(self, phenotype: &mut Phenotype) {
        match self {
            Self::None => {}
            Self::DoubleBiomass => {
                phenotype.volume.target_solid_nuclear *= 2.0;
                phenotype.volume.target_solid_cytoplasmic *= 2.0;
            }
            Self::Apoptotic => {
                let params = phenotype.death.current_parameters();
                let fluid_rate = params.unlysed_fluid_change_rate;
                install_death_volume(phenotype, &params, 0.0, fluid_rate);
            }
            Self::NecroticSwelling => {
                let params = phenotype.death.current_parameters();
                let fluid_rate = params.unlysed_fluid_change_rate;
                install_death_volume(phenotype, &params, 1.0, fluid_rate);
            }
            Self::NecroticLysed => {
                let params = phenotype.death.current_parameters();
                let fluid_rate = params.lysed_fluid_change_rate;
                install_death_volume(phenotype, &params, 0.0, fluid_rate);
            }
        }
    }
}

fn install_death_volume(
    phenotype: &mut Phenotype,
    params: &DeathParameters,
    target_fluid_fraction: f64,
    fluid_change_rate: f64,
) {
    let volume = &mut phenotype.volume;
    volume.target_fluid_fraction = target_fluid_fraction;
    volume.target_solid_cytoplasmic = 0.0;
    volume.target_solid_nuclear = 0.0;
    volume.target_cytoplasmic_to_nuclear_ratio = 0.0;
    volume.cytoplasmic_biomass_change_rate = params.cytoplasmic_biomass_change_rate;
    volume.nuclear_biomass_change_rate = params.nuclear_biomass_change_rate;
    volume.fluid_change_rate = fluid_change_rate;
    volume.calcification_rate = params.calcification_rate;
    volume.relative_rupture_volume = params.relative_rupture_volume;
    volume.rupture_volume = volume.relative_rupture_volume * volume.total;
}

/// Predicate that vetoes a link while it holds.
#[derive(Clone, Default)]
pub enum PhaseArrest {
    #[default]
    None,
    /// Hold while the total volume is below the rupture volume.
    BelowRuptureVolume,
    Custom(Arc<dyn Fn(&Phenotype) -> bool + Send + Sync>),
}

impl PhaseArrest {
    /// True when the link must not fire this tick.
    #[must_use]
    pub fn vetoes(&self, phenotype: &Phenotype) -> bool {
        match self {
            Self::None => false,
            Self::BelowRuptureVolume => phenotype.volume.total < phenotype.volume.rupture_volume,
            Self::Custom(predicate) => predicate(phenotype),
        }
    }
}

impl fmt::Debug for PhaseArrest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::BelowRuptureVolume => f.write_str("BelowRuptureVolume"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A named state in a cycle graph.
#[derive(Debug, Clone)]
pub struct Phase {
    pub code: PhaseCode,
    pub name: String,
    pub division_at_exit: bool,
    pub removal_at_exit: bool,
    pub entry: PhaseEntry,
}

/// Directed edge between two phases (indices into the model's phase list).
#[derive(Debug, Clone)]
pub struct PhaseLink {
    pub from: usize,
    pub to: usize,
    /// Base rate in reciprocal minutes.
    pub rate: f64,
    pub fixed_duration: bool,
    pub arrest: PhaseArrest,
}

/// Errors raised while assembling a [`CycleModel`].
#[derive(Debug, Error, PartialEq)]
pub enum CycleModelError {
    #[error("cycle model name must not be empty")]
    EmptyName,
    #[error("model {model}: phase {code} declared twice")]
    DuplicatePhase { model: String, code: PhaseCode },
    #[error("model {model}: reference to unknown phase {code}")]
    UnknownPhase { model: String, code: PhaseCode },
    #[error("model {model}: duplicate link {from} -> {to}")]
    DuplicateLink {
        model: String,
        from: PhaseCode,
        to: PhaseCode,
    },
    #[error("model {model}: link {from} -> {to} has invalid rate {rate}")]
    InvalidRate {
        model: String,
        from: PhaseCode,
        to: PhaseCode,
        rate: f64,
    },
    #[error("model {model}: link {from} -> {to} would both divide and remove the cell")]
    DivideAndRemove {
        model: String,
        from: PhaseCode,
        to: PhaseCode,
    },
}

/// Immutable phase graph shared by every cell that follows it.
#[derive(Debug, Clone)]
pub struct CycleModel {
    name: String,
    family: ModelFamily,
    phases: Vec<Phase>,
    links: Vec<Vec<PhaseLink>>,
}

impl CycleModel {
    /// Start assembling a model.
    #[must_use]
    pub fn builder(name: impl Into<String>, family: ModelFamily) -> CycleModelBuilder {
        CycleModelBuilder {
            name: name.into(),
            family,
            phases: Vec::new(),
            flags: Vec::new(),
            links: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn family(&self) -> ModelFamily {
        self.family
    }

    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    #[must_use]
    pub fn phase(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }

    #[must_use]
    pub fn find_phase_index(&self, code: PhaseCode) -> Option<usize> {
        self.phases.iter().position(|phase| phase.code == code)
    }

    /// Outgoing links of phase `index`, in declared order.
    #[must_use]
    pub fn links_from(&self, index: usize) -> &[PhaseLink] {
        self.links.get(index).map_or(&[], Vec::as_slice)
    }

    /// Position of the `from -> to` link within `links_from(from)`.
    #[must_use]
    pub fn link_index(&self, from: usize, to: usize) -> Option<usize> {
        self.links_from(from).iter().position(|link| link.to == to)
    }

    /// Base rate of the `from -> to` link.
    #[must_use]
    pub fn link_rate(&self, from: usize, to: usize) -> Option<f64> {
        let k = self.link_index(from, to)?;
        Some(self.links_from(from)[k].rate)
    }

    fn base_rates(&self) -> Vec<Vec<f64>> {
        self.links
            .iter()
            .map(|out| out.iter().map(|link| link.rate).collect())
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum PhaseFlag {
    Division,
    Removal,
    Entry(PhaseEntry),
}

#[derive(Debug, Clone)]
struct PendingLink {
    from: PhaseCode,
    to: PhaseCode,
    rate: f64,
    fixed_duration: bool,
    arrest: PhaseArrest,
}

/// Builder that validates a phase graph before it can be shared.
#[derive(Debug)]
pub struct CycleModelBuilder {
    name: String,
    family: ModelFamily,
    phases: Vec<(PhaseCode, String)>,
    flags: Vec<(PhaseCode, PhaseFlag)>,
    links: Vec<PendingLink>,
}

impl CycleModelBuilder {
    /// Append a phase; phases keep declaration order.
    #[must_use]
    pub fn phase(mut self, code: PhaseCode, name: impl Into<String>) -> Self {
        self.phases.push((code, name.into()));
        self
    }

    /// Queue division when a cell enters `code`.
    #[must_use]
    pub fn division_at_exit(mut self, code: PhaseCode) -> Self {
        self.flags.push((code, PhaseFlag::Division));
        self
    }

    /// Queue removal when a cell leaves `code`.
    #[must_use]
    pub fn removal_at_exit(mut self, code: PhaseCode) -> Self {
        self.flags.push((code, PhaseFlag::Removal));
        self
    }

    #[must_use]
    pub fn entry(mut self, code: PhaseCode, hook: PhaseEntry) -> Self {
        self.flags.push((code, PhaseFlag::Entry(hook)));
        self
    }

    /// Stochastic link firing with probability `rate * dt` per update.
    #[must_use]
    pub fn link(self, from: PhaseCode, to: PhaseCode, rate: f64) -> Self {
        self.push_link(from, to, rate, false, PhaseArrest::None)
    }

    /// Deterministic link firing once the time in phase reaches `1 / rate`.
    #[must_use]
    pub fn fixed_link(self, from: PhaseCode, to: PhaseCode, rate: f64) -> Self {
        self.push_link(from, to, rate, true, PhaseArrest::None)
    }

    /// Stochastic link vetoed while `arrest` holds.
    #[must_use]
    pub fn arrested_link(
        self,
        from: PhaseCode,
        to: PhaseCode,
        rate: f64,
        arrest: PhaseArrest,
    ) -> Self {
        self.push_link(from, to, rate, false, arrest)
    }

    fn push_link(
        mut self,
        from: PhaseCode,
        to: PhaseCode,
        rate: f64,
        fixed_duration: bool,
        arrest: PhaseArrest,
    ) -> Self {
        self.links.push(PendingLink {
            from,
            to,
            rate,
            fixed_duration,
            arrest,
        });
        self
    }

    /// Validate the graph and freeze it into a [`CycleModel`].
    pub fn build(self) -> Result<CycleModel, CycleModelError> {
        let model = self.name;
        if model.trim().is_empty() {
            return Err(CycleModelError::EmptyName);
        }

        let mut phases: Vec<Phase> = Vec::with_capacity(self.phases.len());
        for (code, name) in self.phases {
            if phases.iter().any(|phase| phase.code == code) {
                return Err(CycleModelError::DuplicatePhase { model, code });
            }
            phases.push(Phase {
                code,
                name,
                division_at_exit: false,
                removal_at_exit: false,
                entry: PhaseEntry::None,
            });
        }
        let lookup = |phases: &[Phase], code: PhaseCode| phases.iter().position(|p| p.code == code);

        for (code, flag) in self.flags {
            let Some(index) = lookup(&phases, code) else {
                return Err(CycleModelError::UnknownPhase { model, code });
            };
            let phase = &mut phases[index];
            match flag {
                PhaseFlag::Division => phase.division_at_exit = true,
                PhaseFlag::Removal => phase.removal_at_exit = true,
                PhaseFlag::Entry(hook) => phase.entry = hook,
            }
        }

        let mut links: Vec<Vec<PhaseLink>> = vec![Vec::new(); phases.len()];
        for pending in self.links {
            let Some(from) = lookup(&phases, pending.from) else {
                return Err(CycleModelError::UnknownPhase {
                    model,
                    code: pending.from,
                });
            };
            let Some(to) = lookup(&phases, pending.to) else {
                return Err(CycleModelError::UnknownPhase {
                    model,
                    code: pending.to,
                });
            };
            if !pending.rate.is_finite() || pending.rate < 0.0 {
                return Err(CycleModelError::InvalidRate {
                    model,
                    from: pending.from,
                    to: pending.to,
                    rate: pending.rate,
                });
            }
            if links[from].iter().any(|link| link.to == to) {
                return Err(CycleModelError::DuplicateLink {
                    model,
                    from: pending.from,
                    to: pending.to,
                });
            }
            if phases[to].division_at_exit && phases[from].removal_at_exit {
                return Err(CycleModelError::DivideAndRemove {
                    model,
                    from: pending.from,
                    to: pending.to,
                });
            }
            links[from].push(PhaseLink {
                from,
                to,
                rate: pending.rate,
                fixed_duration: pending.fixed_duration,
                arrest: pending.arrest,
            });
        }

        Ok(CycleModel {
            name: model,
            family: self.family,
            phases,
            links,
        })
    }
}

/// Per-cell position within a cycle model.
#[derive(Debug, Clone)]
pub struct CycleState {
    model: Arc<CycleModel>,
    phase_index: usize,
    elapsed: f64,
    rates: Vec<Vec<f64>>,
}

impl CycleState {
    /// Start at the first phase of `model` with its base rates.
    #[must_use]
    pub fn new(model: Arc<CycleModel>) -> Self {
        let rates = model.base_rates();
        Self {
            model,
            phase_index: 0,
            elapsed: 0.0,
            rates,
        }
    }

    #[must_use]
    pub fn model(&self) -> &Arc<CycleModel> {
        &self.model
    }

    #[must_use]
    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    /// Current phase; `None` only for a model without phases.
    #[must_use]
    pub fn current_phase(&self) -> Option<&Phase> {
        self.model.phase(self.phase_index)
    }

    /// Minutes spent in the current phase.
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Jump to phase `index` without running its entry hook.
    pub fn set_phase(&mut self, index: usize) -> bool {
        if index >= self.model.phases().len() {
            return false;
        }
        self.phase_index = index;
        self.elapsed = 0.0;
        true
    }

    /// This cell's rate on the `from -> to` link.
    #[must_use]
    pub fn transition_rate(&self, from: usize, to: usize) -> Option<f64> {
        let k = self.model.link_index(from, to)?;
        self.rates.get(from)?.get(k).copied()
    }

    /// Override this cell's rate on `from -> to`. Negative values clamp to zero.
    pub fn set_transition_rate(&mut self, from: usize, to: usize, rate: f64) -> bool {
        let Some(k) = self.model.link_index(from, to) else {
            return false;
        };
        match self.rates.get_mut(from).and_then(|out| out.get_mut(k)) {
            Some(slot) => {
                *slot = rate.max(0.0);
                true
            }
            None => false,
        }
    }

    /// Set this cell's `from -> to` rate to the model's base rate times `multiplier`.
    pub fn modify_transition_rate(&mut self, from: usize, to: usize, multiplier: f64) -> bool {
        match self.model.link_rate(from, to) {
            Some(base) => self.set_transition_rate(from, to, base * multiplier),
            None => false,
        }
    }

    /// Replace the model, restarting at its first phase with base rates.
    pub fn switch_model(&mut self, model: Arc<CycleModel>) {
        *self = Self::new(model);
    }
}

impl Default for CycleState {
    /// A phaseless placeholder that never transitions.
    fn default() -> Self {
        Self::new(Arc::new(CycleModel {
            name: "none".to_owned(),
            family: ModelFamily::Custom,
            phases: Vec::new(),
            links: Vec::new(),
        }))
    }
}

/// A transition that fired during [`advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: usize,
    pub to: usize,
    /// Destination carries `division_at_exit`.
    pub divide: bool,
    /// Source carries `removal_at_exit`.
    pub remove: bool,
}

/// Advance `phenotype`'s cycle by `dt` minutes.
///
/// Outgoing links of the current phase are tried in declared order and at
/// most one fires. Fixed-duration links fire once the time in phase reaches
/// `1 / rate` and never draw; stochastic links fire when a draw falls below
/// `rate * dt`. On firing the time in phase resets, the destination becomes
/// current and its entry hook runs.
pub fn advance(
    phenotype: &mut Phenotype,
    dt: f64,
    rng: &mut dyn UniformRandom,
) -> Option<PhaseTransition> {
    let model = Arc::clone(&phenotype.cycle.model);
    let from = phenotype.cycle.phase_index;
    phenotype.cycle.elapsed += dt;

    for (k, link) in model.links_from(from).iter().enumerate() {
        if link.arrest.vetoes(phenotype) {
            continue;
        }
        let rate = phenotype
            .cycle
            .rates
            .get(from)
            .and_then(|out| out.get(k))
            .copied()
            .unwrap_or(link.rate);
        let fire = if link.fixed_duration {
            rate > 0.0 && phenotype.cycle.elapsed >= 1.0 / rate
        } else {
            rng.chance(rate * dt)
        };
        if !fire {
            continue;
        }

        let (divide, remove) = match (model.phase(link.to), model.phase(from)) {
            (Some(dest), Some(src)) => (dest.division_at_exit && !src.removal_at_exit, src.removal_at_exit),
            _ => (false, false),
        };
        phenotype.cycle.phase_index = link.to;
        phenotype.cycle.elapsed = 0.0;
        if let Some(dest) = model.phase(link.to) {
            dest.entry.apply(phenotype);
        }
        return Some(PhaseTransition {
            from,
            to: link.to,
            divide,
            remove,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SequenceRandom;
    use rand::{SeedableRng, rngs::SmallRng};

    const A: PhaseCode = PhaseCode(1);
    const B: PhaseCode = PhaseCode(2);
    const C: PhaseCode = PhaseCode(3);

    fn phenotype_with(model: CycleModel) -> Phenotype {
        let mut phenotype = Phenotype::default();
        phenotype.cycle = CycleState::new(Arc::new(model));
        phenotype
    }

    #[test]
    fn unknown_phase_is_rejected() {
        let err = CycleModel::builder("m", ModelFamily::Custom)
            .phase(A, "a")
            .link(A, B, 0.1)
            .build()
            .unwrap_err();
        assert!(matches!(err, CycleModelError::UnknownPhase { code, .. } if code == B));
    }

    #[test]
    fn duplicate_link_is_rejected() {
        let err = CycleModel::builder("m", ModelFamily::Custom)
            .phase(A, "a")
            .phase(B, "b")
            .link(A, B, 0.1)
            .fixed_link(A, B, 0.2)
            .build()
            .unwrap_err();
        assert!(matches!(err, CycleModelError::DuplicateLink { .. }));
    }

    #[test]
    fn negative_and_nan_rates_are_rejected() {
        for rate in [-1.0, f64::NAN] {
            let err = CycleModel::builder("m", ModelFamily::Custom)
                .phase(A, "a")
                .link(A, A, rate)
                .build()
                .unwrap_err();
            assert!(matches!(err, CycleModelError::InvalidRate { .. }));
        }
    }

    #[test]
    fn divide_and_remove_on_one_link_is_rejected() {
        let err = CycleModel::builder("m", ModelFamily::Custom)
            .phase(A, "a")
            .phase(B, "b")
            .removal_at_exit(A)
            .division_at_exit(B)
            .link(A, B, 0.1)
            .build()
            .unwrap_err();
        assert!(matches!(err, CycleModelError::DivideAndRemove { .. }));
    }

    #[test]
    fn flags_on_unknown_phase_are_rejected() {
        let err = CycleModel::builder("m", ModelFamily::Custom)
            .phase(A, "a")
            .division_at_exit(C)
            .build()
            .unwrap_err();
        assert!(matches!(err, CycleModelError::UnknownPhase { code, .. } if code == C));
        assert_eq!(
            CycleModel::builder(" ", ModelFamily::Custom).build().unwrap_err(),
            CycleModelError::EmptyName
        );
    }

    #[test]
    fn fixed_duration_waits_for_threshold_without_drawing() {
        let model = CycleModel::builder("m", ModelFamily::Custom)
            .phase(A, "a")
            .phase(B, "b")
            .fixed_link(A, B, 1.0 / 10.0)
            .build()
            .expect("model");
        let mut phenotype = phenotype_with(model);
        let mut rng = SequenceRandom::constant(0.0);
        for _ in 0..9 {
            assert_eq!(advance(&mut phenotype, 1.0, &mut rng), None);
        }
        let fired = advance(&mut phenotype, 1.0, &mut rng).expect("fires at threshold");
        assert_eq!((fired.from, fired.to), (0, 1));
        assert_eq!(phenotype.cycle.phase_index(), 1);
        assert_eq!(phenotype.cycle.elapsed(), 0.0);
        assert_eq!(rng.draws(), 0);
    }

    #[test]
    fn zero_rate_never_fires() {
        let model = CycleModel::builder("m", ModelFamily::Custom)
            .phase(A, "a")
            .phase(B, "b")
            .link(A, B, 0.0)
            .build()
            .expect("model");
        let mut phenotype = phenotype_with(model);
        let mut rng = SequenceRandom::constant(0.0);
        for _ in 0..1000 {
            assert_eq!(advance(&mut phenotype, 10.0, &mut rng), None);
        }
    }

    #[test]
    fn first_declared_link_wins() {
        let model = CycleModel::builder("m", ModelFamily::Custom)
            .phase(A, "a")
            .phase(B, "b")
            .phase(C, "c")
            .link(A, C, 1.0)
            .link(A, B, 1.0)
            .build()
            .expect("model");
        let mut phenotype = phenotype_with(model);
        let mut rng = SequenceRandom::constant(0.5);
        let fired = advance(&mut phenotype, 1.0, &mut rng).expect("fires");
        assert_eq!(fired.to, 2);
        assert_eq!(rng.draws(), 1);
    }

    #[test]
    fn arrest_vetoes_and_later_links_still_run() {
        let veto = PhaseArrest::Custom(Arc::new(|_: &Phenotype| true));
        let model = CycleModel::builder("m", ModelFamily::Custom)
            .phase(A, "a")
            .phase(B, "b")
            .phase(C, "c")
            .arrested_link(A, B, 1.0, veto)
            .link(A, C, 1.0)
            .build()
            .expect("model");
        let mut phenotype = phenotype_with(model);
        let mut rng = SequenceRandom::constant(0.0);
        let fired = advance(&mut phenotype, 1.0, &mut rng).expect("fires");
        assert_eq!(fired.to, 2);
    }

    #[test]
    fn stochastic_frequency_matches_rate_times_dt() {
        let rate = 0.002;
        let dt = 6.0;
        let model = CycleModel::builder("m", ModelFamily::Custom)
            .phase(A, "a")
            .phase(B, "b")
            .link(A, B, rate)
            .build()
            .expect("model");
        let model = Arc::new(model);
        let mut rng = SmallRng::seed_from_u64(2024);
        let trials = 200_000;
        let mut fired = 0usize;
        let mut phenotype = Phenotype::default();
        for _ in 0..trials {
            phenotype.cycle = CycleState::new(Arc::clone(&model));
            if advance(&mut phenotype, dt, &mut rng).is_some() {
                fired += 1;
            }
        }
        let p = rate * dt;
        let observed = fired as f64 / trials as f64;
        let sigma = (p * (1.0 - p) / trials as f64).sqrt();
        assert!(
            (observed - p).abs() < 5.0 * sigma,
            "observed {observed}, expected {p}"
        );
    }

    #[test]
    fn division_is_queued_on_entering_flagged_phase() {
        let model = CycleModel::builder("m", ModelFamily::Custom)
            .phase(A, "a")
            .phase(B, "b")
            .division_at_exit(B)
            .entry(B, PhaseEntry::DoubleBiomass)
            .link(A, B, 1.0)
            .link(B, A, 1.0)
            .build()
            .expect("model");
        let mut phenotype = phenotype_with(model);
        let target = phenotype.volume.target_solid_nuclear;
        let mut rng = SequenceRandom::constant(0.0);
        let into_b = advance(&mut phenotype, 1.0, &mut rng).expect("a -> b");
        assert!(into_b.divide && !into_b.remove);
        assert_eq!(phenotype.volume.target_solid_nuclear, 2.0 * target);
        let back = advance(&mut phenotype, 1.0, &mut rng).expect("b -> a");
        assert!(!back.divide);
    }

    #[test]
    fn removal_is_queued_on_leaving_flagged_phase() {
        let model = CycleModel::builder("m", ModelFamily::Custom)
            .phase(A, "a")
            .phase(B, "b")
            .phase(C, "c")
            .removal_at_exit(B)
            .link(A, B, 1.0)
            .fixed_link(B, C, 1.0)
            .build()
            .expect("model");
        let mut phenotype = phenotype_with(model);
        let mut rng = SequenceRandom::constant(0.0);
        let into_b = advance(&mut phenotype, 1.0, &mut rng).expect("a -> b");
        assert!(!into_b.remove);
        let out_of_b = advance(&mut phenotype, 1.0, &mut rng).expect("b -> c");
        assert!(out_of_b.remove);
    }

    #[test]
    fn per_cell_rates_modulate_without_touching_model() {
        let model = Arc::new(
            CycleModel::builder("m", ModelFamily::Custom)
                .phase(A, "a")
                .phase(B, "b")
                .link(A, B, 0.5)
                .build()
                .expect("model"),
        );
        let mut state = CycleState::new(Arc::clone(&model));
        assert!(state.modify_transition_rate(0, 1, 0.5));
        assert_eq!(state.transition_rate(0, 1), Some(0.25));
        assert_eq!(model.link_rate(0, 1), Some(0.5));
        assert!(state.set_transition_rate(0, 1, -3.0));
        assert_eq!(state.transition_rate(0, 1), Some(0.0));
        assert!(!state.set_transition_rate(1, 0, 1.0));
    }

    #[test]
    fn empty_model_never_transitions() {
        let model = CycleModel::builder("empty", ModelFamily::Custom)
            .build()
            .expect("model");
        let mut phenotype = phenotype_with(model);
        let mut rng = SequenceRandom::constant(0.0);
        assert_eq!(advance(&mut phenotype, 1.0, &mut rng), None);
        assert!(phenotype.cycle.current_phase().is_none());
    }
}
