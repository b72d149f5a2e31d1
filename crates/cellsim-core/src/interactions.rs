//! Phagocytosis, attack, fusion and transformation between neighbours.
//!
//! Events are proposed per cell from an immutable view and resolved at a
//! sequential barrier, where a cell consumed by an earlier event cannot take
//! part in a later one.

use std::collections::HashSet;

use glam::DVec3;

use crate::CellId;
use crate::arena::CellArena;
use crate::cell::Cell;
use crate::rng::UniformRandom;

/// Cells below this total volume have already been absorbed.
const CONSUMED_VOLUME: f64 = 1e-15;

/// Accumulates damage on a cell that was successfully attacked.
pub trait DamageModel: Send + Sync {
    fn apply(&self, attacker: &Cell, target: &mut Cell, dt: f64);
}

/// `damage += damage_rate * dt` and the attack clock advances by `dt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDamage;

impl DamageModel for StandardDamage {
    fn apply(&self, attacker: &Cell, target: &mut Cell, dt: f64) {
        target.state.damage += attacker.phenotype.interactions.damage_rate * dt;
        target.state.total_attack_time += dt;
    }
}

/// One successful interaction draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionEvent {
    Ingest { predator: CellId, prey: CellId },
    Attack { attacker: CellId, target: CellId },
    Fuse { survivor: CellId, absorbed: CellId },
    Transform { cell: CellId, type_id: usize },
}

/// Draw every interaction rule of `cell` against its neighbours, then its
/// transformation rates. Each rule succeeds at most once per call.
pub fn propose_interactions(
    cells: &CellArena,
    id: CellId,
    cell: &Cell,
    dt: f64,
    rng: &mut dyn UniformRandom,
) -> Vec<InteractionEvent> {
    let mut events = Vec::new();
    if cell.is_dead() {
        return events;
    }
    let rates = &cell.phenotype.interactions;
    let mut phagocytosed_dead = false;
    let mut phagocytosed_live = false;
    let mut attacked = false;
    let mut fused = false;

    for &other_id in &cell.state.neighbors {
        let Some(other) = cells.get(other_id) else {
            continue;
        };
        if other.phenotype.volume.total < CONSUMED_VOLUME {
            continue;
        }
        if other.is_dead() {
            if rng.chance(rates.dead_phagocytosis_rate * dt) && !phagocytosed_dead {
                events.push(InteractionEvent::Ingest {
                    predator: id,
                    prey: other_id,
                });
                phagocytosed_dead = true;
            }
            continue;
        }

        let other_type = other.type_id;
        if rng.chance(rates.live_phagocytosis_rate(other_type) * dt) && !phagocytosed_live {
            events.push(InteractionEvent::Ingest {
                predator: id,
                prey: other_id,
            });
            phagocytosed_live = true;
        }

        let attack = rates.attack_rate(other_type)
            * other.phenotype.interactions.immunogenicity(cell.type_id)
            * dt;
        if rng.chance(attack) && !attacked {
            events.push(InteractionEvent::Attack {
                attacker: id,
                target: other_id,
            });
            attacked = true;
        }

        if rng.chance(rates.fusion_rate(other_type) * dt) && !fused {
            events.push(InteractionEvent::Fuse {
                survivor: id,
                absorbed: other_id,
            });
            fused = true;
        }
    }

    let transformations = &cell.phenotype.transformations.transformation_rates;
    for (type_id, rate) in transformations.iter().enumerate() {
        if rng.chance(rate * dt) {
            events.push(InteractionEvent::Transform { cell: id, type_id });
            break;
        }
    }
    events
}

/// Move `prey`'s contents into `predator`'s cytoplasm and mark `prey` dead.
pub fn ingest(predator: &mut Cell, prey: &mut Cell) {
    let gained = &prey.phenotype.volume;
    let volume = &mut predator.phenotype.volume;
    volume.cytoplasmic_fluid += gained.fluid;
    volume.cytoplasmic_solid += gained.cytoplasmic_solid + gained.nuclear_solid;
    volume.recompute_totals();
    predator.phenotype.update_geometry();

    neutralize(prey);
}

/// Merge `absorbed` into `survivor` at their volume-weighted centre.
pub fn fuse(survivor: &mut Cell, absorbed: &mut Cell) {
    let a = survivor.phenotype.volume.total;
    let b = absorbed.phenotype.volume.total;
    if a + b > 0.0 {
        survivor.position = (a * survivor.position + b * absorbed.position) / (a + b);
    }

    let gained = absorbed.phenotype.volume;
    let volume = &mut survivor.phenotype.volume;
    volume.nuclear_fluid += gained.nuclear_fluid;
    volume.nuclear_solid += gained.nuclear_solid;
    volume.cytoplasmic_fluid += gained.cytoplasmic_fluid;
    volume.cytoplasmic_solid += gained.cytoplasmic_solid;
    volume.target_solid_nuclear += gained.target_solid_nuclear;
    volume.target_solid_cytoplasmic += gained.target_solid_cytoplasmic;
    volume.rupture_volume += gained.rupture_volume;
    volume.recompute_totals();
    survivor.phenotype.update_geometry();
    survivor.state.number_of_nuclei += absorbed.state.number_of_nuclei;

    neutralize(absorbed);
}

fn neutralize(cell: &mut Cell) {
    cell.phenotype.volume.clear();
    cell.phenotype.update_geometry();
    cell.phenotype.death.dead = true;
    cell.phenotype.motility.is_motile = false;
    cell.phenotype.motility.motility_vector = DVec3::ZERO;
    cell.is_movable = false;
    cell.velocity = DVec3::ZERO;
}

/// Barrier bookkeeping for one interaction pass.
#[derive(Debug, Default)]
pub struct Resolution {
    consumed: HashSet<CellId>,
}

impl Resolution {
    /// True once `id` has been eaten or fused away this pass.
    #[must_use]
    pub fn is_consumed(&self, id: CellId) -> bool {
        self.consumed.contains(&id)
    }

    /// Validate an event against earlier ones. Events touching a consumed
    /// cell are dropped; accepted ingest and fuse events consume their target.
    pub fn accept(&mut self, event: &InteractionEvent) -> bool {
        match *event {
            InteractionEvent::Ingest { predator, prey } => self.claim(predator, prey),
            InteractionEvent::Fuse { survivor, absorbed } => self.claim(survivor, absorbed),
            InteractionEvent::Attack { attacker, target } => {
                !self.is_consumed(attacker) && !self.is_consumed(target)
            }
            InteractionEvent::Transform { cell, .. } => !self.is_consumed(cell),
        }
    }

    fn claim(&mut self, actor: CellId, target: CellId) -> bool {
        if self.is_consumed(actor) || self.is_consumed(target) {
            return false;
        }
        self.consumed.insert(target);
        true
    }
}
