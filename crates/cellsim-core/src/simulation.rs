use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use cellsim_index::{CellContainer, DomainBounds, Face, Location, NeighborhoodIndex, Relocation};
use glam::DVec3;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::arena::CellArena;
use crate::cell::{Cell, CellDefinition};
use crate::config::{BoundaryCondition, SimConfig};
use crate::environment::{AgentFactory, Microenvironment, StandardDivision};
use crate::interactions::{
    DamageModel, InteractionEvent, Resolution, StandardDamage, fuse, ingest, propose_interactions,
};
use crate::mechanics::{
    ForceLaw, SpringProposal, StandardPotentials, VelocityContext, VelocityUpdate,
    elastic_spring_velocity, integrate, propose_springs,
};
use crate::rng::{Pass, cell_stream};
use crate::schedule::{Cadence, DeferredSet};
use crate::standard_models::StandardModels;
use crate::volume::{PhenotypeOutcome, advance_bundled};
use crate::{CellId, SimulationError, Tick};

/// Per-tick outcome recorded in the simulation history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub time: f64,
    pub population: usize,
    pub divisions: usize,
    pub deaths: usize,
    pub out_of_domain: usize,
    pub phenotype_ran: bool,
    pub mechanics_ran: bool,
}

/// Owns the cell population, its spatial index and every collaborator, and
/// advances them through the nested diffusion, phenotype and mechanics
/// intervals.
pub struct Simulation {
    config: SimConfig,
    seed: u64,
    environment: Arc<dyn Microenvironment>,
    factory: Box<dyn AgentFactory>,
    force_law: Box<dyn ForceLaw>,
    damage: Box<dyn DamageModel>,
    models: StandardModels,
    definitions: Vec<CellDefinition>,
    cells: CellArena,
    container: CellContainer<CellId>,
    tick: Tick,
    time: f64,
    initialized: bool,
    cell_cycle: Cadence,
    mechanics: Cadence,
    pending_divisions: DeferredSet,
    pending_deaths: DeferredSet,
    divisions_in_step: usize,
    deaths_in_step: usize,
    history: VecDeque<TickSummary>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("seed", &self.seed)
            .field("tick", &self.tick)
            .field("time", &self.time)
            .field("population", &self.cells.len())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Build an empty simulation bound to `environment`.
    pub fn new(
        config: SimConfig,
        environment: Arc<dyn Microenvironment>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let container = CellContainer::new(config.domain, config.voxel_size)?;
        let models = StandardModels::new()?;
        let seed = config.resolve_seed();
        let history = VecDeque::with_capacity(config.history_capacity.min(4096));
        Ok(Self {
            config,
            seed,
            environment,
            factory: Box::new(StandardDivision),
            force_law: Box::new(StandardPotentials),
            damage: Box::new(StandardDamage),
            models,
            definitions: Vec::new(),
            cells: CellArena::new(),
            container,
            tick: Tick::zero(),
            time: 0.0,
            initialized: false,
            cell_cycle: Cadence::default(),
            mechanics: Cadence::default(),
            pending_divisions: DeferredSet::default(),
            pending_deaths: DeferredSet::default(),
            divisions_in_step: 0,
            deaths_in_step: 0,
            history,
        })
    }

    /// Advance the clock by the configured diffusion interval and tick.
    pub fn step(&mut self) -> TickSummary {
        let now = if self.initialized {
            self.time + self.config.diffusion_dt
        } else {
            self.time
        };
        self.tick(
            now,
            self.config.phenotype_dt,
            self.config.mechanics_dt,
            self.config.diffusion_dt,
        )
    }

    /// Advance every cell by one diffusion step at `current_time`, running
    /// the phenotype and mechanics blocks when their intervals have elapsed.
    pub fn tick(
        &mut self,
        current_time: f64,
        phenotype_dt: f64,
        mechanics_dt: f64,
        diffusion_dt: f64,
    ) -> TickSummary {
        let tick = self.tick.next();
        let bootstrap = !self.initialized;
        let mut summary = TickSummary {
            tick,
            time: current_time,
            ..TickSummary::default()
        };

        self.stage_secretion(diffusion_dt);
        if !bootstrap {
            self.stage_intracellular(diffusion_dt);
        }

        if let Some(dt) = self.cell_cycle.due(current_time, phenotype_dt, bootstrap) {
            self.stage_phenotype(tick, dt);
            summary.divisions = self.flush_divisions(tick);
            summary.deaths += self.flush_deaths();
            self.cell_cycle.mark(current_time);
            summary.phenotype_ran = true;
        }

        if let Some(dt) = self.mechanics.due(current_time, mechanics_dt, bootstrap) {
            self.stage_contact(dt);
            self.stage_custom_rules(dt);
            self.stage_velocity(tick, dt);
            if self.config.automated_spring_adhesions {
                self.stage_springs(tick, dt);
                self.stage_elastic_springs();
            }
            self.stage_interactions(tick, dt);
            summary.deaths += self.flush_deaths();
            self.stage_integrate(dt);
            summary.deaths += self.flush_deaths();
            self.mechanics.mark(current_time);
            summary.mechanics_ran = true;
        }

        self.initialized = true;
        self.tick = tick;
        self.time = current_time;
        summary.population = self.cells.len();
        summary.out_of_domain = Face::ALL
            .iter()
            .map(|face| self.container.outer_bucket(*face).len())
            .sum();

        debug!(
            tick = tick.0,
            time = current_time,
            divisions = summary.divisions,
            deaths = summary.deaths,
            population = summary.population,
            "tick complete"
        );
        self.record(summary);
        summary
    }

    fn record(&mut self, summary: TickSummary) {
        let capacity = self.config.history_capacity;
        if capacity == 0 {
            return;
        }
        while self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }

    /// Dense per-cell flag: filed in a voxel rather than an outer bucket.
    fn in_domain_mask(&self) -> Vec<bool> {
        self.cells
            .iter_handles()
            .map(|id| matches!(self.container.location(id), Some(Location::Voxel(_))))
            .collect()
    }

    fn stage_secretion(&mut self, dt: f64) {
        let mask = self.in_domain_mask();
        let environment = self.environment.as_ref();
        self.cells
            .cells()
            .par_iter()
            .zip(mask.par_iter())
            .for_each(|(cell, &inside)| {
                if inside {
                    environment.secretion_uptake(cell, dt);
                }
            });
    }

    fn stage_intracellular(&mut self, dt: f64) {
        let mask = self.in_domain_mask();
        let environment = self.environment.as_ref();
        let (_, cells) = self.cells.split_mut();
        cells
            .par_iter_mut()
            .zip(mask.par_iter())
            .for_each(|(cell, &inside)| {
                let due = cell
                    .intracellular
                    .as_ref()
                    .is_some_and(|model| model.needs_update());
                if !inside || !due {
                    return;
                }
                if let Some(hook) = cell.functions.pre_intracellular.clone() {
                    hook(cell, environment, dt);
                }
                if let Some(model) = cell.intracellular.as_mut() {
                    model.update(&mut cell.phenotype, dt);
                }
                if let Some(hook) = cell.functions.post_intracellular.clone() {
                    hook(cell, environment, dt);
                }
            });
    }

    fn stage_phenotype(&mut self, tick: Tick, dt: f64) {
        let mask = self.in_domain_mask();
        let seed = self.seed;
        let environment = self.environment.as_ref();
        let (handles, cells) = self.cells.split_mut();
        let outcomes: Vec<Option<PhenotypeOutcome>> = handles
            .par_iter()
            .zip(cells.par_iter_mut())
            .zip(mask.par_iter())
            .map(|((&id, cell), &inside)| {
                if !inside {
                    return None;
                }
                let mut rng = cell_stream(seed, tick, Pass::Phenotype, id);
                Some(advance_bundled(cell, environment, dt, &mut rng))
            })
            .collect();

        let handles: Vec<CellId> = self.cells.handles().to_vec();
        for (id, outcome) in handles.into_iter().zip(outcomes) {
            let Some(outcome) = outcome else {
                continue;
            };
            if let Some(transition) = outcome.transition {
                if transition.divide {
                    self.pending_divisions.insert(id);
                }
                if transition.remove {
                    self.pending_deaths.insert(id);
                }
            }
            if outcome.died {
                self.detach_all_springs(id);
            }
            if let Some(Location::Voxel(voxel)) = self.container.location(id) {
                self.container.note_interaction_distance(voxel, outcome.reach);
            }
        }
    }

    fn flush_divisions(&mut self, tick: Tick) -> usize {
        let queued = self.pending_divisions.drain();
        let mut divided = 0;
        for id in queued {
            let Some(parent) = self.cells.get_mut(id) else {
                continue;
            };
            let mut rng = cell_stream(self.seed, tick, Pass::Division, id);
            let child = self.factory.divide(parent, &mut rng);
            let child_id = self.cells.insert(child);
            self.refile(id);
            self.refile(child_id);
            trace!(parent = ?id, child = ?child_id, "cell divided");
            divided += 1;
        }
        self.divisions_in_step += divided;
        divided
    }

    fn flush_deaths(&mut self) -> usize {
        if self.pending_deaths.is_empty() {
            return 0;
        }
        let queued = self.pending_deaths.drain();
        let mut dead = HashSet::with_capacity(queued.len());
        for id in queued {
            if !self.cells.contains(id) {
                continue;
            }
            self.detach_everything(id);
            self.container.remove(id);
            dead.insert(id);
        }
        let removed = self.cells.remove_many(&dead);
        self.deaths_in_step += removed;
        removed
    }

    fn stage_contact(&mut self, dt: f64) {
        let mask = self.in_domain_mask();
        let cells = &self.cells;
        let deltas: Vec<DVec3> = cells
            .cells()
            .par_iter()
            .zip(mask.par_iter())
            .map(|(cell, &inside)| {
                let Some(contact) = cell.functions.contact.as_ref() else {
                    return DVec3::ZERO;
                };
                if !inside {
                    return DVec3::ZERO;
                }
                cell.state
                    .attached_cells
                    .iter()
                    .filter_map(|&other| cells.get(other))
                    .fold(DVec3::ZERO, |acc, other| acc + contact(cell, other, dt))
            })
            .collect();
        let (_, cells) = self.cells.split_mut();
        for (cell, delta) in cells.iter_mut().zip(deltas) {
            cell.velocity += delta;
        }
    }

    fn stage_custom_rules(&mut self, dt: f64) {
        let mask = self.in_domain_mask();
        let environment = self.environment.as_ref();
        let (_, cells) = self.cells.split_mut();
        cells
            .par_iter_mut()
            .zip(mask.par_iter())
            .for_each(|(cell, &inside)| {
                if !inside {
                    return;
                }
                if let Some(rule) = cell.functions.custom_rule.clone() {
                    rule(cell, environment, dt);
                }
            });
    }

    fn stage_velocity(&mut self, tick: Tick, dt: f64) {
        let mask = self.in_domain_mask();
        let seed = self.seed;
        let updates: Vec<Option<VelocityUpdate>> = {
            let ctx = VelocityContext {
                cells: &self.cells,
                container: &self.container,
                force_law: self.force_law.as_ref(),
                environment: self.environment.as_ref(),
            };
            let ctx = &ctx;
            self.cells
                .handles()
                .par_iter()
                .zip(self.cells.cells().par_iter())
                .zip(mask.par_iter())
                .map(|((&id, cell), &inside)| {
                    if !inside || !cell.is_movable {
                        return None;
                    }
                    let rule = cell.functions.update_velocity.as_ref()?;
                    let mut rng = cell_stream(seed, tick, Pass::Velocity, id);
                    Some(rule(ctx, id, cell, dt, &mut rng))
                })
                .collect()
        };
        let (_, cells) = self.cells.split_mut();
        for (cell, update) in cells.iter_mut().zip(updates) {
            let Some(update) = update else {
                continue;
            };
            cell.velocity += update.velocity;
            cell.state.simple_pressure = update.pressure;
            cell.state.neighbors = update.neighbors;
            cell.phenotype.motility.motility_vector = update.motility;
        }
    }

    fn stage_springs(&mut self, tick: Tick, dt: f64) {
        let mask = self.in_domain_mask();
        let seed = self.seed;
        let cells = &self.cells;
        let proposals: Vec<Option<SpringProposal>> = cells
            .handles()
            .par_iter()
            .zip(cells.cells().par_iter())
            .zip(mask.par_iter())
            .map(|((&id, cell), &inside)| {
                if !inside {
                    return None;
                }
                let mut rng = cell_stream(seed, tick, Pass::Springs, id);
                Some(propose_springs(cells, cell, dt, &mut rng))
            })
            .collect();

        let handles: Vec<CellId> = self.cells.handles().to_vec();
        for (id, proposal) in handles.into_iter().zip(proposals) {
            let Some(proposal) = proposal else {
                continue;
            };
            for partner in proposal.detach {
                self.detach_springs(id, partner);
            }
            for partner in proposal.attach {
                if self.below_spring_cap(id) && self.below_spring_cap(partner) {
                    self.attach_springs(id, partner);
                }
            }
        }
    }

    fn below_spring_cap(&self, id: CellId) -> bool {
        self.cells.get(id).is_some_and(|cell| {
            cell.state.spring_attachments.len() < cell.phenotype.mechanics.maximum_number_of_attachments
        })
    }

    fn stage_elastic_springs(&mut self) {
        let mask = self.in_domain_mask();
        let cells = &self.cells;
        let deltas: Vec<DVec3> = cells
            .cells()
            .par_iter()
            .zip(mask.par_iter())
            .map(|(cell, &inside)| {
                if !inside {
                    return DVec3::ZERO;
                }
                cell.state
                    .spring_attachments
                    .iter()
                    .filter_map(|&other| cells.get(other))
                    .fold(DVec3::ZERO, |acc, other| acc + elastic_spring_velocity(cell, other))
            })
            .collect();
        let (_, cells) = self.cells.split_mut();
        for (cell, delta) in cells.iter_mut().zip(deltas) {
            cell.velocity += delta;
        }
    }

    fn stage_interactions(&mut self, tick: Tick, dt: f64) {
        let mask = self.in_domain_mask();
        let seed = self.seed;
        let cells = &self.cells;
        let events: Vec<Vec<InteractionEvent>> = cells
            .handles()
            .par_iter()
            .zip(cells.cells().par_iter())
            .zip(mask.par_iter())
            .map(|((&id, cell), &inside)| {
                if !inside {
                    return Vec::new();
                }
                let mut rng = cell_stream(seed, tick, Pass::Interactions, id);
                propose_interactions(cells, id, cell, dt, &mut rng)
            })
            .collect();

        let mut resolution = Resolution::default();
        for event in events.into_iter().flatten() {
            if resolution.accept(&event) {
                self.apply_interaction(event, dt);
            }
        }
    }

    fn apply_interaction(&mut self, event: InteractionEvent, dt: f64) {
        match event {
            InteractionEvent::Ingest { predator, prey } => {
                let Some((eater, eaten)) = self.cells.pair_mut(predator, prey) else {
                    return;
                };
                ingest(eater, eaten);
                self.detach_everything(prey);
                self.pending_deaths.insert(prey);
                trace!(?predator, ?prey, "phagocytosis");
            }
            InteractionEvent::Attack { attacker, target } => {
                let Some((source, victim)) = self.cells.pair_mut(attacker, target) else {
                    return;
                };
                self.damage.apply(source, victim, dt);
                trace!(?attacker, ?target, damage = victim.state.damage, "attack");
            }
            InteractionEvent::Fuse { survivor, absorbed } => {
                let Some((kept, merged)) = self.cells.pair_mut(survivor, absorbed) else {
                    return;
                };
                fuse(kept, merged);
                self.detach_everything(absorbed);
                self.pending_deaths.insert(absorbed);
                self.refile(survivor);
                trace!(?survivor, ?absorbed, "fusion");
            }
            InteractionEvent::Transform { cell, type_id } => {
                let Some(definition) = self.definitions.get(type_id) else {
                    return;
                };
                if let Some(target) = self.cells.get_mut(cell) {
                    target.transform_into(definition);
                    trace!(?cell, type_id, "transformation");
                }
            }
        }
    }

    fn stage_integrate(&mut self, dt: f64) {
        let mask = self.in_domain_mask();
        let integrator = self.config.integrator;
        let (handles, cells) = self.cells.split_mut();
        let moved: Vec<CellId> = handles
            .iter()
            .zip(cells.iter())
            .zip(&mask)
            .filter(|((_, cell), inside)| **inside && cell.is_movable)
            .map(|((&id, _), _)| id)
            .collect();
        cells
            .par_iter_mut()
            .zip(mask.par_iter())
            .for_each(|(cell, &inside)| {
                if inside {
                    integrate(cell, dt, integrator);
                } else {
                    cell.velocity = DVec3::ZERO;
                }
            });
        for id in moved {
            self.refile(id);
        }
    }

    /// Re-file `id` from its current position, applying the boundary
    /// condition when it has left the domain.
    fn refile(&mut self, id: CellId) -> Relocation {
        let Some(position) = self.cells.get(id).map(|cell| cell.position) else {
            return Relocation::Stayed;
        };
        let relocation = self.container.update(id, position);
        match relocation {
            Relocation::Escaped(face) => self.apply_boundary(id, position, face),
            _ => relocation,
        }
    }

    fn apply_boundary(&mut self, id: CellId, position: DVec3, face: Face) -> Relocation {
        let relocation = Relocation::Escaped(face);
        match self.config.boundary_condition {
            BoundaryCondition::Ignore => relocation,
            BoundaryCondition::Remove => {
                warn!(cell = ?id, ?face, "cell left the domain and will be removed");
                self.pending_deaths.insert(id);
                relocation
            }
            BoundaryCondition::Clamp => {
                let margin = 1e-6 * self.config.voxel_size;
                let bounds = self.container.mesh().bounds();
                let clamped = position.clamp(bounds.min + margin, bounds.max - margin);
                if let Some(cell) = self.cells.get_mut(id) {
                    cell.position = clamped;
                }
                self.container.update(id, clamped)
            }
        }
    }

    fn detach_all_springs(&mut self, id: CellId) {
        let partners = self
            .cells
            .get_mut(id)
            .map(|cell| std::mem::take(&mut cell.state.spring_attachments))
            .unwrap_or_default();
        for partner in partners {
            if let Some(other) = self.cells.get_mut(partner) {
                other.state.spring_attachments.retain(|&p| p != id);
            }
        }
    }

    fn detach_everything(&mut self, id: CellId) {
        self.detach_all_springs(id);
        let partners = self
            .cells
            .get_mut(id)
            .map(|cell| std::mem::take(&mut cell.state.attached_cells))
            .unwrap_or_default();
        for partner in partners {
            if let Some(other) = self.cells.get_mut(partner) {
                other.state.attached_cells.retain(|&p| p != id);
            }
        }
    }

    /// Register `definition`, assigning it the next type id.
    pub fn register_definition(&mut self, mut definition: CellDefinition) -> usize {
        let type_id = self.definitions.len();
        definition.type_id = type_id;
        self.definitions.push(definition);
        type_id
    }

    #[must_use]
    pub fn definition(&self, type_id: usize) -> Option<&CellDefinition> {
        self.definitions.get(type_id)
    }

    #[must_use]
    pub fn definitions(&self) -> &[CellDefinition] {
        &self.definitions
    }

    /// Instantiate a cell of `type_id` at `position`.
    pub fn spawn_cell(&mut self, type_id: usize, position: DVec3) -> Result<CellId, SimulationError> {
        let definition = self
            .definitions
            .get(type_id)
            .ok_or(SimulationError::UnknownCellType(type_id))?;
        let cell = definition.instantiate(position);
        Ok(self.insert_cell(cell))
    }

    /// Insert a fully built cell and file it in the container.
    pub fn insert_cell(&mut self, cell: Cell) -> CellId {
        let id = self.cells.insert(cell);
        self.refile(id);
        id
    }

    /// Remove `id` immediately, detaching it from every partner.
    pub fn remove_cell(&mut self, id: CellId) -> Option<Cell> {
        if !self.cells.contains(id) {
            return None;
        }
        self.detach_everything(id);
        self.container.remove(id);
        self.cells.remove(id)
    }

    /// Symmetric manual attachment consumed by contact rules.
    pub fn attach_cells(&mut self, a: CellId, b: CellId) -> bool {
        let Some((first, second)) = self.cells.pair_mut(a, b) else {
            return false;
        };
        if first.state.attached_cells.contains(&b) {
            return false;
        }
        first.state.attached_cells.push(b);
        second.state.attached_cells.push(a);
        true
    }

    pub fn detach_cells(&mut self, a: CellId, b: CellId) -> bool {
        let Some((first, second)) = self.cells.pair_mut(a, b) else {
            return false;
        };
        let before = first.state.attached_cells.len();
        first.state.attached_cells.retain(|&p| p != b);
        second.state.attached_cells.retain(|&p| p != a);
        first.state.attached_cells.len() != before
    }

    /// Symmetric spring attachment. Attaching an attached pair is a no-op.
    pub fn attach_springs(&mut self, a: CellId, b: CellId) -> bool {
        let Some((first, second)) = self.cells.pair_mut(a, b) else {
            return false;
        };
        if first.state.spring_attachments.contains(&b) {
            return false;
        }
        first.state.spring_attachments.push(b);
        second.state.spring_attachments.push(a);
        true
    }

    pub fn detach_springs(&mut self, a: CellId, b: CellId) -> bool {
        let Some((first, second)) = self.cells.pair_mut(a, b) else {
            return false;
        };
        let before = first.state.spring_attachments.len();
        first.state.spring_attachments.retain(|&p| p != b);
        second.state.spring_attachments.retain(|&p| p != a);
        first.state.spring_attachments.len() != before
    }

    /// Switch `id` onto its death chain `model_index` now.
    pub fn start_death(&mut self, id: CellId, model_index: usize) -> bool {
        let started = self
            .cells
            .get_mut(id)
            .is_some_and(|cell| cell.phenotype.start_death(model_index));
        if started {
            self.detach_all_springs(id);
        }
        started
    }

    #[must_use]
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id)
    }

    /// Mutable access to a cell. Use [`Self::set_position`] to move it.
    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(id)
    }

    /// Move `id` and re-file it under the boundary condition.
    pub fn set_position(&mut self, id: CellId, position: DVec3) -> Option<Relocation> {
        self.cells.get_mut(id)?.position = position;
        Some(self.refile(id))
    }

    #[must_use]
    pub fn location(&self, id: CellId) -> Option<Location> {
        self.container.location(id)
    }

    /// In-domain cells within `radius` of `center`, nearest first.
    #[must_use]
    pub fn cells_within(&self, center: DVec3, radius: f64) -> Vec<(CellId, f64)> {
        let mut hits: Vec<(CellId, OrderedFloat<f64>)> = Vec::new();
        self.container
            .neighbors_within(center, radius * radius, &mut |id, dist_sq| hits.push((id, dist_sq)));
        hits.sort_by_key(|&(_, dist_sq)| dist_sq);
        hits.into_iter()
            .map(|(id, dist_sq)| (id, dist_sq.0.sqrt()))
            .collect()
    }

    /// Rebuild the voxel grid; cells now outside are handled by the boundary
    /// condition. Returns the number of escapees.
    pub fn resize(&mut self, bounds: DomainBounds, voxel_size: f64) -> Result<usize, SimulationError> {
        let config = SimConfig {
            domain: bounds,
            voxel_size,
            ..self.config.clone()
        };
        config.validate()?;
        let escaped = self.container.resize(bounds, DVec3::splat(voxel_size))?;
        self.config = config;
        for &id in &escaped {
            let position = self.cells.get(id).map(|cell| cell.position);
            if let (Some(position), Some(Location::Outside(face))) =
                (position, self.container.location(id))
            {
                self.apply_boundary(id, position, face);
            }
        }
        self.flush_deaths();
        Ok(escaped.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellId, &Cell)> + '_ {
        self.cells.iter()
    }

    #[must_use]
    pub fn population(&self) -> usize {
        self.cells.len()
    }

    /// Most recent tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub const fn tick_count(&self) -> Tick {
        self.tick
    }

    /// Time passed to the most recent tick.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn models(&self) -> &StandardModels {
        &self.models
    }

    #[must_use]
    pub fn container(&self) -> &CellContainer<CellId> {
        &self.container
    }

    /// Time the phenotype block last ran.
    #[must_use]
    pub fn last_cell_cycle_time(&self) -> f64 {
        self.cell_cycle.last()
    }

    /// Time the mechanics block last ran.
    #[must_use]
    pub fn last_mechanics_time(&self) -> f64 {
        self.mechanics.last()
    }

    #[must_use]
    pub fn pending_division_count(&self) -> usize {
        self.pending_divisions.len()
    }

    #[must_use]
    pub fn pending_death_count(&self) -> usize {
        self.pending_deaths.len()
    }

    #[must_use]
    pub fn num_divisions_in_current_step(&self) -> usize {
        self.divisions_in_step
    }

    #[must_use]
    pub fn num_deaths_in_current_step(&self) -> usize {
        self.deaths_in_step
    }

    pub fn reset_step_counters(&mut self) {
        self.divisions_in_step = 0;
        self.deaths_in_step = 0;
    }

    pub fn set_factory(&mut self, factory: Box<dyn AgentFactory>) {
        self.factory = factory;
    }

    pub fn set_force_law(&mut self, force_law: Box<dyn ForceLaw>) {
        self.force_law = force_law;
    }

    pub fn set_damage_model(&mut self, damage: Box<dyn DamageModel>) {
        self.damage = damage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::NullEnvironment;
    use crate::phenotype::Phenotype;

    fn simulation(config: SimConfig) -> Simulation {
        Simulation::new(
            SimConfig {
                rng_seed: Some(5),
                ..config
            },
            Arc::new(NullEnvironment),
        )
        .expect("simulation")
    }

    fn inert(sim: &mut Simulation) -> usize {
        sim.register_definition(CellDefinition::new("inert", Phenotype::default()))
    }

    #[test]
    fn first_tick_runs_every_block_then_waits() {
        let mut sim = simulation(SimConfig::default());
        let first = sim.tick(0.0, 6.0, 0.1, 0.01);
        assert!(first.phenotype_ran && first.mechanics_ran);
        let second = sim.tick(0.01, 6.0, 0.1, 0.01);
        assert!(!second.phenotype_ran && !second.mechanics_ran);
        assert_eq!(sim.last_mechanics_time(), 0.0);
        let mut now = 0.01;
        let mut ran = false;
        for _ in 0..9 {
            now += 0.01;
            ran = sim.tick(now, 6.0, 0.1, 0.01).mechanics_ran;
        }
        assert!(ran, "mechanics due after ~0.1 despite drift");
        assert_eq!(sim.last_mechanics_time(), now);
        assert_eq!(sim.last_cell_cycle_time(), 0.0);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let mut sim = simulation(SimConfig::default());
        assert!(matches!(
            sim.spawn_cell(3, DVec3::ZERO),
            Err(SimulationError::UnknownCellType(3))
        ));
    }

    #[test]
    fn springs_are_symmetric_and_idempotent() {
        let mut sim = simulation(SimConfig::default());
        let t = inert(&mut sim);
        let a = sim.spawn_cell(t, DVec3::ZERO).expect("a");
        let b = sim.spawn_cell(t, DVec3::X).expect("b");
        assert!(sim.attach_springs(a, b));
        assert!(!sim.attach_springs(b, a));
        assert_eq!(sim.cell(a).map(|c| c.state.spring_attachments.clone()), Some(vec![b]));
        assert_eq!(sim.cell(b).map(|c| c.state.spring_attachments.clone()), Some(vec![a]));
        assert!(!sim.attach_springs(a, a));
        assert!(sim.detach_springs(b, a));
        assert!(sim.cell(a).is_some_and(|c| c.state.spring_attachments.is_empty()));
    }

    #[test]
    fn removal_detaches_partners() {
        let mut sim = simulation(SimConfig::default());
        let t = inert(&mut sim);
        let a = sim.spawn_cell(t, DVec3::ZERO).expect("a");
        let b = sim.spawn_cell(t, DVec3::X).expect("b");
        sim.attach_springs(a, b);
        sim.attach_cells(a, b);
        assert!(sim.remove_cell(a).is_some());
        let survivor = sim.cell(b).expect("b");
        assert!(survivor.state.spring_attachments.is_empty());
        assert!(survivor.state.attached_cells.is_empty());
        assert_eq!(sim.location(a), None);
        assert!(sim.cell(a).is_none());
    }

    #[test]
    fn cells_within_sorts_by_distance() {
        let mut sim = simulation(SimConfig::default());
        let t = inert(&mut sim);
        let far = sim.spawn_cell(t, DVec3::new(20.0, 0.0, 0.0)).expect("far");
        let near = sim.spawn_cell(t, DVec3::new(5.0, 0.0, 0.0)).expect("near");
        sim.spawn_cell(t, DVec3::new(200.0, 0.0, 0.0)).expect("out");
        let hits = sim.cells_within(DVec3::ZERO, 25.0);
        assert_eq!(hits.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![near, far]);
        assert!((hits[0].1 - 5.0).abs() < 1e-12);
    }

    #[test]
    fn history_is_bounded() {
        let mut sim = simulation(SimConfig {
            history_capacity: 3,
            ..SimConfig::default()
        });
        for _ in 0..10 {
            sim.step();
        }
        let ticks: Vec<u64> = sim.history().map(|s| s.tick.0).collect();
        assert_eq!(ticks, vec![8, 9, 10]);
        assert_eq!(sim.tick_count(), Tick(10));
        assert!((sim.time() - 0.09).abs() < 1e-12);
    }

    #[test]
    fn resize_applies_boundary_condition() {
        let mut sim = simulation(SimConfig {
            boundary_condition: BoundaryCondition::Remove,
            ..SimConfig::default()
        });
        let t = inert(&mut sim);
        let kept = sim.spawn_cell(t, DVec3::ZERO).expect("kept");
        sim.spawn_cell(t, DVec3::splat(300.0)).expect("lost");
        let escaped = sim
            .resize(DomainBounds::centered_cube(100.0), 20.0)
            .expect("resize");
        assert_eq!(escaped, 1);
        assert_eq!(sim.population(), 1);
        assert!(sim.cell(kept).is_some());
    }
}
