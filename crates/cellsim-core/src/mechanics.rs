//! Force accumulation, spring attachments and position integration.

use cellsim_index::CellContainer;
use glam::DVec3;

use crate::CellId;
use crate::arena::CellArena;
use crate::cell::Cell;
use crate::config::Integrator;
use crate::environment::Microenvironment;
use crate::rng::{UniformRandom, unit_circle, unit_sphere};

/// Pressure normalisation so a cell packed in a confluent lattice sees ~1.
const SIMPLE_PRESSURE_SCALE: f64 = 0.027288;
/// Rest length of an elastic contact relative to the summed radii.
const REST_LENGTH_FACTOR: f64 = 0.9523809523809523;

/// Contribution of one neighbour to a cell's velocity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairForce {
    pub velocity: DVec3,
    pub pressure: f64,
    /// The neighbour is close enough to count as adhered.
    pub is_neighbor: bool,
}

/// Pairwise force law between two cells.
pub trait ForceLaw: Send + Sync {
    fn pair(&self, cell: &Cell, other: &Cell) -> PairForce;
}

/// Quadratic repulsion inside the summed radii and quadratic adhesion out to
/// the relative maximum adhesion distance, weighted by type affinities.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPotentials;

impl ForceLaw for StandardPotentials {
    fn pair(&self, cell: &Cell, other: &Cell) -> PairForce {
        let mut result = PairForce::default();
        let displacement = cell.position - other.position;
        let distance = displacement.length().max(1e-5);

        let own = &cell.phenotype;
        let theirs = &other.phenotype;
        let contact = own.geometry.radius + theirs.geometry.radius;

        let mut repulsion = 0.0;
        if distance < contact {
            repulsion = 1.0 - distance / contact;
            repulsion *= repulsion;
            result.pressure = repulsion / SIMPLE_PRESSURE_SCALE;
        }
        repulsion *= (own.mechanics.cell_cell_repulsion_strength
            * theirs.mechanics.cell_cell_repulsion_strength)
            .sqrt();

        let adhesion_range = own.mechanics.relative_maximum_adhesion_distance * own.geometry.radius
            + theirs.mechanics.relative_maximum_adhesion_distance * theirs.geometry.radius;
        let mut adhesion = 0.0;
        if distance < adhesion_range {
            adhesion = 1.0 - distance / adhesion_range;
            adhesion *= adhesion;
            let own_strength =
                own.mechanics.cell_cell_adhesion_strength * own.mechanics.affinity(other.type_id);
            let their_strength = theirs.mechanics.cell_cell_adhesion_strength
                * theirs.mechanics.affinity(cell.type_id);
            adhesion *= (own_strength * their_strength).sqrt();
            result.is_neighbor = true;
        }

        let net = repulsion - adhesion;
        if net.abs() >= 1e-16 {
            result.velocity = displacement * (net / distance);
        }
        result
    }
}

/// Read-only view handed to velocity rules.
pub struct VelocityContext<'a> {
    pub cells: &'a CellArena,
    pub container: &'a CellContainer<CellId>,
    pub force_law: &'a dyn ForceLaw,
    pub environment: &'a dyn Microenvironment,
}

/// Velocity rule output, applied to the cell at the barrier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VelocityUpdate {
    /// Added to the cell's velocity.
    pub velocity: DVec3,
    /// Replaces the cell's simple pressure.
    pub pressure: f64,
    /// Replaces the cell's neighbour list.
    pub neighbors: Vec<CellId>,
    /// Replaces the motility vector.
    pub motility: DVec3,
}

/// Default velocity rule: membrane, pairwise forces over the pruned Moore
/// neighbourhood, then motility.
pub fn standard_update_velocity(
    ctx: &VelocityContext<'_>,
    id: CellId,
    cell: &Cell,
    dt: f64,
    rng: &mut dyn UniformRandom,
) -> VelocityUpdate {
    let mut update = VelocityUpdate::default();
    if let Some(membrane) = &cell.functions.basement_membrane {
        update.velocity += membrane(cell, dt);
    }
    ctx.container.neighbors_of(id, cell.reach(), &mut |other_id| {
        let Some(other) = ctx.cells.get(other_id) else {
            return;
        };
        let force = ctx.force_law.pair(cell, other);
        update.velocity += force.velocity;
        update.pressure += force.pressure;
        if force.is_neighbor {
            update.neighbors.push(other_id);
        }
    });
    update.motility = update_motility_vector(cell, dt, rng);
    update.velocity += update.motility;
    update
}

/// Persistent biased random walk. A new direction is drawn with probability
/// `dt / persistence_time`, otherwise the current vector is kept.
pub fn update_motility_vector(cell: &Cell, dt: f64, rng: &mut dyn UniformRandom) -> DVec3 {
    let motility = &cell.phenotype.motility;
    if !motility.is_motile {
        return DVec3::ZERO;
    }
    if !rng.chance(dt / motility.persistence_time) {
        return motility.motility_vector;
    }
    let random = if motility.restrict_to_2d {
        unit_circle(rng)
    } else {
        unit_sphere(rng)
    };
    let biased = motility.migration_bias * motility.migration_bias_direction
        + (1.0 - motility.migration_bias) * random;
    biased.normalize_or_zero() * motility.migration_speed
}

/// Effective spring constant between two attached cells.
#[must_use]
pub fn spring_constant(cell: &Cell, other: &Cell) -> f64 {
    let own = &cell.phenotype.mechanics;
    let theirs = &other.phenotype.mechanics;
    let product = own.attachment_elastic_constant
        * own.affinity(other.type_id)
        * theirs.attachment_elastic_constant
        * theirs.affinity(cell.type_id);
    product.max(0.0).sqrt()
}

/// Zero-rest-length spring pulling `cell` towards `other`.
#[must_use]
pub fn elastic_spring_velocity(cell: &Cell, other: &Cell) -> DVec3 {
    if !cell.is_movable {
        return DVec3::ZERO;
    }
    spring_constant(cell, other) * (other.position - cell.position)
}

/// Contact rule with a rest length just under the summed radii.
pub fn elastic_contact_with_rest_length(cell: &Cell, other: &Cell, _dt: f64) -> DVec3 {
    if !cell.is_movable {
        return DVec3::ZERO;
    }
    let displacement = other.position - cell.position;
    let length = displacement.length();
    if length <= 0.0 {
        return DVec3::ZERO;
    }
    let rest = (cell.phenotype.geometry.radius + other.phenotype.geometry.radius)
        * REST_LENGTH_FACTOR;
    displacement / length * ((length - rest) * spring_constant(cell, other))
}

/// Spring changes one cell wants this tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpringProposal {
    pub detach: Vec<CellId>,
    pub attach: Vec<CellId>,
}

/// Draw detachments from current partners, then walk neighbours in order
/// proposing attachments until the cell's cap is reached.
pub fn propose_springs(
    cells: &CellArena,
    cell: &Cell,
    dt: f64,
    rng: &mut dyn UniformRandom,
) -> SpringProposal {
    let mut proposal = SpringProposal::default();
    if cell.is_dead() {
        return proposal;
    }
    let mechanics = &cell.phenotype.mechanics;
    for &partner in &cell.state.spring_attachments {
        if rng.chance(mechanics.detachment_rate * dt) {
            proposal.detach.push(partner);
        }
    }

    let cap = mechanics.maximum_number_of_attachments;
    let mut count = cell.state.spring_attachments.len() - proposal.detach.len();
    for &candidate in &cell.state.neighbors {
        if count >= cap {
            break;
        }
        if cell.state.spring_attachments.contains(&candidate) {
            continue;
        }
        let Some(other) = cells.get(candidate) else {
            continue;
        };
        if other.is_dead()
            || other.state.spring_attachments.len()
                >= other.phenotype.mechanics.maximum_number_of_attachments
        {
            continue;
        }
        let probability = mechanics.attachment_rate * dt * mechanics.affinity(other.type_id);
        if rng.chance(probability) {
            proposal.attach.push(candidate);
            count += 1;
        }
    }
    proposal
}

/// Advance `cell` by `dt` and clear its velocity for the next accumulation.
pub fn integrate(cell: &mut Cell, dt: f64, integrator: Integrator) {
    if cell.is_movable {
        let step = match integrator {
            Integrator::ForwardEuler => cell.velocity,
            Integrator::AdamsBashforth2 => 1.5 * cell.velocity - 0.5 * cell.previous_velocity,
        };
        cell.position += dt * step;
    }
    cell.previous_velocity = cell.velocity;
    cell.velocity = DVec3::ZERO;
}
