use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cellsim_core::cell::MembraneRule;
use cellsim_core::cycle::PhaseEntry;
use cellsim_core::standard_models::standard_functions;
use cellsim_core::{
    BoundaryCondition, Cell, CellDefinition, CycleModel, CycleState, Face, Intracellular, Location,
    Microenvironment, ModelFamily, NullEnvironment, PhaseCode, Phenotype, SimConfig, Simulation,
};
use glam::DVec3;

fn seeded(seed: u64) -> SimConfig {
    SimConfig {
        rng_seed: Some(seed),
        ..SimConfig::default()
    }
}

fn simulation(config: SimConfig) -> Simulation {
    Simulation::new(config, Arc::new(NullEnvironment)).expect("simulation")
}

/// Definition with the standard hooks but no cycle or death chains.
fn quiescent(name: &str) -> CellDefinition {
    let mut definition = CellDefinition::new(name, Phenotype::default());
    definition.functions = standard_functions();
    definition
}

fn lattice(n: usize, spacing: f64) -> Vec<DVec3> {
    let offset = 0.5 * (n as f64 - 1.0) * spacing;
    let mut points = Vec::with_capacity(n * n * n);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                points.push(DVec3::new(
                    i as f64 * spacing - offset,
                    j as f64 * spacing - offset,
                    k as f64 * spacing - offset,
                ));
            }
        }
    }
    points
}

fn grow_cluster(seed: u64) -> Vec<(DVec3, f64, usize, usize)> {
    let mut sim = simulation(seeded(seed));
    let mut definition = sim.models().default_definition("tumor");
    definition.phenotype.cycle = CycleState::new(Arc::clone(&sim.models().live));
    definition.phenotype.cycle.set_transition_rate(0, 0, 0.01);
    definition.phenotype.death.models[0].rate = 0.001;
    definition.phenotype.mechanics.attachment_rate = 0.5;
    definition.phenotype.mechanics.detachment_rate = 0.1;
    let tumor = sim.register_definition(definition);
    for position in lattice(3, 16.0) {
        sim.spawn_cell(tumor, position).expect("spawn");
    }
    for step in 0..300 {
        sim.tick(step as f64 * 0.1, 6.0, 0.1, 0.1);
    }
    sim.iter()
        .map(|(_, cell)| {
            (
                cell.position,
                cell.phenotype.volume.total,
                cell.phenotype.cycle.phase_index(),
                cell.state.spring_attachments.len(),
            )
        })
        .collect()
}

#[test]
fn seeded_runs_are_reproducible() {
    let first = grow_cluster(0xC0FFEE);
    let second = grow_cluster(0xC0FFEE);
    assert!(first.len() > 27, "some cells should have divided");
    assert_eq!(first, second);
    assert_ne!(first, grow_cluster(0xBADC0DE));
}

#[test]
fn live_cells_divide_at_the_configured_rate() {
    let rate = 0.01;
    let mut sim = simulation(seeded(11));
    let mut definition = sim.models().default_definition("live");
    definition.phenotype.cycle = CycleState::new(Arc::clone(&sim.models().live));
    definition.phenotype.cycle.set_transition_rate(0, 0, rate);
    for entry in &mut definition.phenotype.death.models {
        entry.rate = 0.0;
    }
    definition.is_movable = false;
    let live = sim.register_definition(definition);
    for i in 0..10 {
        for j in 0..10 {
            for k in 0..2 {
                let position = DVec3::new(
                    -400.0 + 80.0 * i as f64,
                    -400.0 + 80.0 * j as f64,
                    -40.0 + 80.0 * k as f64,
                );
                sim.spawn_cell(live, position).expect("spawn");
            }
        }
    }

    let mut exposed = 0usize;
    let mut divisions = 0usize;
    let mut population = sim.population();
    for step in 0..200 {
        let summary = sim.tick(step as f64, 1.0, 1.0, 1.0);
        assert!(summary.phenotype_ran);
        exposed += population;
        divisions += summary.divisions;
        population = summary.population;
    }
    assert_eq!(population, 200 + divisions);

    let estimate = divisions as f64 / exposed as f64;
    let mean_time = 1.0 / estimate;
    assert!(
        (mean_time - 1.0 / rate).abs() < 15.0,
        "mean time to division {mean_time:.1} min, expected ~{:.1}",
        1.0 / rate
    );
}

/// Minutes until the lone cell first divides on the standard live graph.
fn first_division_time(seed: u64) -> f64 {
    let mut sim = simulation(seeded(seed));
    let mut definition = sim.models().default_definition("live");
    definition.phenotype.cycle = CycleState::new(Arc::clone(&sim.models().live));
    for entry in &mut definition.phenotype.death.models {
        entry.rate = 0.0;
    }
    let live = sim.register_definition(definition);
    sim.spawn_cell(live, DVec3::ZERO).expect("spawn");

    for step in 0..50_000 {
        let now = step as f64;
        if sim.tick(now, 1.0, 1.0, 1.0).divisions > 0 {
            return now;
        }
    }
    panic!("seed {seed}: no division within 50000 min");
}

#[test]
fn standard_live_model_divides_at_its_published_rate() {
    let runs = 200;
    let mean = (0..runs)
        .map(|seed| first_division_time(1_000 + seed))
        .sum::<f64>()
        / runs as f64;
    let expected = 60.0 / 0.0432;
    assert!(
        (mean - expected).abs() < 0.25 * expected,
        "mean time to first division {mean:.0} min, expected ~{expected:.0}"
    );
}

fn necrosis_timeline(seed: u64) -> (f64, f64) {
    let mut sim = simulation(seeded(seed));
    let mut definition = sim.models().default_definition("tumor");
    for entry in &mut definition.phenotype.death.models {
        entry.rate = 0.0;
    }
    let necrosis = definition
        .phenotype
        .death
        .find_death_model_index("Necrosis")
        .expect("necrosis model");
    let tumor = sim.register_definition(definition);
    let id = sim.spawn_cell(tumor, DVec3::ZERO).expect("spawn");
    assert!(sim.start_death(id, necrosis));

    let mut lysed_at = None;
    for step in 0..3_000 {
        let now = 60.0 * step as f64;
        sim.tick(now, 60.0, 60.0, 60.0);
        let Some(cell) = sim.cell(id) else {
            let lysed = lysed_at.expect("cell lysed before removal");
            return (lysed, now);
        };
        let phase = cell.phenotype.cycle.current_phase().map(|p| p.code);
        if lysed_at.is_none() && phase == Some(PhaseCode::NECROTIC_LYSED) {
            lysed_at = Some(now);
        }
    }
    panic!("necrotic cell was never removed");
}

#[test]
fn necrotic_cells_are_removed_a_day_after_lysis() {
    let (lysed, removed) = necrosis_timeline(1);
    assert!(lysed > 0.0, "swelling takes at least one update");
    assert_eq!(removed - lysed, 86_400.0, "lysed debris lasts exactly one day");
    for seed in [2, 3] {
        assert_eq!(necrosis_timeline(seed), (lysed, removed));
    }
}

fn pair_with_attachment_rate(rate: f64) -> Simulation {
    let mut sim = simulation(seeded(3));
    let mut definition = quiescent("pair");
    definition.phenotype.mechanics.cell_cell_adhesion_strength = 0.0;
    definition.phenotype.mechanics.cell_cell_repulsion_strength = 0.0;
    definition.phenotype.mechanics.attachment_rate = rate;
    let radius = definition.phenotype.geometry.radius;
    let t = sim.register_definition(definition);
    sim.spawn_cell(t, DVec3::ZERO).expect("a");
    sim.spawn_cell(t, DVec3::new(2.2 * radius, 0.0, 0.0)).expect("b");
    for step in 0..100 {
        sim.tick(step as f64 * 0.1, 6.0, 0.1, 0.1);
    }
    sim
}

#[test]
fn zero_attachment_rate_never_forms_springs() {
    let sim = pair_with_attachment_rate(0.0);
    for (_, cell) in sim.iter() {
        assert_eq!(cell.state.neighbors.len(), 1);
        assert!(cell.state.spring_attachments.is_empty());
    }

    let sim = pair_with_attachment_rate(1e6);
    let ids: Vec<_> = sim.iter().map(|(id, _)| id).collect();
    for (id, cell) in sim.iter() {
        let partner = if id == ids[0] { ids[1] } else { ids[0] };
        assert_eq!(cell.state.spring_attachments, vec![partner]);
    }
}

#[test]
fn springs_stay_symmetric_and_capped() {
    let mut sim = simulation(seeded(21));
    let mut definition = quiescent("cluster");
    definition.phenotype.mechanics.attachment_rate = 1.0;
    definition.phenotype.mechanics.detachment_rate = 0.05;
    definition.phenotype.mechanics.maximum_number_of_attachments = 3;
    let t = sim.register_definition(definition);
    for position in lattice(3, 15.0) {
        sim.spawn_cell(t, position).expect("spawn");
    }

    let mut formed = 0;
    for step in 0..200 {
        sim.tick(step as f64 * 0.1, 6.0, 0.1, 0.1);
        for (id, cell) in sim.iter() {
            let springs = &cell.state.spring_attachments;
            assert!(springs.len() <= 3);
            assert!(!springs.contains(&id));
            for (i, &partner) in springs.iter().enumerate() {
                assert!(!springs[i + 1..].contains(&partner), "duplicate spring");
                let other = sim.cell(partner).expect("partner alive");
                assert!(other.state.spring_attachments.contains(&id));
            }
            formed += springs.len();
        }
    }
    assert!(formed > 0, "springs should form in a packed cluster");
}

#[test]
fn queued_divisions_flush_in_the_same_tick() {
    let burst = CycleModel::builder("burst", ModelFamily::Custom)
        .phase(PhaseCode(1), "cycling")
        .division_at_exit(PhaseCode(1))
        .entry(PhaseCode(1), PhaseEntry::DoubleBiomass)
        .link(PhaseCode(1), PhaseCode(1), 1e6)
        .build()
        .expect("burst model");
    let mut sim = simulation(seeded(4));
    let mut definition = quiescent("burst");
    definition.phenotype.cycle = CycleState::new(Arc::new(burst));
    let t = sim.register_definition(definition);
    for i in 0..8 {
        sim.spawn_cell(t, DVec3::new(40.0 * i as f64 - 140.0, 0.0, 0.0))
            .expect("spawn");
    }

    let first = sim.tick(0.0, 6.0, 0.1, 0.1);
    assert_eq!(first.divisions, 8);
    assert_eq!(first.population, 16);
    assert_eq!(sim.pending_division_count(), 0);

    let mut now = 0.0;
    let mut second = first;
    while !second.phenotype_ran || second.tick == first.tick {
        now += 0.1;
        second = sim.tick(now, 6.0, 0.1, 0.1);
    }
    assert_eq!(second.divisions, 16);
    assert_eq!(sim.population(), 32);
    assert_eq!(sim.num_divisions_in_current_step(), 24);
    sim.reset_step_counters();
    assert_eq!(sim.num_divisions_in_current_step(), 0);
}

fn escaping_cell(policy: BoundaryCondition) -> (Simulation, cellsim_core::CellId) {
    let mut sim = simulation(SimConfig {
        boundary_condition: policy,
        ..seeded(8)
    });
    let mut definition = quiescent("drifter");
    let push: MembraneRule = Arc::new(|_cell: &Cell, _dt: f64| DVec3::new(100.0, 0.0, 0.0));
    definition.functions.basement_membrane = Some(push);
    let t = sim.register_definition(definition);
    let id = sim.spawn_cell(t, DVec3::new(495.0, 0.0, 0.0)).expect("spawn");
    (sim, id)
}

#[test]
fn remove_policy_deletes_escaping_cells() {
    let (mut sim, id) = escaping_cell(BoundaryCondition::Remove);
    let summary = sim.tick(0.0, 6.0, 0.1, 0.1);
    assert_eq!(summary.deaths, 1);
    assert_eq!(sim.population(), 0);
    assert!(sim.cell(id).is_none());
    assert_eq!(sim.pending_death_count(), 0);
}

#[test]
fn clamp_policy_pins_cells_inside_the_boundary() {
    let (mut sim, id) = escaping_cell(BoundaryCondition::Clamp);
    sim.tick(0.0, 6.0, 0.1, 0.1);
    let cell = sim.cell(id).expect("clamped cell survives");
    let expected = 500.0 - 1e-6 * sim.config().voxel_size;
    assert!((cell.position.x - expected).abs() < 1e-9);
    assert!(matches!(sim.location(id), Some(Location::Voxel(_))));
}

#[test]
fn ignore_policy_parks_cells_in_the_outer_bucket() {
    let (mut sim, id) = escaping_cell(BoundaryCondition::Ignore);
    let summary = sim.tick(0.0, 6.0, 0.1, 0.1);
    assert_eq!(summary.out_of_domain, 1);
    assert_eq!(sim.location(id), Some(Location::Outside(Face::PosX)));
    let parked = sim.cell(id).expect("cell kept").position;
    assert!(parked.x > 500.0);

    sim.tick(0.1, 6.0, 0.1, 0.1);
    assert_eq!(sim.cell(id).map(|cell| cell.position), Some(parked));
    assert_eq!(sim.population(), 1);
}

#[derive(Default)]
struct CountingEnvironment {
    exchanges: AtomicUsize,
}

impl Microenvironment for CountingEnvironment {
    fn secretion_uptake(&self, _cell: &Cell, _dt: f64) {
        self.exchanges.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
struct CountingNetwork {
    steps: Arc<AtomicUsize>,
}

impl Intracellular for CountingNetwork {
    fn needs_update(&self) -> bool {
        true
    }

    fn update(&mut self, _phenotype: &mut Phenotype, _dt: f64) {
        self.steps.fetch_add(1, Ordering::Relaxed);
    }

    fn clone_box(&self) -> Box<dyn Intracellular> {
        Box::new(self.clone())
    }
}

#[test]
fn secretion_runs_every_tick_and_intracellular_after_bootstrap() {
    let environment = Arc::new(CountingEnvironment::default());
    let mut sim = Simulation::new(
        SimConfig {
            boundary_condition: BoundaryCondition::Ignore,
            ..seeded(9)
        },
        environment.clone(),
    )
    .expect("simulation");
    let steps = Arc::new(AtomicUsize::new(0));
    let hooks = Arc::new(AtomicUsize::new(0));
    let mut definition = quiescent("signalling");
    definition.intracellular = Some(Box::new(CountingNetwork {
        steps: Arc::clone(&steps),
    }));
    let pre = Arc::clone(&hooks);
    definition.functions.pre_intracellular = Some(Arc::new(move |_: &mut Cell, _: &dyn Microenvironment, _: f64| {
        pre.fetch_add(1, Ordering::Relaxed);
    }));
    let post = Arc::clone(&hooks);
    definition.functions.post_intracellular = Some(Arc::new(move |_: &mut Cell, _: &dyn Microenvironment, _: f64| {
        post.fetch_add(1, Ordering::Relaxed);
    }));
    let t = sim.register_definition(definition);
    sim.spawn_cell(t, DVec3::new(-100.0, 0.0, 0.0)).expect("a");
    sim.spawn_cell(t, DVec3::new(100.0, 0.0, 0.0)).expect("b");
    sim.spawn_cell(t, DVec3::new(0.0, 0.0, 100.0)).expect("c");
    let outside = sim.spawn_cell(t, DVec3::new(0.0, 700.0, 0.0)).expect("outside");
    assert_eq!(sim.location(outside), Some(Location::Outside(Face::PosY)));

    sim.tick(0.0, 6.0, 0.1, 0.01);
    assert_eq!(environment.exchanges.load(Ordering::Relaxed), 3);
    assert_eq!(steps.load(Ordering::Relaxed), 0);
    assert_eq!(hooks.load(Ordering::Relaxed), 0);

    for step in 1..5 {
        sim.tick(step as f64 * 0.01, 6.0, 0.1, 0.01);
    }
    assert_eq!(environment.exchanges.load(Ordering::Relaxed), 15);
    assert_eq!(steps.load(Ordering::Relaxed), 12);
    assert_eq!(hooks.load(Ordering::Relaxed), 24);
}
