use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use cellsim_core::{
    CycleModel, CycleState, SimConfig, Simulation, StandardModels, TickSummary, UniformEnvironment,
};
use clap::{Parser, ValueEnum};
use glam::DVec3;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "cellsim",
    version,
    about = "Seed a spheroid of cells and advance it through the multi-rate scheduler"
)]
struct Cli {
    /// JSON file with simulation settings; missing fields take their defaults.
    #[arg(short, long, env = "CELLSIM_CONFIG")]
    config: Option<PathBuf>,

    /// Override the RNG seed from the config file.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of cells seeded at startup.
    #[arg(long, default_value_t = 200)]
    cells: usize,

    /// Radius of the seeded spheroid in microns.
    #[arg(long, default_value_t = 60.0)]
    radius: f64,

    /// Simulated time to advance, in minutes.
    #[arg(long, default_value_t = 120.0)]
    minutes: f64,

    /// Cycle model assigned to the seeded cells.
    #[arg(long, value_enum, default_value_t = CycleChoice::AdvancedKi67)]
    cycle: CycleChoice,

    /// Uniform oxygen partial pressure (mmHg) seen by every cell.
    #[arg(long, default_value_t = 38.0)]
    oxygen: f64,

    /// Log a progress line every this many simulated minutes.
    #[arg(long, default_value_t = 60.0)]
    log_every: f64,

    /// Write the retained tick history as JSON when the run ends.
    #[arg(long)]
    history_out: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CycleChoice {
    AdvancedKi67,
    BasicKi67,
    FlowCytometry,
    FlowCytometrySeparated,
    Live,
    CyclingQuiescent,
}

impl CycleChoice {
    fn model(self, models: &StandardModels) -> Arc<CycleModel> {
        let model = match self {
            Self::AdvancedKi67 => &models.advanced_ki67,
            Self::BasicKi67 => &models.basic_ki67,
            Self::FlowCytometry => &models.flow_cytometry,
            Self::FlowCytometrySeparated => &models.flow_cytometry_separated,
            Self::Live => &models.live,
            Self::CyclingQuiescent => &models.cycling_quiescent,
        };
        Arc::clone(model)
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let mut sim = bootstrap(&cli, config)?;
    run(&mut sim, &cli);
    if let Some(path) = &cli.history_out {
        write_history(&sim, path)?;
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(cli: &Cli) -> Result<SimConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<SimConfig>(&raw)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if cli.seed.is_some() {
        config.rng_seed = cli.seed;
    }
    config.validate().context("invalid simulation config")?;
    Ok(config)
}

fn bootstrap(cli: &Cli, config: SimConfig) -> Result<Simulation> {
    if !(cli.radius.is_finite() && cli.radius > 0.0) {
        bail!("--radius must be positive, got {}", cli.radius);
    }
    let environment = UniformEnvironment::new().with_substrate("oxygen", cli.oxygen);
    let mut sim = Simulation::new(config, Arc::new(environment))?;

    let mut definition = sim.models().default_definition("tumor");
    definition.phenotype.cycle = CycleState::new(cli.cycle.model(sim.models()));
    let tumor = sim.register_definition(definition);

    let mut rng = SmallRng::seed_from_u64(sim.seed());
    let mut placed = 0;
    while placed < cli.cells {
        let candidate = DVec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        if candidate.length_squared() > 1.0 {
            continue;
        }
        sim.spawn_cell(tumor, candidate * cli.radius)?;
        placed += 1;
    }

    info!(
        seed = sim.seed(),
        cells = sim.population(),
        cycle = ?cli.cycle,
        oxygen = cli.oxygen,
        "Seeded spheroid"
    );
    Ok(sim)
}

fn run(sim: &mut Simulation, cli: &Cli) {
    let mut next_log = cli.log_every;
    let mut last: Option<TickSummary> = None;
    while sim.time() < cli.minutes {
        let summary = sim.step();
        if summary.time >= next_log {
            info!(
                tick = summary.tick.0,
                minutes = summary.time,
                population = summary.population,
                divisions = sim.num_divisions_in_current_step(),
                deaths = sim.num_deaths_in_current_step(),
                out_of_domain = summary.out_of_domain,
                "Progress"
            );
            sim.reset_step_counters();
            next_log += cli.log_every;
        }
        last = Some(summary);
    }

    match last {
        Some(summary) => info!(
            tick = summary.tick.0,
            minutes = summary.time,
            population = summary.population,
            "Run complete"
        ),
        None => warn!("Run ended before the first tick"),
    }
}

fn write_history(sim: &Simulation, path: &Path) -> Result<()> {
    let history: Vec<&TickSummary> = sim.history().collect();
    let json = serde_json::to_string_pretty(&history).context("failed to encode history")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), entries = history.len(), "Wrote tick history");
    Ok(())
}
