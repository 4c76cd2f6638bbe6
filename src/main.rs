use anyhow::Result;
use clap::Parser;
use tellus_io::SimulationStore;
use tellus_lib::runner::Speed;
use tellus_lib::{SimulationConfig, SimulationRunner};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tellus", about = "Deep-time planetary ecosystem simulation")]
struct Args {
    /// World seed.
    #[arg(long, default_value_t = 12_345)]
    seed: u64,

    /// Simulated years to advance before reporting.
    #[arg(long, default_value_t = 10_000_000)]
    years: i64,

    /// Years per scheduler tick: 1, 10, 100, or 1000.
    #[arg(long, default_value_t = 1_000)]
    speed: i64,

    /// SQLite database path; omit to run without persistence.
    #[arg(long)]
    db: Option<String>,

    /// Directory for the event log and dead-letter files.
    #[arg(long, default_value = "logs")]
    log_dir: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = SimulationConfig::load();
    config.seed = args.seed;
    config.log_dir = args.log_dir;

    let store = match &args.db {
        Some(path) => Some(SimulationStore::new(path)?),
        None => None,
    };

    let runner = SimulationRunner::new(config, store.as_ref().map(SimulationStore::handle));
    runner.initialize_population_simulator(args.seed);
    runner.set_speed(Speed::from_years(args.speed));

    // Headless run: drive the tick path directly instead of waiting on
    // the wall-clock scheduler.
    let years_per_tick = runner.get_speed().years_per_tick().max(1);
    let ticks = (args.years / years_per_tick).max(1) as usize;
    info!(seed = args.seed, years = args.years, ticks, "advancing world");

    let report_every = (ticks / 10).max(1);
    for i in 0..ticks {
        runner.step(1)?;
        if (i + 1) % report_every == 0 {
            let stats = runner.get_stats();
            info!(
                year = stats.current_year,
                species = stats.species_count,
                population = stats.population_sum,
                energy = stats.divine_energy,
                "progress"
            );
        }
        if let Some(tp) = runner.pending_turning_point() {
            // Headless worlds observe every turning point.
            let observe = tp
                .interventions
                .iter()
                .find(|i| i.cost == 0)
                .expect("observe is always offered");
            runner.resolve_turning_point(tp.id, observe.id)?;
        }
    }

    let stats = runner.get_stats();
    let geology = runner.geology();
    let geo_stats = geology.lock().expect("geology poisoned").get_stats();
    info!(
        year = stats.current_year,
        species = stats.species_count,
        population = stats.population_sum,
        events = stats.events_emitted,
        max_elevation = geo_stats.max_elevation,
        sea_level = geo_stats.sea_level,
        land_fraction = geo_stats.land_fraction,
        "simulation complete"
    );

    if store.is_some() {
        runner.persist_state()?;
        info!("world persisted");
    }
    if let Some(store) = store {
        store.stop();
    }
    Ok(())
}
