//! Long-haul end-to-end run: geology, climate, biology, events, and the
//! divine-energy economy advancing together across two eras.

use tellus_core::geology::heightmap::{MAX_ELEV, MIN_ELEV};
use tellus_lib::runner::Speed;
use tellus_lib::{SimulationConfig, SimulationRunner};

#[test]
fn test_two_eras_end_to_end() {
    let mut config = SimulationConfig::default();
    config.seed = 999;
    config.log_dir = "logs_test_world_evolution".to_string();
    config.geology.face_resolution = 8;
    config.geology.flat_width = 32;
    config.geology.flat_height = 16;
    let runner = SimulationRunner::new(config, None);
    runner.initialize_population_simulator(999);
    runner.set_speed(Speed::Turbo);

    {
        let geology = runner.geology();
        geology.lock().expect("geology lock").initialize();
    }

    let mut last_year = 0;
    while runner.get_current_year() < 2_000_000 {
        runner.step(1).expect("step failed");
        let year = runner.get_current_year();
        assert!(year > last_year, "year must strictly increase while stepping");
        last_year = year;

        if let Some(tp) = runner.pending_turning_point() {
            let observe = tp
                .interventions
                .iter()
                .find(|i| i.cost == 0)
                .expect("observe always offered");
            runner
                .resolve_turning_point(tp.id, observe.id)
                .expect("resolve failed");
        }
    }

    let stats = runner.get_stats();
    assert!(stats.species_count >= 1, "life persists");
    assert!(stats.events_emitted > 0, "events flowed");
    assert!(stats.divine_energy > 0, "energy accrued");
    assert!(stats.snapshot_count > 0, "snapshots recorded");

    // Elevation bounds hold after deep-time geology.
    let geology = runner.geology();
    let geo_stats = geology.lock().expect("geology lock").get_stats();
    assert!(geo_stats.initialized);
    assert!(geo_stats.max_elevation <= MAX_ELEV);
    assert!(geo_stats.min_elevation >= MIN_ELEV);
    assert!(geo_stats.tectonic_steps > 0, "tectonics ran");

    let snapshots = runner.get_snapshots();
    for pair in snapshots.windows(2) {
        assert!(pair[0].year < pair[1].year);
    }
}
