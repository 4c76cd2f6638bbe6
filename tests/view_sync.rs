use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tellus_lib::runner::Speed;
use tellus_lib::{PlayerViewSync, SimulationConfig, SimulationRunner};

fn runner() -> SimulationRunner {
    let mut config = SimulationConfig::default();
    config.log_dir = "logs_test_view".to_string();
    config.runner.snapshot_interval = 100;
    config.geology.face_resolution = 8;
    config.geology.flat_width = 32;
    config.geology.flat_height = 16;
    let runner = SimulationRunner::new(config, None);
    runner.initialize_population_simulator(21);
    runner
}

#[test]
fn test_view_reflects_runner_and_interpolates() {
    let runner = runner();
    runner.set_speed(Speed::Turbo);
    runner.step(2).expect("step failed");

    let view = PlayerViewSync::with_interval(runner.clone(), Duration::from_millis(50));
    view.force_update();
    let state = view.get_current_state();
    assert_eq!(state.year, 2_000);
    assert_eq!(state.speed, Speed::Turbo);
    assert!(state.display_year <= state.year as f64);
    assert!(state.species_count >= 1);

    // After a full interval the display year reaches the observed year.
    std::thread::sleep(Duration::from_millis(60));
    let settled = view.get_current_state();
    assert!((settled.display_year - 2_000.0).abs() < f64::EPSILON);
}

#[test]
fn test_view_handler_receives_updates() {
    let runner = runner();
    let view = PlayerViewSync::with_interval(runner.clone(), Duration::from_millis(10));
    let updates = Arc::new(AtomicUsize::new(0));
    let sink = updates.clone();
    view.set_handler(Arc::new(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    }));
    view.start();
    std::thread::sleep(Duration::from_millis(100));
    view.stop();
    assert!(updates.load(Ordering::SeqCst) >= 3);
}

#[test]
fn test_seek_requires_snapshot_coverage() {
    let runner = runner();
    runner.set_speed(Speed::Turbo);

    let view = PlayerViewSync::new(runner.clone());
    // No snapshots yet: seeking fails and there is no year range.
    assert!(!view.seek_to_year(50));
    assert!(view.get_available_year_range().is_none());

    runner.step(3).expect("step failed");
    assert!(runner.get_snapshots().len() > 1);

    let (first, last) = view.get_available_year_range().expect("range");
    assert!(first <= last);
    assert!(view.seek_to_year(first + 150));
    let state = view.get_current_state();
    assert!(state.display_year <= (first + 150) as f64);

    // Seeking before the first snapshot fails.
    assert!(!view.seek_to_year(first - 1));
}
