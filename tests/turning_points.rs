use tellus_core::turning::{TurningConfig, TurningPointManager};
use tellus_data::{InterventionKind, TurningTrigger};
use tellus_lib::runner::{RunnerState, Speed};
use tellus_lib::{SimulationConfig, SimulationRunner};
use uuid::Uuid;

fn config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.log_dir = "logs_test_turning".to_string();
    config.geology.face_resolution = 8;
    config.geology.flat_width = 32;
    config.geology.flat_height = 16;
    config
}

#[test]
fn test_era_milestone_scenario() {
    let mut manager = TurningPointManager::new(
        Uuid::new_v4(),
        TurningConfig {
            interval_years: 100_000,
            ..TurningConfig::default()
        },
    );

    let tp = manager
        .check_for_turning_point(100_000, 50, 0, &[], "")
        .expect("interval turning point expected");
    assert_eq!(tp.trigger, TurningTrigger::Interval);
    assert_eq!(tp.title, "Era Milestone");
    assert!(manager.is_paused());

    // A second check in the same year is swallowed by the pending slot.
    assert!(manager
        .check_for_turning_point(100_000, 50, 0, &[], "")
        .is_none());
}

#[test]
fn test_runner_fires_interval_turning_point_with_energy() {
    let runner = SimulationRunner::new(config(), None);
    runner.initialize_population_simulator(9);
    runner.set_speed(Speed::Turbo);

    // March to the first era boundary.
    while runner.pending_turning_point().is_none() {
        runner.step(1).expect("step failed");
        assert!(
            runner.get_current_year() <= 1_100_000,
            "no turning point by year 1.1M"
        );
    }
    let tp = runner.pending_turning_point().expect("pending");
    assert_eq!(tp.trigger, TurningTrigger::Interval);
    assert_eq!(tp.year, 1_000_000);

    // A million years accrues one energy unit per ten millennia.
    let energy_before = runner.divine_energy();
    assert!(energy_before >= 100);

    // Resolution spends energy atomically and clears the pending slot.
    let pick = tp
        .interventions
        .iter()
        .find(|i| i.cost > 0)
        .expect("a costed intervention is offered at era milestones")
        .clone();
    let resolved = runner
        .resolve_turning_point(tp.id, pick.id)
        .expect("resolve failed");
    assert_eq!(resolved.id, pick.id);
    assert_eq!(runner.divine_energy(), energy_before - u64::from(pick.cost));
    assert!(runner.pending_turning_point().is_none());
}

#[test]
fn test_intervention_effects_become_active() {
    let runner = SimulationRunner::new(config(), None);
    runner.initialize_population_simulator(10);
    runner.set_speed(Speed::Turbo);
    while runner.pending_turning_point().is_none() {
        runner.step(1).expect("step failed");
    }
    let tp = runner.pending_turning_point().expect("pending");
    let surge = tp
        .interventions
        .iter()
        .find(|i| i.kind == InterventionKind::Accelerate)
        .expect("era milestones offer all templates")
        .clone();
    runner
        .resolve_turning_point(tp.id, surge.id)
        .expect("resolve failed");

    let recent = runner.get_recent_events(4);
    assert!(recent
        .iter()
        .any(|e| e.event_type == tellus_data::EventType::Intervention));
}

#[test]
fn test_manual_trigger_and_insufficient_energy() {
    let mut cfg = config();
    cfg.turning.starting_energy = 0;
    cfg.turning.energy_per_interval = i64::MAX;
    let runner = SimulationRunner::new(cfg, None);
    runner.initialize_population_simulator(11);

    let tp = runner
        .trigger_turning_point("The Question", "an operator wonders")
        .expect("manual trigger");
    assert_eq!(tp.trigger, TurningTrigger::PlayerRequest);
    assert_eq!(tp.title, "The Question");

    // Duplicate manual triggers while pending are ignored.
    assert!(runner.trigger_turning_point("Again", "no").is_none());

    let costed = tp
        .interventions
        .iter()
        .find(|i| i.cost > 0)
        .expect("costed option");
    assert!(matches!(
        runner.resolve_turning_point(tp.id, costed.id),
        Err(tellus_lib::RunnerError::InsufficientEnergy)
    ));

    // Observe always works, even flat broke.
    let observe = tp
        .interventions
        .iter()
        .find(|i| i.cost == 0)
        .expect("observe option");
    runner
        .resolve_turning_point(tp.id, observe.id)
        .expect("observe must resolve");
    assert!(runner.pending_turning_point().is_none());
}

#[test]
fn test_pause_on_turning_pauses_running_world() {
    let mut cfg = config();
    cfg.runner.tick_interval_ms = 2;
    cfg.turning.interval_years = 100_000;
    let runner = SimulationRunner::new(cfg, None);
    runner.initialize_population_simulator(12);
    runner.set_speed(Speed::Turbo);
    runner.start(0).expect("start failed");

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while runner.pending_turning_point().is_none() {
        assert!(
            std::time::Instant::now() < deadline,
            "turning point never fired"
        );
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    // The scheduler paused itself on the turning point.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while runner.get_state() != RunnerState::Paused {
        assert!(std::time::Instant::now() < deadline, "runner did not pause");
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    let year_at_pause = runner.get_current_year();
    std::thread::sleep(std::time::Duration::from_millis(30));
    assert_eq!(
        runner.get_current_year(),
        year_at_pause,
        "paused world must not advance"
    );

    // Resolving reactivates the scheduler.
    let tp = runner.pending_turning_point().expect("pending");
    let observe = tp.interventions.iter().find(|i| i.cost == 0).unwrap();
    runner
        .resolve_turning_point(tp.id, observe.id)
        .expect("resolve failed");
    assert_eq!(runner.get_state(), RunnerState::Running);
    runner.stop().expect("stop failed");
}
