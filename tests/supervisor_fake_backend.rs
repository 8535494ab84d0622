// tests/supervisor_fake_backend.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::time::Duration;

use tokio::time::Instant;

use roomboot::supervisor::{
    ShutdownReason, Supervisor, SupervisorOptions, SupervisorReport, EXIT_UNITS_ABANDONED,
};
use roomboot::types::{ControlSignal, StopSignal};
use roomboot::unit::{ProcessSpec, UnitState};
use roomboot_test_utils::builders::ProcessSpecBuilder;
use roomboot_test_utils::fake_backend::{Behaviour, FakeBackend, FakeLog};
use roomboot_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn fast_options() -> SupervisorOptions {
    SupervisorOptions {
        grace_period: Duration::from_millis(150),
        kill_grace_period: Duration::from_millis(150),
    }
}

fn chain(names: &[&str]) -> Vec<ProcessSpec> {
    names
        .iter()
        .map(|name| ProcessSpecBuilder::new(name, &format!("/opt/{name}")).build())
        .collect()
}

/// Run the supervisor on its own task and return the log plus the join handle.
fn spawn_supervisor(
    backend: FakeBackend,
    options: SupervisorOptions,
    specs: Vec<ProcessSpec>,
) -> (
    FakeLog,
    roomboot::supervisor::ShutdownHandle,
    tokio::task::JoinHandle<SupervisorReport>,
) {
    let log = backend.log();
    let supervisor = Supervisor::new(backend, options).with_base_environment(BTreeMap::new());
    let handle = supervisor.shutdown_handle();
    let join = tokio::spawn(supervisor.run(specs));
    (log, handle, join)
}

#[tokio::test]
async fn units_start_in_order_and_stop_in_reverse() -> TestResult {
    init_tracing();

    let (log, handle, join) =
        spawn_supervisor(FakeBackend::new(), fast_options(), chain(&["A", "B", "C"]));

    with_timeout(log.wait_for_launch("C")).await;
    handle.request_shutdown();
    let report = with_timeout(join).await?;

    assert_eq!(log.launched(), vec!["A", "B", "C"]);
    assert_eq!(report.reason, ShutdownReason::Requested);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.stop_order, vec!["C", "B", "A"]);
    assert_eq!(log.first_signal_order(), vec!["C", "B", "A"]);
    assert!(report.not_started.is_empty());
    assert!(report.escalated.is_empty());

    for name in ["A", "B", "C"] {
        assert_eq!(report.unit_state(name), Some(&UnitState::Exited(128 + 15)));
    }
    Ok(())
}

#[tokio::test]
async fn launch_failure_stops_started_units_and_skips_the_rest() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_behaviour("B", Behaviour::FailsToLaunch);
    let (log, _handle, join) = spawn_supervisor(backend, fast_options(), chain(&["A", "B", "C"]));

    let report = with_timeout(join).await?;

    match &report.reason {
        ShutdownReason::LaunchFailed { unit, error } => {
            assert_eq!(unit, "B");
            assert!(error.contains("no such program"), "error was: {error}");
        }
        other => panic!("Expected LaunchFailed, got: {:?}", other),
    }
    assert_eq!(report.exit_code(), 2);
    assert_eq!(log.launched(), vec!["A"]);
    assert_eq!(report.stop_order, vec!["A"]);
    assert_eq!(report.not_started, vec!["C"]);
    assert!(matches!(report.unit_state("B"), Some(UnitState::Failed(_))));
    assert_eq!(report.unit_state("C"), None);
    Ok(())
}

#[tokio::test]
async fn unexpected_exit_stops_the_others_in_reverse_order() -> TestResult {
    init_tracing();

    let names = ["display", "browser", "streamer", "relay", "app"];
    let (log, _handle, join) = spawn_supervisor(FakeBackend::new(), fast_options(), chain(&names));

    with_timeout(log.wait_for_launch("app")).await;
    log.exit_unit("relay", 1);
    let report = with_timeout(join).await?;

    assert_eq!(
        report.reason,
        ShutdownReason::UnexpectedExit {
            unit: "relay".to_string(),
            code: 1
        }
    );
    assert_eq!(report.exit_code(), 3);
    assert_eq!(report.stop_order, vec!["app", "streamer", "browser", "display"]);
    assert!(log.signals_for("relay").is_empty());
    assert_eq!(report.unit_state("relay"), Some(&UnitState::Exited(1)));
    Ok(())
}

#[tokio::test]
async fn a_clean_exit_of_a_unit_still_shuts_the_group_down() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_behaviour(
        "oneshot",
        Behaviour::ExitsAfter {
            after: Duration::from_millis(50),
            code: 0,
        },
    );
    let (_log, _handle, join) =
        spawn_supervisor(backend, fast_options(), chain(&["server", "oneshot"]));

    let report = with_timeout(join).await?;

    assert_eq!(
        report.reason,
        ShutdownReason::UnexpectedExit {
            unit: "oneshot".to_string(),
            code: 0
        }
    );
    assert_eq!(report.exit_code(), 3);
    assert_eq!(report.stop_order, vec!["server"]);
    Ok(())
}

#[tokio::test]
async fn interrupt_during_start_delay_skips_remaining_units() -> TestResult {
    init_tracing();

    let mut specs = chain(&["display", "browser", "streamer", "relay", "app"]);
    specs[0].start_delay = Duration::from_millis(2000);

    let started = Instant::now();
    let (log, handle, join) = spawn_supervisor(FakeBackend::new(), fast_options(), specs);

    with_timeout(log.wait_for_launch("display")).await;
    handle.deliver_signal(ControlSignal::Interrupt);
    let report = with_timeout(join).await?;

    assert!(
        started.elapsed() < Duration::from_millis(1500),
        "delay was not cancelled: {:?}",
        started.elapsed()
    );
    assert_eq!(report.reason, ShutdownReason::Signal(ControlSignal::Interrupt));
    assert_eq!(report.exit_code(), 0);
    assert_eq!(log.launched(), vec!["display"]);
    assert_eq!(report.stop_order, vec!["display"]);
    assert_eq!(
        report.not_started,
        vec!["browser", "streamer", "relay", "app"]
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_triggers_shut_down_once() -> TestResult {
    init_tracing();

    let (log, handle, join) =
        spawn_supervisor(FakeBackend::new(), fast_options(), chain(&["A", "B", "C"]));

    with_timeout(log.wait_for_launch("C")).await;
    handle.request_shutdown();
    handle.deliver_signal(ControlSignal::Terminate);
    handle.deliver_signal(ControlSignal::Interrupt);
    log.exit_unit("B", 4);
    let report = with_timeout(join).await?;

    assert_eq!(report.reason, ShutdownReason::Requested);
    assert_eq!(report.exit_code(), 0);

    // Every unit gets at most one stop signal, whichever triggers raced.
    for name in ["A", "B", "C"] {
        assert!(log.signals_for(name).len() <= 1, "{name} signalled twice");
    }
    assert_eq!(log.signals_for("A"), vec![StopSignal::Terminate]);
    assert_eq!(log.signals_for("C"), vec![StopSignal::Terminate]);
    Ok(())
}

#[tokio::test]
async fn stubborn_unit_is_killed_once_after_grace_period() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_behaviour("stubborn", Behaviour::IgnoresGraceful);
    let options = fast_options();
    let (log, handle, join) = spawn_supervisor(backend, options, chain(&["polite", "stubborn"]));

    with_timeout(log.wait_for_launch("stubborn")).await;
    let shutdown_started = Instant::now();
    handle.request_shutdown();
    let report = with_timeout(join).await?;
    let elapsed = shutdown_started.elapsed();

    assert_eq!(
        log.signals_for("stubborn"),
        vec![StopSignal::Terminate, StopSignal::Kill]
    );
    assert_eq!(log.signals_for("polite"), vec![StopSignal::Terminate]);
    assert_eq!(report.escalated, vec!["stubborn"]);
    assert!(report.abandoned.is_empty());
    assert_eq!(report.unit_state("stubborn"), Some(&UnitState::Exited(128 + 9)));

    assert!(elapsed >= options.grace_period);
    assert!(elapsed < options.grace_period + options.kill_grace_period + Duration::from_secs(1));
    Ok(())
}

#[tokio::test]
async fn unkillable_unit_is_abandoned_within_the_bound() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_behaviour("zombie", Behaviour::Unkillable);
    let options = fast_options();
    let (log, handle, join) = spawn_supervisor(backend, options, chain(&["zombie", "other"]));

    with_timeout(log.wait_for_launch("other")).await;
    let shutdown_started = Instant::now();
    handle.deliver_signal(ControlSignal::Terminate);
    let report = with_timeout(join).await?;

    assert!(
        shutdown_started.elapsed()
            < options.grace_period + options.kill_grace_period + Duration::from_secs(1)
    );
    assert_eq!(report.escalated, vec!["zombie"]);
    assert_eq!(report.abandoned, vec!["zombie"]);
    assert_eq!(report.stop_order, vec!["other", "zombie"]);
    assert_eq!(report.unit_state("zombie"), Some(&UnitState::Stopping));

    // The trigger was a plain SIGTERM, but a unit outlived the kill.
    assert_eq!(report.reason, ShutdownReason::Signal(ControlSignal::Terminate));
    assert_eq!(report.exit_code(), EXIT_UNITS_ABANDONED);
    Ok(())
}

#[tokio::test]
async fn stop_signal_comes_from_the_spec() -> TestResult {
    init_tracing();

    let specs = vec![
        ProcessSpecBuilder::new("relay", "kbm")
            .stop_signal(StopSignal::Kill)
            .build(),
        ProcessSpecBuilder::new("app", "rotcore")
            .stop_signal(StopSignal::Interrupt)
            .build(),
    ];
    let (log, handle, join) = spawn_supervisor(FakeBackend::new(), fast_options(), specs);

    with_timeout(log.wait_for_launch("app")).await;
    handle.request_shutdown();
    let report = with_timeout(join).await?;

    assert_eq!(log.signals_for("relay"), vec![StopSignal::Kill]);
    assert_eq!(log.signals_for("app"), vec![StopSignal::Interrupt]);
    assert_eq!(report.unit_state("relay"), Some(&UnitState::Exited(128 + 9)));
    assert_eq!(report.unit_state("app"), Some(&UnitState::Exited(128 + 2)));
    Ok(())
}

#[tokio::test]
async fn unit_environment_overlays_the_base_environment() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new();
    let log = backend.log();
    let base: BTreeMap<String, String> = [("PATH", "/usr/bin"), ("DISPLAY", ":0")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let supervisor = Supervisor::new(backend, fast_options()).with_base_environment(base);
    let handle = supervisor.shutdown_handle();
    let specs = vec![
        ProcessSpecBuilder::new("browser", "chromium")
            .env("DISPLAY", ":10")
            .build(),
    ];
    let join = tokio::spawn(supervisor.run(specs));

    with_timeout(log.wait_for_launch("browser")).await;
    handle.request_shutdown();
    with_timeout(join).await?;

    let requests = log.requests();
    assert_eq!(requests.len(), 1);
    let env = &requests[0].env;
    assert_eq!(env.get("DISPLAY").map(String::as_str), Some(":10"));
    assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin"));
    assert_eq!(env.len(), 2);
    Ok(())
}

#[tokio::test]
async fn shutdown_requested_before_run_starts_nothing() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new();
    let log = backend.log();
    let supervisor = Supervisor::new(backend, fast_options());
    supervisor.shutdown_handle().request_shutdown();

    let report = with_timeout(supervisor.run(chain(&["A", "B"]))).await;

    assert_eq!(report.reason, ShutdownReason::Requested);
    assert!(log.launched().is_empty());
    assert!(report.units.is_empty());
    assert_eq!(report.not_started, vec!["A", "B"]);
    Ok(())
}

#[tokio::test]
async fn unbounded_grace_periods_do_not_overflow_the_deadline() -> TestResult {
    init_tracing();

    let options = SupervisorOptions {
        grace_period: Duration::from_secs(u64::MAX),
        kill_grace_period: Duration::MAX,
    };
    let (log, handle, join) = spawn_supervisor(FakeBackend::new(), options, chain(&["A", "B"]));

    with_timeout(log.wait_for_launch("B")).await;
    handle.request_shutdown();
    let report = with_timeout(join).await?;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.stop_order, vec!["B", "A"]);
    assert!(report.escalated.is_empty());
    Ok(())
}
