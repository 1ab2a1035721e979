mod support;

use core::time::Duration;

use bringup_core::journal::BootEventKind;
use bringup_core::orchestrator::{BootPhase, RetreatReason};
use bringup_core::supervisor::TickOutcome;
use embassy_futures::block_on;

use support::{Bench, Effect, Script, boot, elapsed};

#[test]
fn healthy_ticks_wait_one_interval_each() {
    let bench = Bench::new(Script::default());
    let (report, orchestrator) = boot(&bench);
    assert!(report.is_running());
    let booted_at = elapsed(&bench);

    let mut supervisor = orchestrator
        .into_supervisor()
        .unwrap_or_else(|_| panic!("running boot should hand over"));
    for _ in 0..3 {
        assert_eq!(block_on(supervisor.tick()), TickOutcome::Healthy);
    }

    assert_eq!(supervisor.ticks(), 3);
    assert_eq!(elapsed(&bench) - booted_at, Duration::from_secs(180));
    assert_eq!(
        supervisor.journal().latest().map(|record| record.event),
        Some(BootEventKind::SupervisorTick(3))
    );
    assert!(bench.borrow().sleeps().is_empty());
}

#[test]
fn runtime_fault_takes_the_bring_up_retreat_path() {
    let bench = Bench::new(Script {
        runtime_fault_on_poll: Some(4),
        ..Script::default()
    });
    let (_, orchestrator) = boot(&bench);
    let mut supervisor = orchestrator
        .into_supervisor()
        .unwrap_or_else(|_| panic!("running boot should hand over"));

    let plan = block_on(supervisor.run());

    assert_eq!(supervisor.ticks(), 4);
    assert_eq!(plan.duration, Duration::from_secs(600));
    match plan.reason {
        RetreatReason::UnhandledFault(fault) => {
            assert_eq!(fault.phase, BootPhase::Running);
            assert_eq!(fault.message.as_str(), "upload task panicked");
        }
        other => panic!("unexpected reason {other:?}"),
    }

    let bench = bench.borrow();
    assert_eq!(bench.effects.last(), Some(&Effect::DeepSleep(Duration::from_secs(600))));
    assert_eq!(
        bench.log.last().map(String::as_str),
        Some("Retreat: unhandled fault: upload task panicked during running. Sleeping 600 s")
    );
}

#[test]
fn retreated_boot_has_no_supervisor() {
    let bench = Bench::new(Script {
        storage_ok: false,
        ..Script::default()
    });
    let (_, orchestrator) = boot(&bench);

    assert!(orchestrator.into_supervisor().is_err());
}
