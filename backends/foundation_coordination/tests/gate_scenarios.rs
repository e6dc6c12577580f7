//! Multi-threaded scenarios for the exclusion gate.

use foundation_coordination::simulations::{crossing, CrossingConfig};
use foundation_coordination::{
    ActorId, ActorRole, CancellationToken, CoordinationError, EventKind, EventLog, ExclusionGate,
    GateMode,
};
use foundation_testing::{
    first_overlap, peak_overlap, ConcurrencyProbe, Outcome, Span, StressConfig, StressHarness,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn spans(log: &EventLog, role: ActorRole) -> Vec<Span> {
    log.intervals_for(role)
        .iter()
        .map(|interval| Span::new(interval.start, interval.end))
        .collect()
}

fn sequence_of(log: &EventLog, actor: ActorId, kind: EventKind) -> u64 {
    log.events()
        .iter()
        .find(|recorded| recorded.event.actor == actor && recorded.event.kind == kind)
        .map(|recorded| recorded.sequence)
        .unwrap_or_else(|| panic!("no {kind:?} recorded for {actor}"))
}

/// WHY: cars and trains never share the crossing and trains go one at a
/// time, over a full scaled-down run.
/// WHAT: run the crossing simulation and check the recorded intervals.
#[test]
#[ntest::timeout(20000)]
fn test_crossing_run_keeps_classes_apart() {
    let config = CrossingConfig {
        cars: 20,
        trains: 3,
        car_interval_ms: 10,
        train_interval_ms: 60,
        car_crossing_ms: 15,
        train_crossing_ms: 40,
    };
    let log = Arc::new(EventLog::new());

    let report = crossing::run(&config, log.clone(), &CancellationToken::new())
        .expect("crossing should run");

    assert_eq!(report.cars_crossed, 20);
    assert_eq!(report.trains_crossed, 3);
    assert_eq!(report.cancelled, 0);

    let cars = spans(&log, ActorRole::Car);
    let trains = spans(&log, ActorRole::Train);
    assert_eq!(cars.len(), 20);
    assert_eq!(trains.len(), 3);
    assert_eq!(first_overlap(&cars, &trains), None);
    assert_eq!(peak_overlap(&trains), 1);
}

/// WHY: once a train is waiting, no new car may get onto the crossing
/// until that train has left.
/// WHAT: hold a car on the crossing, queue a train, then send another car.
#[test]
#[ntest::timeout(10000)]
fn test_waiting_train_blocks_new_cars() {
    let log = Arc::new(EventLog::new());
    let gate = ExclusionGate::with_observer(log.clone());

    let first_car = gate.car_enter(ActorId::car(1)).expect("crossing is idle");

    let train = {
        let gate = gate.clone();
        thread::spawn(move || -> Result<(), CoordinationError> {
            let pass = gate.train_enter(ActorId::train(1))?;
            thread::sleep(Duration::from_millis(30));
            pass.exit()
        })
    };
    while gate.trains_waiting() == 0 {
        thread::yield_now();
    }

    let second_car = {
        let gate = gate.clone();
        thread::spawn(move || gate.car_enter(ActorId::car(2)).and_then(|pass| pass.exit()))
    };
    while log.count(EventKind::Arrived, Some(ActorRole::Car)) < 2 {
        thread::yield_now();
    }

    assert_eq!(gate.mode(), GateMode::CarsCrossing);
    assert_eq!(gate.cars_crossing(), 1);
    first_car.exit().expect("car should exit");

    assert_eq!(train.join().expect("train should join"), Ok(()));
    assert_eq!(second_car.join().expect("car should join"), Ok(()));

    let train_left = sequence_of(&log, ActorId::train(1), EventKind::Departed);
    let second_admitted = sequence_of(&log, ActorId::car(2), EventKind::Admitted);
    assert!(second_admitted > train_left);
    assert_eq!(gate.mode(), GateMode::Idle);
}

/// WHY: a train cancelled while queued must not hold up later trains or
/// the cars behind them.
/// WHAT: cancel the first of two trains queued behind a crossing one.
#[test]
#[ntest::timeout(10000)]
fn test_cancelled_queued_train_is_skipped() {
    let log = Arc::new(EventLog::new());
    let gate = ExclusionGate::with_observer(log.clone());
    let holder = gate.train_enter(ActorId::train(1)).expect("crossing is idle");

    let token = CancellationToken::new();
    let second = {
        let gate = gate.clone();
        let token = token.clone();
        thread::spawn(move || gate.train_enter_with(ActorId::train(2), &token).map(|pass| pass.exit()))
    };
    while gate.trains_waiting() < 1 {
        thread::yield_now();
    }
    let third = {
        let gate = gate.clone();
        thread::spawn(move || gate.train_enter(ActorId::train(3)).and_then(|pass| pass.exit()))
    };
    while gate.trains_waiting() < 2 {
        thread::yield_now();
    }

    token.cancel();
    assert!(matches!(
        second.join().expect("train should join"),
        Err(CoordinationError::Cancelled)
    ));
    assert_eq!(gate.trains_waiting(), 1);

    holder.exit().expect("train should exit");
    assert_eq!(third.join().expect("train should join"), Ok(()));

    assert_eq!(gate.trains_waiting(), 0);
    assert_eq!(gate.mode(), GateMode::Idle);
    gate.car_enter(ActorId::car(1))
        .and_then(|pass| pass.exit())
        .expect("cars should flow again");
    assert_eq!(log.intervals_for(ActorRole::Train).len(), 2);
}

#[test]
#[ntest::timeout(30000)]
fn test_mixed_traffic_never_shares_the_crossing() {
    let gate = ExclusionGate::new();
    let probe = ConcurrencyProbe::new()
        .limit("train", 1)
        .exclusive("car", "train");

    let harness = StressHarness::new(StressConfig::new().actors(10).rounds(30));
    let worker_gate = gate.clone();
    let worker_probe = probe.clone();
    let result = harness.run(move |actor, round| {
        // Every fourth actor is a train.
        let outcome = if actor % 4 == 0 {
            worker_gate.train_enter(ActorId::train(actor)).and_then(|pass| {
                {
                    let _inside = worker_probe.enter("train");
                    thread::yield_now();
                }
                pass.exit()
            })
        } else {
            worker_gate.car_enter(ActorId::car(actor)).and_then(|pass| {
                {
                    let _inside = worker_probe.enter("car");
                    if round % 5 == 0 {
                        thread::sleep(Duration::from_micros(200));
                    }
                }
                pass.exit()
            })
        };
        match outcome {
            Ok(()) => Outcome::Completed,
            Err(err) => Outcome::Failed(format!("actor {actor} round {round}: {err}")),
        }
    });

    assert!(result.is_clean(), "{:?}", result.first_failure);
    assert_eq!(result.completed, 10 * 30);
    assert!(probe.violations().is_empty(), "{:?}", probe.violations());
    assert_eq!(probe.peak("train"), 1);
    assert_eq!(gate.mode(), GateMode::Idle);
    assert_eq!(gate.trains_waiting(), 0);
}
