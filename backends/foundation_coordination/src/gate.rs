//! Exclusion gate: a crossing shared by cars and trains.
//!
//! Cars may cross together; a train crosses alone. Trains have priority:
//! as soon as a train asks for the crossing no new car is admitted, cars
//! already on the crossing finish, and the train goes once the crossing is
//! clear. Trains are served in the order they asked. A steady stream of
//! trains can therefore hold cars back indefinitely.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::errors::{CoordinationError, CoordinationResult};
use crate::events::{ActorId, CoordinationEvent, EventKind, EventObserver, NoopObserver};
use crate::monitor::Monitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    Idle,
    CarsCrossing,
    TrainCrossing,
}

#[derive(Debug)]
struct GateState {
    mode: GateMode,
    cars_crossing: usize,
    train_crossing: Option<ActorId>,

    /// Tickets of trains that asked for the crossing, oldest first.
    train_queue: VecDeque<u64>,
    next_ticket: u64,
}

impl GateState {
    fn settle_mode(&mut self) {
        self.mode = if self.train_crossing.is_some() {
            GateMode::TrainCrossing
        } else if self.cars_crossing > 0 {
            GateMode::CarsCrossing
        } else {
            GateMode::Idle
        };
    }

    fn trains_pending(&self) -> bool {
        self.train_crossing.is_some() || !self.train_queue.is_empty()
    }

    fn verify(&self) -> CoordinationResult<()> {
        if self.train_crossing.is_some() && self.cars_crossing > 0 {
            return Err(CoordinationError::InvariantViolation(
                "train crossing while cars are on the crossing",
            ));
        }

        let consistent = match self.mode {
            GateMode::Idle => self.train_crossing.is_none() && self.cars_crossing == 0,
            GateMode::CarsCrossing => self.train_crossing.is_none() && self.cars_crossing > 0,
            GateMode::TrainCrossing => self.train_crossing.is_some() && self.cars_crossing == 0,
        };
        if !consistent {
            return Err(CoordinationError::InvariantViolation(
                "gate mode disagrees with crossing traffic",
            ));
        }
        Ok(())
    }
}

/// `ExclusionGate` arbitrates a single crossing between cars and trains.
///
/// Clones share the same crossing.
#[derive(Clone)]
pub struct ExclusionGate {
    monitor: Arc<Monitor<GateState>>,
    observer: Arc<dyn EventObserver>,
}

impl Default for ExclusionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ExclusionGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.monitor.lock();
        f.debug_struct("ExclusionGate")
            .field("mode", &state.mode)
            .field("cars_crossing", &state.cars_crossing)
            .field("train_crossing", &state.train_crossing)
            .field("trains_queued", &state.train_queue.len())
            .finish()
    }
}

impl ExclusionGate {
    #[must_use]
    pub fn new() -> Self {
        Self::with_observer(Arc::new(NoopObserver))
    }

    #[must_use]
    pub fn with_observer(observer: Arc<dyn EventObserver>) -> Self {
        Self {
            monitor: Arc::new(Monitor::new(GateState {
                mode: GateMode::Idle,
                cars_crossing: 0,
                train_crossing: None,
                train_queue: VecDeque::new(),
                next_ticket: 0,
            })),
            observer,
        }
    }

    #[must_use]
    pub fn mode(&self) -> GateMode {
        self.monitor.lock().mode
    }

    #[must_use]
    pub fn cars_crossing(&self) -> usize {
        self.monitor.lock().cars_crossing
    }

    /// Trains that asked for the crossing and have not been let in yet.
    #[must_use]
    pub fn trains_waiting(&self) -> usize {
        self.monitor.lock().train_queue.len()
    }

    #[must_use]
    pub fn train_crossing(&self) -> Option<ActorId> {
        self.monitor.lock().train_crossing
    }

    /// Blocks until `car` may cross and returns its pass.
    ///
    /// # Errors
    ///
    /// Only `InvariantViolation`, which indicates a bug.
    pub fn car_enter(&self, car: ActorId) -> CoordinationResult<CarPass> {
        self.admit_car(car, None)
    }

    /// Like [`Self::car_enter`] but abortable through `token`.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the token fires before the car is admitted; the gate
    /// is left untouched.
    pub fn car_enter_with(&self, car: ActorId, token: &CancellationToken) -> CoordinationResult<CarPass> {
        self.admit_car(car, Some(token))
    }

    /// Blocks until `train` holds the crossing alone and returns its pass.
    ///
    /// The request is registered immediately, so cars arriving from now on
    /// wait behind it.
    ///
    /// # Errors
    ///
    /// Only `InvariantViolation`, which indicates a bug.
    pub fn train_enter(&self, train: ActorId) -> CoordinationResult<TrainPass> {
        self.admit_train(train, None)
    }

    /// Like [`Self::train_enter`] but abortable through `token`.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the token fires before the train is admitted; the
    /// train's request is withdrawn.
    pub fn train_enter_with(
        &self,
        train: ActorId,
        token: &CancellationToken,
    ) -> CoordinationResult<TrainPass> {
        self.admit_train(train, Some(token))
    }

    /// Enters as a car, stays on the crossing for `duration`, then exits.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the token fires while waiting or crossing. A car that
    /// got onto the crossing always exits it.
    pub fn cross_as_car(
        &self,
        car: ActorId,
        duration: Duration,
        token: &CancellationToken,
    ) -> CoordinationResult<()> {
        let pass = self.car_enter_with(car, token)?;
        let crossing = token.sleep(duration);
        pass.exit()?;
        crossing
    }

    /// Enters as a train, holds the crossing for `duration`, then exits.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the token fires while waiting or crossing. A train
    /// that got onto the crossing always exits it.
    pub fn cross_as_train(
        &self,
        train: ActorId,
        duration: Duration,
        token: &CancellationToken,
    ) -> CoordinationResult<()> {
        let pass = self.train_enter_with(train, token)?;
        let crossing = token.sleep(duration);
        pass.exit()?;
        crossing
    }

    fn admit_car(&self, car: ActorId, token: Option<&CancellationToken>) -> CoordinationResult<CarPass> {
        let _registration = token.map(|token| token.register(self.monitor.clone()));

        let mut state = self.monitor.lock();
        if token.is_some_and(CancellationToken::is_cancelled) {
            self.emit(car, EventKind::Cancelled);
            return Err(CoordinationError::Cancelled);
        }
        self.emit(car, EventKind::Arrived);

        while state.trains_pending() {
            state = match self.monitor.wait(state, token, None) {
                Ok(state) => state,
                Err((_state, err)) => {
                    self.emit(car, EventKind::Cancelled);
                    return Err(err);
                }
            };
        }

        state.cars_crossing += 1;
        state.settle_mode();
        if let Err(err) = state.verify() {
            tracing::error!("{car} admission broke the gate: {err}");
            state.cars_crossing -= 1;
            state.settle_mode();
            return Err(err);
        }
        self.emit(car, EventKind::Admitted);

        Ok(CarPass {
            gate: self.clone(),
            car,
            exited: false,
        })
    }

    fn car_exit(&self, car: ActorId) -> CoordinationResult<()> {
        let mut state = self.monitor.lock();
        state.cars_crossing = state.cars_crossing.checked_sub(1).ok_or_else(|| {
            tracing::error!("{car} left a crossing with no cars on it");
            CoordinationError::InvariantViolation("car count underflow")
        })?;
        state.settle_mode();
        self.emit(car, EventKind::Departed);

        let cleared = state.cars_crossing == 0;
        drop(state);

        if cleared {
            self.monitor.notify_all();
        }
        Ok(())
    }

    fn admit_train(
        &self,
        train: ActorId,
        token: Option<&CancellationToken>,
    ) -> CoordinationResult<TrainPass> {
        let _registration = token.map(|token| token.register(self.monitor.clone()));

        let mut state = self.monitor.lock();
        if token.is_some_and(CancellationToken::is_cancelled) {
            self.emit(train, EventKind::Cancelled);
            return Err(CoordinationError::Cancelled);
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.train_queue.push_back(ticket);
        self.emit(train, EventKind::Arrived);

        while state.train_crossing.is_some()
            || state.cars_crossing > 0
            || state.train_queue.front() != Some(&ticket)
        {
            tracing::debug!(
                "{train} waiting: {} cars crossing, {} trains ahead",
                state.cars_crossing,
                state.train_queue.iter().take_while(|queued| **queued != ticket).count()
            );
            state = match self.monitor.wait(state, token, None) {
                Ok(state) => state,
                Err((mut state, err)) => {
                    state.train_queue.retain(|queued| *queued != ticket);
                    self.emit(train, EventKind::Cancelled);
                    drop(state);

                    // Cars or the next train may be free to go now.
                    self.monitor.notify_all();
                    return Err(err);
                }
            };
        }

        state.train_queue.pop_front();
        state.train_crossing = Some(train);
        state.settle_mode();
        if let Err(err) = state.verify() {
            tracing::error!("{train} admission broke the gate: {err}");
            state.train_crossing = None;
            state.settle_mode();
            drop(state);
            self.monitor.notify_all();
            return Err(err);
        }
        self.emit(train, EventKind::Admitted);

        Ok(TrainPass {
            gate: self.clone(),
            train,
            exited: false,
        })
    }

    fn train_exit(&self, train: ActorId) -> CoordinationResult<()> {
        let mut state = self.monitor.lock();
        if state.train_crossing != Some(train) {
            tracing::error!("{train} left a crossing it was not holding");
            return Err(CoordinationError::InvariantViolation(
                "train exit without matching entry",
            ));
        }
        state.train_crossing = None;
        state.settle_mode();
        self.emit(train, EventKind::Departed);
        drop(state);

        self.monitor.notify_all();
        Ok(())
    }

    fn emit(&self, actor: ActorId, kind: EventKind) {
        self.observer.observe(&CoordinationEvent::now(actor, kind));
    }
}

/// A car's admission onto the crossing. Exits on drop.
#[must_use = "the car leaves the crossing as soon as the pass is dropped"]
#[derive(Debug)]
pub struct CarPass {
    gate: ExclusionGate,
    car: ActorId,
    exited: bool,
}

impl CarPass {
    #[must_use]
    pub fn car(&self) -> ActorId {
        self.car
    }

    /// Leaves the crossing.
    ///
    /// # Errors
    ///
    /// Only `InvariantViolation`, which indicates a bug.
    pub fn exit(mut self) -> CoordinationResult<()> {
        self.exited = true;
        self.gate.car_exit(self.car)
    }
}

impl Drop for CarPass {
    fn drop(&mut self) {
        if !self.exited {
            // car_exit logs its own failures.
            let _ = self.gate.car_exit(self.car);
        }
    }
}

/// A train's exclusive hold on the crossing. Exits on drop.
#[must_use = "the train leaves the crossing as soon as the pass is dropped"]
#[derive(Debug)]
pub struct TrainPass {
    gate: ExclusionGate,
    train: ActorId,
    exited: bool,
}

impl TrainPass {
    #[must_use]
    pub fn train(&self) -> ActorId {
        self.train
    }

    /// Leaves the crossing.
    ///
    /// # Errors
    ///
    /// Only `InvariantViolation`, which indicates a bug.
    pub fn exit(mut self) -> CoordinationResult<()> {
        self.exited = true;
        self.gate.train_exit(self.train)
    }
}

impl Drop for TrainPass {
    fn drop(&mut self) {
        if !self.exited {
            let _ = self.gate.train_exit(self.train);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActorRole, EventLog};
    use std::thread;

    fn wait_until(condition: impl Fn() -> bool) {
        while !condition() {
            thread::yield_now();
        }
    }

    /// WHY: Validates gate construction
    /// WHAT: A new gate is idle with no traffic
    #[test]
    fn test_new_gate_is_idle() {
        let gate = ExclusionGate::new();
        assert_eq!(gate.mode(), GateMode::Idle);
        assert_eq!(gate.cars_crossing(), 0);
        assert_eq!(gate.trains_waiting(), 0);
        assert_eq!(gate.train_crossing(), None);
    }

    /// WHY: Cars share the crossing
    /// WHAT: Two cars are admitted together and the gate returns to idle after both exit
    #[test]
    fn test_cars_cross_concurrently() {
        let gate = ExclusionGate::new();

        let first = gate.car_enter(ActorId::car(1)).expect("car should enter");
        let second = gate.car_enter(ActorId::car(2)).expect("car should enter");
        assert_eq!(gate.mode(), GateMode::CarsCrossing);
        assert_eq!(gate.cars_crossing(), 2);

        first.exit().expect("car should exit");
        assert_eq!(gate.mode(), GateMode::CarsCrossing);
        drop(second);
        assert_eq!(gate.mode(), GateMode::Idle);
    }

    /// WHY: Trains hold the crossing alone
    /// WHAT: A train entering an idle gate switches it to TrainCrossing until exit
    #[test]
    fn test_train_holds_crossing() {
        let gate = ExclusionGate::new();

        let pass = gate.train_enter(ActorId::train(1)).expect("train should enter");
        assert_eq!(gate.mode(), GateMode::TrainCrossing);
        assert_eq!(gate.train_crossing(), Some(ActorId::train(1)));
        assert_eq!(pass.train(), ActorId::train(1));

        pass.exit().expect("train should exit");
        assert_eq!(gate.mode(), GateMode::Idle);
    }

    /// WHY: A pending train must stop new car admissions
    /// WHAT: A train waits for the crossing car; a car arriving after the
    /// request waits until the train has exited
    #[test]
    #[ntest::timeout(5000)]
    fn test_pending_train_blocks_new_cars() {
        let log = Arc::new(EventLog::new());
        let gate = ExclusionGate::with_observer(log.clone());
        let early_car = gate.car_enter(ActorId::car(1)).expect("car should enter");

        let train_gate = gate.clone();
        let train = thread::spawn(move || {
            let pass = train_gate.train_enter(ActorId::train(1)).expect("train should enter");
            thread::sleep(Duration::from_millis(30));
            pass.exit().expect("train should exit");
        });
        wait_until(|| gate.trains_waiting() == 1);

        let car_gate = gate.clone();
        let late_car = thread::spawn(move || {
            let pass = car_gate.car_enter(ActorId::car(2)).expect("car should enter");
            pass.exit().expect("car should exit");
        });

        thread::sleep(Duration::from_millis(30));
        assert_eq!(gate.cars_crossing(), 1);
        assert_eq!(gate.mode(), GateMode::CarsCrossing);
        early_car.exit().expect("car should exit");

        train.join().expect("train should join");
        late_car.join().expect("car should join");

        let trains = log.intervals_for(ActorRole::Train);
        let cars = log.intervals_for(ActorRole::Car);
        assert_eq!(trains.len(), 1);
        assert_eq!(cars.len(), 2);
        let late = cars
            .iter()
            .find(|interval| interval.actor == ActorId::car(2))
            .expect("late car should have crossed");
        assert!(late.start > trains[0].end);
    }

    /// WHY: Trains never overlap and are served in request order
    /// WHAT: Two queued trains cross one after another in arrival order
    #[test]
    #[ntest::timeout(5000)]
    fn test_trains_served_in_order() {
        let log = Arc::new(EventLog::new());
        let gate = ExclusionGate::with_observer(log.clone());
        let blocker = gate.car_enter(ActorId::car(1)).expect("car should enter");

        let mut handles = Vec::new();
        for index in 1..=2 {
            let train_gate = gate.clone();
            handles.push(thread::spawn(move || {
                let pass = train_gate.train_enter(ActorId::train(index)).expect("train should enter");
                thread::sleep(Duration::from_millis(10));
                pass.exit().expect("train should exit");
            }));
            wait_until(|| gate.trains_waiting() == index);
        }

        blocker.exit().expect("car should exit");
        for handle in handles {
            handle.join().expect("train should join");
        }

        let trains = log.intervals_for(ActorRole::Train);
        assert_eq!(trains.len(), 2);
        assert_eq!(trains[0].actor, ActorId::train(1));
        assert_eq!(trains[1].actor, ActorId::train(2));
        assert!(trains[0].end < trains[1].start);
    }

    /// WHY: A cancelled train must not keep cars out
    /// WHAT: Cancelling a waiting train withdraws its request and lets a waiting car in
    #[test]
    #[ntest::timeout(5000)]
    fn test_cancelled_train_releases_cars() {
        let gate = ExclusionGate::new();
        let blocker = gate.car_enter(ActorId::car(1)).expect("car should enter");
        let token = CancellationToken::new();

        let train_gate = gate.clone();
        let train_token = token.clone();
        let train = thread::spawn(move || train_gate.train_enter_with(ActorId::train(1), &train_token).map(drop));
        wait_until(|| gate.trains_waiting() == 1);

        let car_gate = gate.clone();
        let car = thread::spawn(move || car_gate.car_enter(ActorId::car(2)).map(|pass| pass.car()));

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        assert_eq!(
            train.join().expect("train should join"),
            Err(CoordinationError::Cancelled)
        );
        assert_eq!(car.join().expect("car should join"), Ok(ActorId::car(2)));
        assert_eq!(gate.trains_waiting(), 0);
        drop(blocker);
        assert_eq!(gate.mode(), GateMode::Idle);
    }

    /// WHY: Cancelled cars acquire nothing
    /// WHAT: A car waiting behind a train fails with Cancelled and leaves the count untouched
    #[test]
    #[ntest::timeout(5000)]
    fn test_cancelled_car_leaves_no_state() {
        let gate = ExclusionGate::new();
        let train = gate.train_enter(ActorId::train(1)).expect("train should enter");
        let token = CancellationToken::new();

        let car_gate = gate.clone();
        let car_token = token.clone();
        let car = thread::spawn(move || car_gate.car_enter_with(ActorId::car(1), &car_token).map(drop));

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        assert_eq!(car.join().expect("car should join"), Err(CoordinationError::Cancelled));
        assert_eq!(gate.cars_crossing(), 0);
        assert_eq!(gate.mode(), GateMode::TrainCrossing);
        train.exit().expect("train should exit");
    }

    /// WHY: The crossing helpers always leave the crossing
    /// WHAT: Cancelling mid-crossing returns Cancelled and the gate is idle again
    #[test]
    #[ntest::timeout(5000)]
    fn test_cross_as_car_cancelled_mid_crossing() {
        let gate = ExclusionGate::new();
        let token = CancellationToken::new();

        let car_gate = gate.clone();
        let car_token = token.clone();
        let car = thread::spawn(move || {
            car_gate.cross_as_car(ActorId::car(1), Duration::from_secs(60), &car_token)
        });

        wait_until(|| gate.cars_crossing() == 1);
        token.cancel();

        assert_eq!(car.join().expect("car should join"), Err(CoordinationError::Cancelled));
        assert_eq!(gate.mode(), GateMode::Idle);
    }
}
