use super::scheduler::{Scheduler, SchedulerError, Task, TimerHandle, Wait, Wakeup};
use crate::{Error, Result};

use crate::colored::Colorize;
use tracing::{debug, error, info};

use tokio::time::Duration;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    AwaitingFirstRound,
    RoundActive,
    /// A scheduler fault ended the controller.
    Terminated,
}

/// Which way `schedule_next_round` renewed the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRound {
    /// Another round fits in the current phase; it runs one round period from now.
    Periodic,
    /// Too little of the phase is left; wait for the next phase boundary.
    Boundary,
}

/// The work performed once per round.
pub trait RoundTask: Send + Sync {
    fn run_round(&self);
}

struct Inner {
    module: String,
    scheduler: Arc<dyn Scheduler>,
    task: Arc<dyn RoundTask>,
    round_period: Duration,
    round_timer: TimerHandle,
    wait_timer: TimerHandle,
    state: Mutex<RoundState>,
    rounds: AtomicU64,
}

/// Drives rounds against the phase scheduler. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RoundController {
    inner: Arc<Inner>,
}

impl RoundController {
    pub fn new(
        module: &str,
        scheduler: Arc<dyn Scheduler>,
        task: Arc<dyn RoundTask>,
        round_period: Duration,
    ) -> Self {
        let round_timer = scheduler.allocate_timer(module);
        let wait_timer = scheduler.allocate_timer(module);
        RoundController {
            inner: Arc::new(Inner {
                module: module.to_owned(),
                scheduler,
                task,
                round_period,
                round_timer,
                wait_timer,
                state: Mutex::new(RoundState::Idle),
                rounds: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> RoundState {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of rounds run so far.
    pub fn rounds(&self) -> u64 {
        self.inner.rounds.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: RoundState) {
        let mut current = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("[{}] {:?} -> {:?}", self.inner.module.cyan(), *current, state);
        *current = state;
    }

    pub fn start(&self) {
        self.set_state(RoundState::AwaitingFirstRound);
        self.inner.scheduler.schedule(&self.inner.module, self.first_round_task());
        info!("[{}] scheduled for the next phase", self.inner.module.cyan());
    }

    /// Aborts any pending wait. The woken callbacks observe a cancellation and the
    /// controller goes idle.
    pub fn stop(&self) {
        self.inner.scheduler.cancel(&self.inner.round_timer);
        self.inner.scheduler.cancel(&self.inner.wait_timer);
    }

    fn first_round_task(&self) -> Task {
        let controller = self.clone();
        Box::new(move |wakeup| controller.first_round(wakeup))
    }

    fn manage_task(&self) -> Task {
        let controller = self.clone();
        Box::new(move |wakeup| controller.manage(wakeup))
    }

    /// Sorts a wakeup into proceed (`Ok(true)`), cancelled (`Ok(false)`) or fatal.
    fn admit(&self, step: &str, wakeup: Wakeup) -> Result<bool> {
        match wakeup {
            Ok(()) => Ok(true),
            Err(SchedulerError::Cancelled) => {
                info!("[{}] {} aborted", self.inner.module.cyan(), step);
                self.set_state(RoundState::Idle);
                Ok(false)
            }
            Err(SchedulerError::Fault(reason)) => {
                error!("[{}] {}: {}", self.inner.module.cyan(), step, reason);
                self.set_state(RoundState::Terminated);
                Err(Error::Scheduler(reason))
            }
        }
    }

    pub fn first_round(&self, wakeup: Wakeup) -> Result<()> {
        if self.admit("first round", wakeup)? {
            self.set_state(RoundState::RoundActive);
            self.inner.scheduler.schedule(&self.inner.module, self.manage_task());
        }
        Ok(())
    }

    pub fn manage(&self, wakeup: Wakeup) -> Result<()> {
        if self.admit("round", wakeup)? {
            let next = self.schedule_next_round();
            let round = self.inner.rounds.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("[{}] running round {}, next {:?}", self.inner.module.cyan(), round, next);
            self.inner.task.run_round();
        }
        Ok(())
    }

    /// Schedules the next round in this phase if it cannot overrun the phase,
    /// otherwise waits for the next phase boundary.
    pub fn schedule_next_round(&self) -> NextRound {
        let period = self.inner.round_period;
        if self.inner.scheduler.time_remaining() > period * 2 {
            self.set_state(RoundState::RoundActive);
            self.inner.scheduler.schedule_timer(
                &self.inner.round_timer,
                Wait::After(period),
                self.manage_task(),
            );
            info!("[{}] next round scheduled in {:?}", self.inner.module.cyan(), period);
            NextRound::Periodic
        } else {
            self.set_state(RoundState::AwaitingFirstRound);
            self.inner.scheduler.schedule_timer(
                &self.inner.wait_timer,
                Wait::NextPhase,
                self.first_round_task(),
            );
            info!("[{}] next round scheduled for the next phase", self.inner.module.cyan());
            NextRound::Boundary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Slot {
        Now(String),
        Timer(TimerHandle, Wait),
    }

    /// Collects scheduled tasks so a test can fire them by hand.
    struct ManualScheduler {
        remaining: Mutex<Duration>,
        next_timer: AtomicU64,
        pending: Mutex<Vec<(Slot, Task)>>,
        cancelled: Mutex<Vec<TimerHandle>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ManualScheduler {
        fn new(remaining: Duration, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(ManualScheduler {
                remaining: Mutex::new(remaining),
                next_timer: AtomicU64::new(1),
                pending: Mutex::new(vec![]),
                cancelled: Mutex::new(vec![]),
                log,
            })
        }

        fn set_remaining(&self, remaining: Duration) {
            *self.remaining.lock().unwrap() = remaining;
        }

        fn slots(&self) -> Vec<Slot> {
            self.pending.lock().unwrap().iter().map(|(slot, _)| slot.clone()).collect()
        }

        /// Removes the oldest pending task and wakes it.
        fn fire(&self, wakeup: Wakeup) -> (Slot, Result<()>) {
            let (slot, task) = self.pending.lock().unwrap().remove(0);
            (slot, task(wakeup))
        }
    }

    impl Scheduler for ManualScheduler {
        fn allocate_timer(&self, module: &str) -> TimerHandle {
            TimerHandle { id: self.next_timer.fetch_add(1, Ordering::SeqCst), module: module.to_owned() }
        }

        fn schedule(&self, module: &str, task: Task) {
            self.log.lock().unwrap().push("schedule".to_owned());
            self.pending.lock().unwrap().push((Slot::Now(module.to_owned()), task));
        }

        fn schedule_timer(&self, timer: &TimerHandle, wait: Wait, task: Task) {
            self.log.lock().unwrap().push(format!("timer {}", timer.id));
            self.pending.lock().unwrap().push((Slot::Timer(timer.clone(), wait), task));
        }

        fn cancel(&self, timer: &TimerHandle) {
            self.cancelled.lock().unwrap().push(timer.clone());
        }

        fn time_remaining(&self) -> Duration {
            *self.remaining.lock().unwrap()
        }
    }

    struct LoggingRound {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RoundTask for LoggingRound {
        fn run_round(&self) {
            self.log.lock().unwrap().push("round".to_owned());
        }
    }

    const PERIOD: Duration = Duration::from_millis(100);

    fn setup(remaining: Duration) -> (RoundController, Arc<ManualScheduler>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(vec![]));
        let scheduler = ManualScheduler::new(remaining, log.clone());
        let round = Arc::new(LoggingRound { log: log.clone() });
        let controller = RoundController::new("vvc", scheduler.clone(), round, PERIOD);
        (controller, scheduler, log)
    }

    /// Starts the controller and runs it up to its first round.
    fn run_first_round(controller: &RoundController, scheduler: &ManualScheduler) {
        controller.start();
        let (_, outcome) = scheduler.fire(Ok(()));
        outcome.unwrap();
        let (slot, outcome) = scheduler.fire(Ok(()));
        assert_eq!(slot, Slot::Now("vvc".to_owned()));
        outcome.unwrap();
    }

    #[test]
    fn start_waits_for_the_first_round() {
        let (controller, scheduler, _log) = setup(PERIOD * 3);
        assert_eq!(controller.state(), RoundState::Idle);
        controller.start();
        assert_eq!(controller.state(), RoundState::AwaitingFirstRound);
        assert_eq!(scheduler.slots(), vec![Slot::Now("vvc".to_owned())]);

        let (_, outcome) = scheduler.fire(Ok(()));
        outcome.unwrap();
        assert_eq!(controller.state(), RoundState::RoundActive);
        // The first round schedules the round itself on the current tick.
        assert_eq!(scheduler.slots(), vec![Slot::Now("vvc".to_owned())]);
        assert_eq!(controller.rounds(), 0);
    }

    #[test]
    fn ample_time_takes_the_periodic_path() {
        let (controller, scheduler, _log) = setup(PERIOD * 3);
        run_first_round(&controller, &scheduler);

        assert_eq!(controller.rounds(), 1);
        assert_eq!(controller.state(), RoundState::RoundActive);
        match scheduler.slots().as_slice() {
            [Slot::Timer(timer, Wait::After(delay))] => {
                assert_eq!(*delay, PERIOD);
                assert_eq!(timer.module, "vvc");
            }
            other => panic!("unexpected schedule: {:?}", other),
        }

        // The periodic timer runs the next round directly.
        let (_, outcome) = scheduler.fire(Ok(()));
        outcome.unwrap();
        assert_eq!(controller.rounds(), 2);
    }

    #[test]
    fn short_phase_takes_the_boundary_path() {
        let (controller, scheduler, _log) = setup(PERIOD * 3 / 2);
        run_first_round(&controller, &scheduler);

        assert_eq!(controller.rounds(), 1);
        assert_eq!(controller.state(), RoundState::AwaitingFirstRound);
        match scheduler.slots().as_slice() {
            [Slot::Timer(timer, Wait::NextPhase)] => assert_eq!(timer.module, "vvc"),
            other => panic!("unexpected schedule: {:?}", other),
        }

        // At the boundary the cycle starts over with a first round.
        scheduler.set_remaining(PERIOD * 10);
        let (_, outcome) = scheduler.fire(Ok(()));
        outcome.unwrap();
        assert_eq!(controller.state(), RoundState::RoundActive);
        assert_eq!(scheduler.slots(), vec![Slot::Now("vvc".to_owned())]);
    }

    #[test]
    fn exactly_two_periods_is_not_enough() {
        let (controller, scheduler, _log) = setup(PERIOD * 2);
        assert_eq!(controller.schedule_next_round(), NextRound::Boundary);
        scheduler.set_remaining(PERIOD * 2 + Duration::from_millis(1));
        assert_eq!(controller.schedule_next_round(), NextRound::Periodic);
    }

    #[test]
    fn next_round_is_scheduled_before_the_round_runs() {
        let (controller, scheduler, log) = setup(PERIOD * 3);
        run_first_round(&controller, &scheduler);
        let log = log.lock().unwrap().clone();
        let timer_at = log.iter().position(|entry| entry.starts_with("timer")).unwrap();
        let round_at = log.iter().position(|entry| entry == "round").unwrap();
        assert!(timer_at < round_at, "{:?}", log);
    }

    #[test]
    fn cancellation_goes_idle_without_rescheduling() {
        let (controller, scheduler, log) = setup(PERIOD * 3);
        controller.start();
        let (_, outcome) = scheduler.fire(Err(SchedulerError::Cancelled));
        assert!(outcome.is_ok());
        assert_eq!(controller.state(), RoundState::Idle);
        assert!(scheduler.slots().is_empty());

        run_first_round(&controller, &scheduler);
        let (_, outcome) = scheduler.fire(Err(SchedulerError::Cancelled));
        assert!(outcome.is_ok());
        assert_eq!(controller.state(), RoundState::Idle);
        assert!(scheduler.slots().is_empty());
        assert_eq!(log.lock().unwrap().iter().filter(|entry| *entry == "round").count(), 1);
    }

    #[test]
    fn faults_are_fatal() {
        let (controller, scheduler, _log) = setup(PERIOD * 3);
        controller.start();
        let (_, outcome) = scheduler.fire(Err(SchedulerError::Fault("timer queue lost".to_owned())));
        match outcome {
            Err(Error::Scheduler(reason)) => assert_eq!(reason, "timer queue lost"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(controller.state(), RoundState::Terminated);
        assert!(scheduler.slots().is_empty());

        let (controller, scheduler, log) = setup(PERIOD * 3);
        run_first_round(&controller, &scheduler);
        let (_, outcome) = scheduler.fire(Err(SchedulerError::Fault("clock skew".to_owned())));
        assert!(outcome.is_err());
        assert_eq!(controller.rounds(), 1);
        assert_eq!(controller.state(), RoundState::Terminated);
        assert_eq!(log.lock().unwrap().iter().filter(|entry| *entry == "round").count(), 1);
    }

    #[test]
    fn stop_cancels_both_timers() {
        let (controller, scheduler, _log) = setup(PERIOD * 3);
        controller.stop();
        let cancelled = scheduler.cancelled.lock().unwrap().clone();
        assert_eq!(cancelled.len(), 2);
        assert_ne!(cancelled[0], cancelled[1]);
    }
}
