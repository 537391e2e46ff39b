use super::scheduler::{Scheduler, SchedulerError, Task, TimerHandle, Wait, Wakeup};
use crate::{Error, Result};

use crate::colored::Colorize;
use tracing::{debug, error, info};

use actix::{Actor, ActorContext, Addr, AsyncContext, Context, Handler, SpawnHandle};
use tokio::sync::mpsc::UnboundedSender;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A fixed slice of the broker cycle owned by one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub module: String,
    pub duration: Duration,
}

impl Phase {
    pub fn new(module: &str, duration: Duration) -> Self {
        Phase { module: module.to_owned(), duration }
    }
}

#[derive(Debug)]
struct Window {
    module: String,
    ends_at: Instant,
}

struct PendingTimer {
    module: String,
    task: Task,
    /// `None` while waiting for the module's next phase.
    expiry: Option<SpawnHandle>,
}

/// A task waiting for its module's phase, with the timer it came from if any.
type Ready = (Option<u64>, Task);

/// The `Broker` rotates through its phases forever and runs each module's tasks
/// only while that module holds the phase. All tasks run on the broker's own
/// context, one at a time. A task returning an error is fatal: the error is sent
/// to the supervisor and the broker stops, cancelling everything still pending.
pub struct Broker {
    phases: Vec<Phase>,
    current: usize,
    window: Arc<Mutex<Window>>,
    ready: HashMap<String, VecDeque<Ready>>,
    timers: HashMap<u64, PendingTimer>,
    supervisor: UnboundedSender<Error>,
}

impl Broker {
    /// Starts the broker on the current arbiter and returns a scheduler handle.
    pub fn launch(phases: Vec<Phase>, supervisor: UnboundedSender<Error>) -> Result<BrokerHandle> {
        let first = match phases.first() {
            Some(first) => first.clone(),
            None => return Err(Error::InvalidSettings("the broker needs at least one phase".to_owned())),
        };
        if let Some(phase) = phases.iter().find(|phase| phase.duration == Duration::from_millis(0)) {
            return Err(Error::InvalidSettings(format!("phase {} has no duration", phase.module)));
        }
        let window = Arc::new(Mutex::new(Window {
            module: first.module.clone(),
            ends_at: Instant::now() + first.duration,
        }));
        let broker = Broker {
            phases,
            current: 0,
            window: window.clone(),
            ready: HashMap::new(),
            timers: HashMap::new(),
            supervisor,
        };
        let addr = broker.start();
        Ok(BrokerHandle { addr, window, next_timer: Arc::new(AtomicU64::new(1)) })
    }

    fn active_module(&self) -> &str {
        &self.phases[self.current].module
    }

    fn knows(&self, module: &str) -> bool {
        self.phases.iter().any(|phase| phase.module == module)
    }

    fn begin_phase(&mut self, index: usize, ctx: &mut Context<Self>) {
        self.current = index;
        let Phase { module, duration } = self.phases[index].clone();
        {
            let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
            window.module = module.clone();
            window.ends_at = Instant::now() + duration;
        }
        debug!("[{}] phase {} for {:?}", "broker".yellow(), module, duration);

        let next = (index + 1) % self.phases.len();
        let _ = ctx.run_later(duration, move |act, ctx| act.begin_phase(next, ctx));

        // Boundary waits of this module resolve now.
        let mut boundary: Vec<u64> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.expiry.is_none() && timer.module == module)
            .map(|(id, _)| *id)
            .collect();
        boundary.sort_unstable();
        for id in boundary {
            if let Some(timer) = self.timers.remove(&id) {
                self.ready.entry(module.clone()).or_insert_with(VecDeque::new).push_back((Some(id), timer.task));
            }
        }
        self.drain(ctx);
    }

    /// Runs every ready task of the active module.
    fn drain(&mut self, ctx: &mut Context<Self>) {
        let module = self.active_module().to_owned();
        while let Some((_, task)) = self.ready.get_mut(&module).and_then(|queue| queue.pop_front()) {
            if let Err(err) = task(Ok(())) {
                self.fatal(err, ctx);
                return;
            }
        }
    }

    fn enqueue(&mut self, module: String, entry: Ready, ctx: &mut Context<Self>) {
        let active = module == self.active_module();
        self.ready.entry(module).or_insert_with(VecDeque::new).push_back(entry);
        if active {
            self.drain(ctx);
        }
    }

    fn expire(&mut self, id: u64, ctx: &mut Context<Self>) {
        if let Some(timer) = self.timers.remove(&id) {
            self.enqueue(timer.module, (Some(id), timer.task), ctx);
        }
    }

    fn cancel_timer(&mut self, id: u64, ctx: &mut Context<Self>) {
        let task = match self.timers.remove(&id) {
            Some(timer) => {
                if let Some(expiry) = timer.expiry {
                    let _ = ctx.cancel_future(expiry);
                }
                Some(timer.task)
            }
            // An expired timer may still be queued for its phase.
            None => self.ready.values_mut().find_map(|queue| {
                let at = queue.iter().position(|(timer, _)| *timer == Some(id))?;
                queue.remove(at).map(|(_, task)| task)
            }),
        };
        if let Some(task) = task {
            self.wake(task, Err(SchedulerError::Cancelled), ctx);
        }
    }

    fn wake(&mut self, task: Task, wakeup: Wakeup, ctx: &mut Context<Self>) {
        if let Err(err) = task(wakeup) {
            self.fatal(err, ctx);
        }
    }

    fn fatal(&mut self, err: Error, ctx: &mut Context<Self>) {
        error!("[{}] fatal: {}", "broker".yellow(), err);
        let _ = self.supervisor.send(err);
        ctx.stop();
    }
}

impl Actor for Broker {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        info!("[{}] started with {} phases", "broker".yellow(), self.phases.len());
        self.begin_phase(0, ctx);
    }

    fn stopped(&mut self, _ctx: &mut Context<Self>) {
        debug!("[{}] stopped", "broker".yellow());
        for (_, timer) in self.timers.drain() {
            let _ = (timer.task)(Err(SchedulerError::Cancelled));
        }
        for (_, queue) in self.ready.drain() {
            for (_, task) in queue {
                let _ = task(Err(SchedulerError::Cancelled));
            }
        }
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct ScheduleTask {
    module: String,
    task: Task,
}

impl Handler<ScheduleTask> for Broker {
    type Result = ();

    fn handle(&mut self, msg: ScheduleTask, ctx: &mut Context<Self>) -> Self::Result {
        if !self.knows(&msg.module) {
            let reason = format!("module {} has no phase", msg.module);
            return self.wake(msg.task, Err(SchedulerError::Fault(reason)), ctx);
        }
        self.enqueue(msg.module, (None, msg.task), ctx);
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct ScheduleTimer {
    timer: TimerHandle,
    wait: Wait,
    task: Task,
}

impl Handler<ScheduleTimer> for Broker {
    type Result = ();

    fn handle(&mut self, msg: ScheduleTimer, ctx: &mut Context<Self>) -> Self::Result {
        let ScheduleTimer { timer, wait, task } = msg;
        if !self.knows(&timer.module) {
            let reason = format!("module {} has no phase", timer.module);
            return self.wake(task, Err(SchedulerError::Fault(reason)), ctx);
        }
        // Rescheduling a pending timer aborts the earlier wait.
        self.cancel_timer(timer.id, ctx);

        let id = timer.id;
        let expiry = match wait {
            Wait::After(delay) => Some(ctx.run_later(delay, move |act, ctx| act.expire(id, ctx))),
            Wait::NextPhase => None,
        };
        let _ = self.timers.insert(id, PendingTimer { module: timer.module, task, expiry });
    }
}

#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
struct CancelTimer {
    id: u64,
}

impl Handler<CancelTimer> for Broker {
    type Result = ();

    fn handle(&mut self, msg: CancelTimer, ctx: &mut Context<Self>) -> Self::Result {
        self.cancel_timer(msg.id, ctx);
    }
}

/// Stops the broker; every pending task is woken as cancelled.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct Shutdown;

impl Handler<Shutdown> for Broker {
    type Result = ();

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Context<Self>) -> Self::Result {
        info!("[{}] shutting down", "broker".yellow());
        ctx.stop();
    }
}

/// A [`Scheduler`] backed by a running [`Broker`].
#[derive(Clone)]
pub struct BrokerHandle {
    addr: Addr<Broker>,
    window: Arc<Mutex<Window>>,
    next_timer: Arc<AtomicU64>,
}

impl BrokerHandle {
    pub fn current_module(&self) -> String {
        self.window.lock().unwrap_or_else(PoisonError::into_inner).module.clone()
    }

    pub fn shutdown(&self) {
        self.addr.do_send(Shutdown);
    }
}

impl Scheduler for BrokerHandle {
    fn allocate_timer(&self, module: &str) -> TimerHandle {
        TimerHandle { id: self.next_timer.fetch_add(1, Ordering::SeqCst), module: module.to_owned() }
    }

    fn schedule(&self, module: &str, task: Task) {
        self.addr.do_send(ScheduleTask { module: module.to_owned(), task });
    }

    fn schedule_timer(&self, timer: &TimerHandle, wait: Wait, task: Task) {
        self.addr.do_send(ScheduleTimer { timer: timer.clone(), wait, task });
    }

    fn cancel(&self, timer: &TimerHandle) {
        self.addr.do_send(CancelTimer { id: timer.id });
    }

    fn time_remaining(&self) -> Duration {
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        window.ends_at.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::{RoundController, RoundTask};

    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
    use tokio::time::{sleep, timeout};

    fn reporting(tx: UnboundedSender<Wakeup>) -> Task {
        Box::new(move |wakeup| {
            let _ = tx.send(wakeup);
            Ok(())
        })
    }

    async fn next(rx: &mut UnboundedReceiver<Wakeup>) -> Wakeup {
        timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap()
    }

    fn single_phase(millis: u64) -> (BrokerHandle, UnboundedReceiver<Error>) {
        let (supervisor, fatal) = unbounded_channel();
        let broker = Broker::launch(vec![Phase::new("vvc", Duration::from_millis(millis))], supervisor).unwrap();
        (broker, fatal)
    }

    #[actix_rt::test]
    async fn rejects_an_empty_cycle() {
        let (supervisor, _fatal) = unbounded_channel();
        assert!(Broker::launch(vec![], supervisor.clone()).is_err());
        assert!(Broker::launch(vec![Phase::new("vvc", Duration::from_millis(0))], supervisor).is_err());
    }

    #[actix_rt::test]
    async fn runs_tasks_in_the_active_phase() {
        let (broker, _fatal) = single_phase(1_000);
        let (tx, mut rx) = unbounded_channel();
        broker.schedule("vvc", reporting(tx.clone()));
        assert_eq!(next(&mut rx).await, Ok(()));

        let timer = broker.allocate_timer("vvc");
        broker.schedule_timer(&timer, Wait::After(Duration::from_millis(20)), reporting(tx));
        assert_eq!(next(&mut rx).await, Ok(()));
        assert!(broker.time_remaining() <= Duration::from_millis(1_000));
        assert_eq!(broker.current_module(), "vvc");
    }

    #[actix_rt::test]
    async fn unknown_modules_fault() {
        let (broker, _fatal) = single_phase(1_000);
        let (tx, mut rx) = unbounded_channel();
        broker.schedule("lb", reporting(tx.clone()));
        assert!(matches!(next(&mut rx).await, Err(SchedulerError::Fault(_))));

        let timer = broker.allocate_timer("lb");
        broker.schedule_timer(&timer, Wait::NextPhase, reporting(tx));
        assert!(matches!(next(&mut rx).await, Err(SchedulerError::Fault(_))));
    }

    #[actix_rt::test]
    async fn rescheduling_cancels_the_pending_wait() {
        let (broker, _fatal) = single_phase(1_000);
        let (first_tx, mut first) = unbounded_channel();
        let (second_tx, mut second) = unbounded_channel();
        let timer = broker.allocate_timer("vvc");
        broker.schedule_timer(&timer, Wait::After(Duration::from_secs(30)), reporting(first_tx));
        broker.schedule_timer(&timer, Wait::After(Duration::from_millis(10)), reporting(second_tx));
        assert_eq!(next(&mut first).await, Err(SchedulerError::Cancelled));
        assert_eq!(next(&mut second).await, Ok(()));
    }

    #[actix_rt::test]
    async fn cancel_aborts_a_boundary_wait() {
        let (broker, _fatal) = single_phase(10_000);
        let (tx, mut rx) = unbounded_channel();
        let timer = broker.allocate_timer("vvc");
        broker.schedule_timer(&timer, Wait::NextPhase, reporting(tx));
        broker.cancel(&timer);
        assert_eq!(next(&mut rx).await, Err(SchedulerError::Cancelled));
    }

    #[actix_rt::test]
    async fn boundary_waits_resolve_at_the_next_phase() {
        let (supervisor, _fatal) = unbounded_channel();
        let broker = Broker::launch(
            vec![Phase::new("vvc", Duration::from_millis(100)), Phase::new("gm", Duration::from_millis(100))],
            supervisor,
        )
        .unwrap();
        let (tx, mut rx) = unbounded_channel();
        let started = Instant::now();
        let timer = broker.allocate_timer("vvc");
        broker.schedule_timer(&timer, Wait::NextPhase, reporting(tx));
        assert_eq!(next(&mut rx).await, Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(broker.current_module(), "vvc");
    }

    #[actix_rt::test]
    async fn task_errors_reach_the_supervisor() {
        let (broker, mut fatal) = single_phase(1_000);
        let (tx, mut rx) = unbounded_channel();
        let timer = broker.allocate_timer("vvc");
        broker.schedule_timer(&timer, Wait::NextPhase, reporting(tx));
        broker.schedule("vvc", Box::new(|_| Err(Error::Scheduler("boom".to_owned()))));

        match timeout(Duration::from_secs(5), fatal.recv()).await.unwrap() {
            Some(Error::Scheduler(reason)) => assert_eq!(reason, "boom"),
            other => panic!("unexpected report: {:?}", other),
        }
        // Stopping cancels what was still pending.
        assert_eq!(next(&mut rx).await, Err(SchedulerError::Cancelled));
    }

    struct Counter(AtomicU64);

    impl RoundTask for Counter {
        fn run_round(&self) {
            let _ = self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[actix_rt::test]
    async fn drives_a_round_controller() {
        let (broker, _fatal) = single_phase(300);
        let counter = Arc::new(Counter(AtomicU64::new(0)));
        let controller = RoundController::new(
            "vvc",
            Arc::new(broker.clone()),
            counter.clone(),
            Duration::from_millis(20),
        );
        controller.start();
        sleep(Duration::from_millis(250)).await;
        assert!(controller.rounds() >= 3, "only {} rounds", controller.rounds());
        assert_eq!(controller.rounds(), counter.0.load(Ordering::SeqCst));

        broker.shutdown();
        sleep(Duration::from_millis(50)).await;
        let rounds = controller.rounds();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(controller.rounds(), rounds);
    }
}
