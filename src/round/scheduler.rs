use crate::Result;

use std::fmt;
use tokio::time::Duration;

/// Why a scheduled task was woken without running normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The wait was aborted, e.g. because its timer was rescheduled or the
    /// scheduler is stopping. Never escalated.
    Cancelled,
    /// Any other scheduler failure.
    Fault(String),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SchedulerError::Cancelled => write!(f, "operation cancelled"),
            SchedulerError::Fault(reason) => write!(f, "scheduler fault: {}", reason),
        }
    }
}

/// The outcome a task is woken with.
pub type Wakeup = std::result::Result<(), SchedulerError>;

/// A unit of work run on the scheduler's execution context. An `Err` returned by a
/// task is fatal and is surfaced to whatever supervises the scheduler.
pub type Task = Box<dyn FnOnce(Wakeup) -> Result<()> + Send>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    pub id: u64,
    pub module: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Expires after the given delay, then runs in the module's phase.
    After(Duration),
    /// Never expires on its own; resolves when the module's next phase begins.
    NextPhase,
}

/// A time-slot scheduler which runs each module's tasks only during that module's
/// phase. Scheduling a timer which is still pending cancels the earlier wait.
pub trait Scheduler: Send + Sync {
    fn allocate_timer(&self, module: &str) -> TimerHandle;

    /// Runs `task` as soon as `module` holds the current phase.
    fn schedule(&self, module: &str, task: Task);

    fn schedule_timer(&self, timer: &TimerHandle, wait: Wait, task: Task);

    /// Aborts a pending wait; its task is woken with `SchedulerError::Cancelled`.
    fn cancel(&self, timer: &TimerHandle);

    /// Time left in the current phase.
    fn time_remaining(&self) -> Duration;
}
