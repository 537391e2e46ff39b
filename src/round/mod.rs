//! Round lifecycle: the phase scheduler and the controller that renews rounds
//! against it.
mod broker;
mod controller;
mod scheduler;

pub use broker::{Broker, BrokerHandle, Phase, Shutdown};
pub use controller::{NextRound, RoundController, RoundState, RoundTask};
pub use scheduler::{Scheduler, SchedulerError, Task, TimerHandle, Wait, Wakeup};
