//! The volt-var control loop run once per round.
//!
//! Each round broadcasts the advisory to every known peer, reports the local
//! reading to the coordinator when it is valid, and applies the latest
//! correction vector received from the coordinator to the actuator slots. A
//! round never fails: faults are contained per device and per message.
mod cycle;

pub use cycle::*;
