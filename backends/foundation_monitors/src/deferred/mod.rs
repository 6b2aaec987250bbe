//! Deadline ordered execution of deferred callbacks on a dispatcher thread.

mod action;
mod scheduler;
mod sink;

pub use action::*;
pub use scheduler::*;
pub use sink::*;
