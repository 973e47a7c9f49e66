pub mod launcher;
pub mod scheduler;

pub use scheduler::Scheduler;
