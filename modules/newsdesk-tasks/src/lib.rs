//! The task and scheduling fabric: task lifecycle with progress, events,
//! and cooperative cancellation; the executor catalogue; and the periodic
//! scheduler that dispatches due jobs.

pub mod broadcast;
pub mod executors;
pub mod manager;
pub mod scheduler;

pub use broadcast::{TaskHub, TaskStreamEvent};
pub use executors::{register_all, ExecutorDeps};
pub use manager::{TaskContext, TaskExecutor, TaskManager};
pub use scheduler::{SchedulerService, SchedulerStatus};
