mod learning;
mod memory;

pub use learning::{LearningQueue, LearningTask, TaskId, TaskStatus};
pub use memory::MemorySubsystem;
