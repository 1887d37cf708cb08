//! Tiered conversational memory.
//!
//! * short-term: per-session JSON context with a TTL, cached in process and
//!   persisted in libsql
//! * medium-term: session-scoped semantic memories in a vector collection
//! * long-term: cross-session facts with duplicate merging and
//!   contradiction detection
//!
//! Every vector collection is namespaced by tenant. [`MemorySubsystem`] wires
//! the tiers together; the individual stores are usable on their own.

pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod intelligence;
pub mod llm;
pub mod memory;
pub mod models;
pub mod services;
pub mod vector;

pub use config::Config;
pub use error::{Result, StrataError};
pub use services::{LearningQueue, LearningTask, MemorySubsystem, TaskStatus};
