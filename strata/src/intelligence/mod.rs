pub mod contradiction;
pub mod entities;
pub mod types;
pub mod utils;

pub use contradiction::ContradictionDetector;
pub use entities::Entities;
pub use types::{
    ContradictionCheck, ContradictionReport, ContradictionType, DetectedBy, KnowledgeItem,
};
