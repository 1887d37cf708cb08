mod long_term;
mod medium_term;
mod short_term;

pub use long_term::{AddOptions, AddOutcome, LongTermHit, LongTermMemoryStore};
pub use medium_term::MediumTermMemoryStore;
pub use short_term::ShortTermMemoryCache;
