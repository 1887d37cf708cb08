mod memory;
mod tenant;

pub use memory::*;
pub use tenant::*;
