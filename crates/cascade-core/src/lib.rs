pub mod error;
pub mod level;
pub mod ports;
pub mod types;

pub use error::{CascadeError, CascadeResult};
pub use level::{file_to_level, is_above, next_level_up, Level, LEVELS_ASCENDING};
pub use types::*;
