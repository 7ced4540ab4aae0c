mod engine;
mod types;

pub use engine::FtsEngine;
pub use types::{FtsDocument, FtsMatch, FtsStats};
