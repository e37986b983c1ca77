mod record;
mod stats;

pub use record::{CacheOperation, DecisionEvent, DecisionLog, EventRecord};
pub use stats::DecisionStats;
