pub mod process;
pub mod trigger;

pub use process::{MatchCriteria, ProcessRecord};
pub use trigger::TriggerCondition;
