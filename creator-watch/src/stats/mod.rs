//! Poll statistics: durable counters and their human-readable summary.

mod record;
mod store;
mod summary;

pub use record::{FailureCounts, StatsMeta, StatsRecord};
pub use store::StatsStore;
pub use summary::{StatsSummary, SummaryScope};
