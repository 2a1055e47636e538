//! Account polling: partitioning, page retrieval, the poll workers and their
//! housekeeping.

pub mod fetcher;
pub mod maintenance;
pub mod partition;
mod poller;

pub use fetcher::{HttpPageFetcher, PageFetcher};
pub use maintenance::{Maintenance, SweepReport};
pub use poller::{
    PartitionWorker, PollResult, Poller, PollerSettings, TickOutcome, failure_message,
};
