//! Per-account state: the durable record, its store, and change detection.

mod account;
mod diff;
mod store;

pub use account::{AccountState, UNKNOWN_VIDEO_ID};
pub use diff::{Change, diff};
pub use store::{Mutation, StateStore, Transition};
