//! Profile page understanding for creator-watch.
//!
//! This crate knows what a rendered profile page looks like and nothing
//! else: it has no network access and keeps no state. The service crate
//! feeds it raw page bodies and acts on the [`PageOutcome`] it returns.

pub mod extract;
pub mod failure;
pub mod ladder;

pub use extract::{ContentFacts, PageFacts, PageFailure, PageOutcome, PollMode, extract};
pub use failure::FailureReason;
