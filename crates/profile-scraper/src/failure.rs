//! Failure taxonomy for profile polls.
//!
//! Every way a poll can fail maps to exactly one [`FailureReason`]. The set is
//! closed: new page-format breakages are added as new variants (and new ladder
//! entries), never by catching generic errors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason a poll attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The platform served an explicit block page.
    AccessDenied,
    /// The platform served an incomplete render; retried next tick.
    PleaseWait,
    /// Error panel: generic platform error.
    SomethingWentWrong,
    /// Error panel: the account has nothing to show.
    NoContent,
    /// Error panel: the page is not available.
    PageNotAvailable,
    /// Error panel: the account is private.
    PrivateAccount,
    /// Error panel with text no ladder entry recognises.
    UnknownErrorDiv,
    /// The post-list container is missing.
    UserPostItemList,
    /// The post-list container has no entries.
    UserPostItemListDiv,
    /// The first entry has no post item.
    UserPostItem,
    /// The post item has no link.
    NoVideoLink,
    /// The first entry has no caption container.
    UserPostItemDesc,
    /// The caption container carries no caption.
    NoVideoDesc,
    /// The post link does not end in a numeric id.
    FaultyVideoLink,
    /// The request never produced a page (transport error, timeout).
    RequestFailed,
}

impl FailureReason {
    /// All reasons, in reporting order.
    pub const ALL: [FailureReason; 15] = [
        FailureReason::AccessDenied,
        FailureReason::PleaseWait,
        FailureReason::SomethingWentWrong,
        FailureReason::NoContent,
        FailureReason::PageNotAvailable,
        FailureReason::PrivateAccount,
        FailureReason::UnknownErrorDiv,
        FailureReason::UserPostItemList,
        FailureReason::UserPostItemListDiv,
        FailureReason::UserPostItem,
        FailureReason::NoVideoLink,
        FailureReason::UserPostItemDesc,
        FailureReason::NoVideoDesc,
        FailureReason::FaultyVideoLink,
        FailureReason::RequestFailed,
    ];

    /// Stable tag used in persisted files.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::AccessDenied => "access-denied",
            FailureReason::PleaseWait => "please-wait",
            FailureReason::SomethingWentWrong => "something-went-wrong",
            FailureReason::NoContent => "no-content",
            FailureReason::PageNotAvailable => "page-not-available",
            FailureReason::PrivateAccount => "private-account",
            FailureReason::UnknownErrorDiv => "unknown-error-div",
            FailureReason::UserPostItemList => "user-post-item-list",
            FailureReason::UserPostItemListDiv => "user-post-item-list-div",
            FailureReason::UserPostItem => "user-post-item",
            FailureReason::NoVideoLink => "no-video-link",
            FailureReason::UserPostItemDesc => "user-post-item-desc",
            FailureReason::NoVideoDesc => "no-video-desc",
            FailureReason::FaultyVideoLink => "faulty-video-link",
            FailureReason::RequestFailed => "request-failed",
        }
    }

    /// Human-friendly label, e.g. `"User Post Item List"`.
    pub fn label(&self) -> String {
        self.as_str()
            .split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether the poll should simply be retried on the next tick.
    ///
    /// Transient reasons are counted but never escalated.
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureReason::PleaseWait)
    }

    /// Whether the failure happened while walking the post list, i.e. the
    /// page arrived intact but its layout diverged from what we expect.
    pub fn is_extraction_step(&self) -> bool {
        matches!(
            self,
            FailureReason::UserPostItemList
                | FailureReason::UserPostItemListDiv
                | FailureReason::UserPostItem
                | FailureReason::NoVideoLink
                | FailureReason::UserPostItemDesc
                | FailureReason::NoVideoDesc
                | FailureReason::FaultyVideoLink
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown reason tag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown failure reason: {0}")]
pub struct ParseReasonError(pub String);

impl FromStr for FailureReason {
    type Err = ParseReasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureReason::ALL
            .iter()
            .copied()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| ParseReasonError(s.to_string()))
    }
}
