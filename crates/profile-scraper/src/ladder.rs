//! Ordered classification ladders.
//!
//! A ladder is a list of `(predicate, reason)` rungs evaluated top to bottom;
//! the first rung whose predicate matches decides the reason. Keeping the
//! rules as data makes the order auditable and lets each ladder be tested on
//! its own.

use crate::failure::FailureReason;

/// Marker present on the platform's block page.
pub const ACCESS_DENIED_MARKER: &str = "Access Denied";

/// Marker present when the platform served a half-rendered page.
pub const PLEASE_WAIT_MARKER: &str = "Please wait...";

/// Error-panel text shown for handles that do not exist (any more).
pub const ACCOUNT_NOT_FOUND_MARKER: &str = "Couldn't find this account";

/// A single rung of a ladder.
#[derive(Clone, Copy)]
pub struct Rung {
    pub reason: FailureReason,
    pub matches: fn(&str) -> bool,
}

impl std::fmt::Debug for Rung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rung").field("reason", &self.reason).finish()
    }
}

/// An ordered list of rungs; first match wins.
#[derive(Debug, Clone, Copy)]
pub struct Ladder {
    rungs: &'static [Rung],
}

impl Ladder {
    pub const fn new(rungs: &'static [Rung]) -> Self {
        Self { rungs }
    }

    /// Classify `text`, returning the reason of the first matching rung.
    pub fn classify(&self, text: &str) -> Option<FailureReason> {
        self.rungs
            .iter()
            .find(|rung| (rung.matches)(text))
            .map(|rung| rung.reason)
    }
}

const BLOCK_RUNGS: &[Rung] = &[
    Rung {
        reason: FailureReason::AccessDenied,
        matches: is_block_page,
    },
    Rung {
        reason: FailureReason::PleaseWait,
        matches: is_incomplete_render,
    },
];

/// Whole-page checks applied before any structured extraction.
pub const BLOCK_LADDER: Ladder = Ladder::new(BLOCK_RUNGS);

const PANEL_RUNGS: &[Rung] = &[
    Rung {
        reason: FailureReason::SomethingWentWrong,
        matches: says_something_went_wrong,
    },
    Rung {
        reason: FailureReason::NoContent,
        matches: says_no_content,
    },
    Rung {
        reason: FailureReason::PageNotAvailable,
        matches: says_page_not_available,
    },
    Rung {
        reason: FailureReason::PrivateAccount,
        matches: says_private_account,
    },
];

/// Error-panel text checks. Text matching no rung is an
/// [`FailureReason::UnknownErrorDiv`], keyed by the raw text.
pub const PANEL_LADDER: Ladder = Ladder::new(PANEL_RUNGS);

fn is_block_page(page: &str) -> bool {
    page.contains(ACCESS_DENIED_MARKER)
}

fn is_incomplete_render(page: &str) -> bool {
    page.contains(PLEASE_WAIT_MARKER)
}

fn says_something_went_wrong(text: &str) -> bool {
    text.contains("Something went wrong")
}

fn says_no_content(text: &str) -> bool {
    text.contains("No content")
}

fn says_page_not_available(text: &str) -> bool {
    text.contains("Page not available")
}

fn says_private_account(text: &str) -> bool {
    text.contains("This account is private")
}

/// Whether an error panel says the account does not exist.
pub fn is_account_not_found(panel_text: &str) -> bool {
    panel_text.contains(ACCOUNT_NOT_FOUND_MARKER)
}
