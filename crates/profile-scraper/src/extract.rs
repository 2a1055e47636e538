//! Page fact extraction.
//!
//! [`extract`] turns a rendered profile page into a [`PageOutcome`]. It is a
//! pure function: no I/O, no state, nothing but the page body and the poll
//! mode. All knowledge of the site's markup lives in this module and in
//! [`crate::ladder`].

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::failure::FailureReason;
use crate::ladder::{BLOCK_LADDER, PANEL_LADDER, is_account_not_found};

/// Marker present on a profile while its owner is live.
pub const LIVE_BADGE_MARKER: &str = "SpanLiveBadge";

static ERROR_PANEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[class*="DivErrorContainer"]"#).unwrap());
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());
static POST_LIST: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-e2e="user-post-item-list"]"#).unwrap());
static POST_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-e2e="user-post-item"]"#).unwrap());
static POST_DESC: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-e2e="user-post-item-desc"]"#).unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static TITLED_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[title]").unwrap());

/// What a poll is looking for on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollMode {
    /// Track the latest upload and the live badge.
    Content,
    /// Track only whether the account can be reached.
    Monitor,
}

/// Facts read from the newest post on a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFacts {
    pub video_id: i64,
    pub caption: String,
    pub is_live: bool,
}

/// Successful extraction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageFacts {
    /// Content-mode result.
    Content(ContentFacts),
    /// Monitor-mode result.
    Reachability { available: bool },
}

/// Failed extraction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub reason: FailureReason,
    /// Raw panel text for [`FailureReason::UnknownErrorDiv`], or the
    /// offending value for malformed links.
    pub detail: Option<String>,
}

impl PageFailure {
    pub fn new(reason: FailureReason) -> Self {
        Self {
            reason,
            detail: None,
        }
    }

    pub fn with_detail(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: Some(detail.into()),
        }
    }
}

/// Outcome of [`extract`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageOutcome {
    Success(PageFacts),
    Failure(PageFailure),
}

impl PageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PageOutcome::Success(_))
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            PageOutcome::Failure(failure) => Some(failure.reason),
            PageOutcome::Success(_) => None,
        }
    }
}

impl From<PageFailure> for PageOutcome {
    fn from(failure: PageFailure) -> Self {
        PageOutcome::Failure(failure)
    }
}

/// Text of an error panel found on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ErrorPanel {
    /// First non-empty paragraph, used as the counter key.
    primary: String,
    /// All paragraphs joined, used for classification.
    full: String,
}

/// Extract facts from a rendered profile page.
///
/// The decision order is fixed: block ladder, then error panel, then
/// (in content mode) the post-list walk.
pub fn extract(page: &str, mode: PollMode) -> PageOutcome {
    if let Some(reason) = BLOCK_LADDER.classify(page) {
        trace!(%reason, "page rejected by block ladder");
        return PageFailure::new(reason).into();
    }

    let document = Html::parse_document(page);

    if let Some(panel) = find_error_panel(&document) {
        if mode == PollMode::Monitor && is_account_not_found(&panel.full) {
            return PageOutcome::Success(PageFacts::Reachability { available: false });
        }
        return classify_panel(panel).into();
    }

    match mode {
        PollMode::Monitor => PageOutcome::Success(PageFacts::Reachability { available: true }),
        PollMode::Content => match latest_post(&document) {
            Ok((video_id, caption)) => PageOutcome::Success(PageFacts::Content(ContentFacts {
                video_id,
                caption,
                is_live: page.contains(LIVE_BADGE_MARKER),
            })),
            Err(failure) => failure.into(),
        },
    }
}

fn find_error_panel(document: &Html) -> Option<ErrorPanel> {
    let panel = document.select(&ERROR_PANEL).next()?;

    let paragraphs: Vec<String> = panel
        .select(&PARAGRAPH)
        .map(collapse_text)
        .filter(|text| !text.is_empty())
        .collect();

    let (primary, full) = if paragraphs.is_empty() {
        let text = collapse_text(panel);
        (text.clone(), text)
    } else {
        (paragraphs[0].clone(), paragraphs.join(" | "))
    };

    Some(ErrorPanel { primary, full })
}

fn classify_panel(panel: ErrorPanel) -> PageFailure {
    match PANEL_LADDER.classify(&panel.full) {
        Some(reason) => PageFailure::new(reason),
        None => PageFailure::with_detail(FailureReason::UnknownErrorDiv, panel.primary),
    }
}

/// Walk the post list down to the newest post's id and caption.
///
/// Each step that can fail has its own reason so the statistics show
/// exactly where the markup diverged.
fn latest_post(document: &Html) -> Result<(i64, String), PageFailure> {
    let list = document
        .select(&POST_LIST)
        .next()
        .ok_or(PageFailure::new(FailureReason::UserPostItemList))?;

    let entry = list
        .children()
        .filter_map(ElementRef::wrap)
        .next()
        .ok_or(PageFailure::new(FailureReason::UserPostItemListDiv))?;

    let item = entry
        .select(&POST_ITEM)
        .next()
        .ok_or(PageFailure::new(FailureReason::UserPostItem))?;

    let href = item
        .select(&LINK)
        .next()
        .and_then(|link| link.value().attr("href"))
        .ok_or(PageFailure::new(FailureReason::NoVideoLink))?;

    let desc = entry
        .select(&POST_DESC)
        .next()
        .ok_or(PageFailure::new(FailureReason::UserPostItemDesc))?;

    let caption = desc
        .select(&TITLED_LINK)
        .next()
        .and_then(|link| link.value().attr("title"))
        .ok_or(PageFailure::new(FailureReason::NoVideoDesc))?;

    let video_id = parse_video_id(href)
        .ok_or_else(|| PageFailure::with_detail(FailureReason::FaultyVideoLink, href))?;

    Ok((video_id, caption.to_string()))
}

/// Parse the trailing numeric id of a post link such as
/// `https://www.tiktok.com/@someone/video/7301234567890123456?lang=en`.
pub fn parse_video_id(href: &str) -> Option<i64> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    last.parse::<i64>().ok().filter(|id| *id >= 0)
}

fn collapse_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
