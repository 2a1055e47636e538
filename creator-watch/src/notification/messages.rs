//! Subscriber-facing message text.

use crate::state::Change;

pub const PROFILE_BASE_URL: &str = "https://www.tiktok.com/@";

pub fn profile_url(account: &str) -> String {
    format!("{PROFILE_BASE_URL}{account}")
}

pub fn video_url(account: &str, video_id: i64) -> String {
    format!("{PROFILE_BASE_URL}{account}/video/{video_id}")
}

pub fn live_url(account: &str) -> String {
    format!("{PROFILE_BASE_URL}{account}/live")
}

pub fn render(account: &str, change: &Change) -> String {
    match change {
        Change::NewUpload { video_id, .. } => format!(
            "New upload from `@{account}`! <{}>",
            video_url(account, *video_id)
        ),
        Change::VideoRemoved { video_id } => format!(
            "`@{account}`'s latest upload <{}> was made unavailable!",
            video_url(account, *video_id)
        ),
        Change::WentLive => format!("`@{account}` went LIVE! <{}>", live_url(account)),
        Change::BecameAvailable => {
            format!("`@{account}` is now available! <{}>", profile_url(account))
        }
        Change::BecameUnavailable => format!("`@{account}` is no longer available!"),
    }
}
