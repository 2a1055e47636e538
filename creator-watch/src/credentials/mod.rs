//! Credentials: page cookies and chat bot secrets.

mod cookies;

pub use cookies::CookieJar;

use std::path::Path;

use tracing::debug;

use crate::Result;
use crate::utils::fs::read_trimmed;

/// Resolve a secret from the environment value, else the first line of `file`.
pub async fn resolve_secret(from_env: Option<String>, file: &Path) -> Result<Option<String>> {
    if let Some(value) = from_env.filter(|v| !v.is_empty()) {
        return Ok(Some(value));
    }
    let Some(contents) = read_trimmed(file).await? else {
        debug!(path = %file.display(), "No secret file");
        return Ok(None);
    };
    Ok(contents
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string))
}
