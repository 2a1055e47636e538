//! Cookie header sourced from `cookie.txt`.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::Result;
use crate::utils::fs::read_trimmed;

/// The `Cookie` header value sent with every page request.
///
/// The file holds the raw header value. Reloads swap the value only when the
/// file content changed; a failed read keeps the previous value.
#[derive(Debug)]
pub struct CookieJar {
    path: PathBuf,
    value: RwLock<Arc<str>>,
}

impl CookieJar {
    /// Create a jar and read the file once. A missing file yields no cookies.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let value = read_trimmed(&path).await?.unwrap_or_default();
        if value.is_empty() {
            warn!(path = %path.display(), "No cookies loaded; requests go out anonymous");
        } else {
            info!(path = %path.display(), "Loaded cookies");
        }
        Ok(Self {
            path,
            value: RwLock::new(Arc::from(value)),
        })
    }

    /// Current header value; empty when no cookies are configured.
    pub fn current(&self) -> Arc<str> {
        self.value.read().clone()
    }

    /// Re-read the file. Returns `true` when the value changed.
    pub async fn reload(&self) -> Result<bool> {
        let fresh = read_trimmed(&self.path).await?.unwrap_or_default();
        if *self.value.read().as_ref() == fresh {
            debug!("Cookies unchanged");
            return Ok(false);
        }
        *self.value.write() = Arc::from(fresh);
        Ok(true)
    }
}
