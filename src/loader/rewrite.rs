use reqwest::Url;

use crate::common::errors::{LoadError, LoadResult};

/// Wraps origin URLs with a marker prefix so the playback engine hands them
/// to the loader, and strips it again to recover the origin URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRewriter {
    prefix: String,
}

impl UrlRewriter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn wrap(&self, origin: &str) -> String {
        format!("{}{}", self.prefix, origin)
    }

    pub fn is_proxied(&self, url: &str) -> bool {
        !self.prefix.is_empty() && url.starts_with(&self.prefix)
    }

    /// Recovers the origin URL. URLs without the prefix are taken as-is.
    pub fn unwrap(&self, url: &str) -> LoadResult<Url> {
        let origin = if self.is_proxied(url) {
            &url[self.prefix.len()..]
        } else {
            url
        };
        Url::parse(origin).map_err(|e| LoadError::InvalidUrl(format!("{}: {}", origin, e)))
    }
}
