//! URL layout of the remote catalog site.

/// Builds catalog URLs relative to a base URL (no trailing slash).
#[derive(Debug, Clone)]
pub struct SiteUrls {
    base: String,
}

impl SiteUrls {
    /// Creates the URL builder; a trailing slash on `base` is ignored.
    #[must_use]
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Listing page URL for a search key and optional page number.
    ///
    /// | key   | page | URL                          |
    /// |-------|------|------------------------------|
    /// | empty | none | `{base}/`                    |
    /// | empty | n    | `{base}/page/{n}`            |
    /// | k     | none | `{base}/search/{k}`          |
    /// | k     | n    | `{base}/search/{k}/{n}`      |
    #[must_use]
    pub fn listing(&self, search_key: &str, page: Option<usize>) -> String {
        let key = urlencoding::encode(search_key);
        match (search_key.is_empty(), page) {
            (true, None) => format!("{}/", self.base),
            (true, Some(page)) => format!("{}/page/{page}", self.base),
            (false, None) => format!("{}/search/{key}", self.base),
            (false, Some(page)) => format!("{}/search/{key}/{page}", self.base),
        }
    }

    /// Detail page URL for a site-relative path such as `/book/title/123`.
    #[must_use]
    pub fn detail(&self, path: &str) -> String {
        self.absolute(path)
    }

    /// Token lookup endpoint answering `{ok, url}`.
    #[must_use]
    pub fn lookup(&self, token: &str) -> String {
        format!("{}/download/{}", self.base, urlencoding::encode(token))
    }

    /// Joins a site-relative path onto the base URL.
    #[must_use]
    pub fn absolute(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base)
        } else {
            format!("{}/{path}", self.base)
        }
    }
}
