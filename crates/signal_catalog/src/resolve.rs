//! Url -> root url resolution

use crate::cache::CatalogCache;

/// Group url of `url`: its first three dot segments
///
/// Empty when `url` has fewer than three segments.
pub fn group_url(url: &str) -> &str {
    let mut dots = url.match_indices('.').map(|(pos, _)| pos);
    match (dots.next(), dots.next(), dots.next()) {
        (Some(_), Some(_), Some(third)) => &url[..third],
        (Some(_), Some(_), None) => url,
        _ => "",
    }
}

/// Remove `[n]` array indices from `url`
pub fn strip_indices(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let mut rest = url;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        match tail.find(']') {
            Some(close) if tail[..close].bytes().all(|b| b.is_ascii_digit()) => {
                rest = &tail[close + 1..];
            }
            _ => {
                out.push('[');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// `candidate` extends `url` at a segment boundary
fn extends_at_dot(candidate: &str, url: &str) -> bool {
    candidate
        .strip_prefix(url)
        .is_some_and(|rest| rest.starts_with('.'))
}

impl CatalogCache {
    /// Resolve `url` to the root url of a known topic, memoising the result
    ///
    /// Lookup order: memoised urls, the url itself, its group url, roots that
    /// extend the url at a dot, then progressively longer dot prefixes of the
    /// url with array indices stripped.
    pub(crate) fn resolve_root(&mut self, url: &str) -> Option<String> {
        if url.is_empty() {
            return None;
        }

        if let Some(root) = self.url_cache.get(url) {
            if self.roots.contains_key(root) {
                return Some(root.clone());
            }
        }

        let root = self.find_root(url)?;
        self.memoise(url, &root);
        Some(root)
    }

    fn find_root(&self, url: &str) -> Option<String> {
        if self.roots.contains_key(url) {
            return Some(url.to_string());
        }

        let group = group_url(url);
        if !group.is_empty() && self.roots.contains_key(group) {
            return Some(group.to_string());
        }

        if let Some(root) = self.roots.keys().find(|root| extends_at_dot(root, url)) {
            return Some(root.clone());
        }

        let stripped = strip_indices(url);
        let mut prefix_end = 0;
        for segment in stripped.split('.') {
            prefix_end += segment.len();
            let prefix = &stripped[..prefix_end];
            if self.roots.contains_key(prefix) {
                return Some(prefix.to_string());
            }
            prefix_end += 1;
        }
        None
    }

    fn memoise(&mut self, url: &str, root: &str) {
        let Some(topic) = self.roots.get(root).map(|record| record.topic.to_string()) else {
            return;
        };
        if self
            .url_cache
            .insert(url.to_string(), root.to_string())
            .is_none()
        {
            self.topic_urls
                .entry(topic)
                .or_default()
                .push(url.to_string());
        }
    }
}
