//! Link discovery helpers
//!
//! Pure functions over URLs: comparison-key normalization, the ordered
//! deduplicated set of same-origin candidates discovered on a page, and
//! the filename sanitizer for path-derived artifact names.

use url::Url;

/// Characters stripped from URL paths when deriving artifact filenames.
/// Runs of any of these collapse into a single underscore.
const FILENAME_STRIP: &[char] = &['\\', '/', ':', '"', '*', '?', '<', '>', '|'];

/// Trim a single trailing slash off a raw URL string.
///
/// Used to canonicalize client input before parsing; a bare origin like
/// `https://example.com/` and `https://example.com` name the same page.
pub fn strip_trailing_slash(raw: &str) -> &str {
    raw.strip_suffix('/').unwrap_or(raw)
}

/// Whether a parsed URL is a navigable capture target.
///
/// Filters out `javascript:`, `mailto:`, `tel:` and other pseudo-scheme
/// anchors that a browser would not treat as page navigations.
pub fn is_navigable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Comparison key for deduplication: fragment dropped, trailing slash
/// trimmed, case-folded. Two URLs with equal keys name the same page
/// for capture purposes.
pub fn normalize_key(url: &Url) -> String {
    let mut u = url.clone();
    u.set_fragment(None);
    strip_trailing_slash(u.as_str()).to_lowercase()
}

/// Whether two URLs share scheme, host and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// The deduplicated, normalized set of same-origin anchors discovered
/// on the main page, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct LinkSet {
    links: Vec<Url>,
}

impl LinkSet {
    /// Build the candidate set from raw anchor hrefs.
    ///
    /// Keeps only parsable http(s) URLs sharing the home page's origin,
    /// drops fragment-only variants and duplicates while preserving
    /// discovery order, and excludes the home page itself.
    pub fn collect<I, S>(home: &Url, hrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let home_key = normalize_key(home);
        let mut seen = Vec::new();
        let mut links = Vec::new();

        for href in hrefs {
            let href = href.as_ref().trim();
            if href.is_empty() {
                continue;
            }
            let Ok(url) = Url::parse(href) else {
                continue;
            };
            if !is_navigable(&url) || !same_origin(home, &url) {
                continue;
            }
            let key = normalize_key(&url);
            if key == home_key || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            links.push(url);
        }

        Self { links }
    }

    /// Candidates in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.links.iter()
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no candidate survived filtering.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Derive an artifact filename stem from a sub-page URL.
///
/// Takes the URL with its origin prefix removed and collapses runs of
/// `\ / : " * ? < > |` into single underscores. Returns `None` when
/// nothing printable remains, so the caller can fall back to a
/// positional `page_<n>` name.
pub fn sanitize_filename(link: &Url) -> Option<String> {
    let origin = link.origin().ascii_serialization();
    let relative = link.as_str().strip_prefix(&origin).unwrap_or(link.as_str());

    let mut name = String::with_capacity(relative.len());
    let mut in_run = false;
    for ch in relative.chars() {
        if FILENAME_STRIP.contains(&ch) {
            if !in_run {
                name.push('_');
                in_run = true;
            }
        } else {
            name.push(ch);
            in_run = false;
        }
    }

    let trimmed = name.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_strip_trailing_slash() {
        assert_eq!(strip_trailing_slash("https://a.com/"), "https://a.com");
        assert_eq!(strip_trailing_slash("https://a.com"), "https://a.com");
        assert_eq!(strip_trailing_slash("https://a.com/x/"), "https://a.com/x");
    }

    #[test]
    fn test_is_navigable() {
        assert!(is_navigable(&url("https://a.com")));
        assert!(is_navigable(&url("http://a.com")));
        assert!(!is_navigable(&url("javascript:void(0)")));
        assert!(!is_navigable(&url("mailto:x@a.com")));
        assert!(!is_navigable(&url("file:///etc/passwd")));
    }

    #[test]
    fn test_normalize_key_drops_fragment_and_slash() {
        assert_eq!(
            normalize_key(&url("https://A.com/About/#team")),
            "https://a.com/about"
        );
        assert_eq!(
            normalize_key(&url("https://a.com/about")),
            normalize_key(&url("https://a.com/about/"))
        );
    }

    #[test]
    fn test_same_origin() {
        assert!(same_origin(&url("https://a.com/x"), &url("https://a.com/y")));
        assert!(!same_origin(&url("https://a.com"), &url("http://a.com")));
        assert!(!same_origin(&url("https://a.com"), &url("https://b.com")));
        assert!(!same_origin(
            &url("https://a.com"),
            &url("https://a.com:8443")
        ));
    }

    #[test]
    fn test_link_set_filters_and_orders() {
        let home = url("https://a.com");
        let set = LinkSet::collect(
            &home,
            [
                "https://a.com/first",
                "https://b.com/elsewhere",
                "javascript:void(0)",
                "https://a.com/second",
                "https://a.com/first#frag",
                "https://a.com/first/",
                "",
                "https://a.com/",
            ],
        );

        let collected: Vec<&str> = set.iter().map(|u| u.as_str()).collect();
        assert_eq!(collected, vec!["https://a.com/first", "https://a.com/second"]);
    }

    #[test]
    fn test_link_set_excludes_home() {
        let home = url("https://a.com/start");
        let set = LinkSet::collect(
            &home,
            ["https://a.com/start#top", "https://a.com/start/", "https://a.com/other"],
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().as_str(), "https://a.com/other");
    }

    #[test]
    fn test_link_set_empty_input() {
        let set = LinkSet::collect(&url("https://a.com"), Vec::<String>::new());
        assert!(set.is_empty());
    }

    #[test]
    fn test_sanitize_filename_basic() {
        assert_eq!(
            sanitize_filename(&url("https://a.com/about")),
            Some("_about".to_string())
        );
        assert_eq!(
            sanitize_filename(&url("https://a.com/docs/intro")),
            Some("_docs_intro".to_string())
        );
    }

    #[test]
    fn test_sanitize_filename_collapses_runs() {
        assert_eq!(
            sanitize_filename(&url("https://a.com/a//b")),
            Some("_a_b".to_string())
        );
    }

    #[test]
    fn test_sanitize_filename_empty_falls_back() {
        assert_eq!(sanitize_filename(&url("https://a.com/")), None);
        assert_eq!(sanitize_filename(&url("https://a.com")), None);
    }

    #[test]
    fn test_sanitize_filename_query() {
        assert_eq!(
            sanitize_filename(&url("https://a.com/search?q=x")),
            Some("_search_q=x".to_string())
        );
    }

    proptest! {
        /// The candidate set never contains duplicates and never the
        /// normalized home URL, whatever anchors the page serves.
        #[test]
        fn prop_link_set_deduped_and_home_free(
            paths in proptest::collection::vec("[a-z0-9/#]{0,12}", 0..24)
        ) {
            let home = url("https://example.com");
            let hrefs: Vec<String> = paths
                .iter()
                .map(|p| format!("https://example.com/{}", p))
                .collect();
            let set = LinkSet::collect(&home, &hrefs);

            let keys: Vec<String> = set.iter().map(normalize_key).collect();
            let mut unique = keys.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(keys.len(), unique.len());

            let home_key = normalize_key(&home);
            prop_assert!(!keys.contains(&home_key));
        }
    }
}
