//! Deterministic, stateless link-rejection gate (§4.2).
//!
//! A fixed config struct, a handful of named rejection predicates, one
//! `should_reject` entry point: domain/path/extension blocklisting for
//! relevance filtering rather than network-safety filtering.

use regex::Regex;
use url::Url;

/// Configuration for [`LinkFilter`]. Defaults reject the generic noise
/// (social media, search engines, legal/help pages, archive/media files)
/// that the worker would otherwise waste a fetch on.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    blocked_host_suffixes: Vec<String>,
    blocked_path_patterns: Vec<Regex>,
    blocked_extensions: Vec<String>,
}

impl Default for LinkFilter {
    fn default() -> Self {
        Self {
            blocked_host_suffixes: vec![
                "facebook.com".into(),
                "twitter.com".into(),
                "x.com".into(),
                "instagram.com".into(),
                "tiktok.com".into(),
                "linkedin.com".into(),
                "reddit.com".into(),
                "youtube.com".into(),
                "google.com".into(),
                "bing.com".into(),
                "duckduckgo.com".into(),
                "wikipedia.org".into(),
                "pinterest.com".into(),
            ],
            blocked_path_patterns: [
                r"(?i)/login(/|$)",
                r"(?i)/signin(/|$)",
                r"(?i)/signup(/|$)",
                r"(?i)/register(/|$)",
                r"(?i)/(terms|privacy|legal|cookie-policy)(/|$)",
                r"(?i)/help(/|$)",
                r"(?i)/search\?",
                r"(?i)/cart(/|$)",
            ]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect(),
            blocked_extensions: vec![
                "zip".into(), "tar".into(), "gz".into(), "rar".into(), "7z".into(),
                "exe".into(), "dmg".into(), "apk".into(),
                "mp3".into(), "mp4".into(), "avi".into(), "mov".into(), "wav".into(),
                "jpg".into(), "jpeg".into(), "png".into(), "gif".into(), "svg".into(), "webp".into(),
                "css".into(), "js".into(),
            ],
        }
    }
}

impl LinkFilter {
    /// Construct a filter with the default rejection lists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fast, stateless rejection check. A malformed URL is always rejected.
    pub fn should_reject(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return true,
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            return true;
        }

        let host = match parsed.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return true,
        };
        if self
            .blocked_host_suffixes
            .iter()
            .any(|suffix| host == *suffix || host.ends_with(&format!(".{suffix}")))
        {
            return true;
        }

        let path = parsed.path();
        let path_and_query = match parsed.query() {
            Some(q) => format!("{path}?{q}"),
            None => path.to_string(),
        };
        if self
            .blocked_path_patterns
            .iter()
            .any(|re| re.is_match(&path_and_query))
        {
            return true;
        }

        if let Some(ext) = path.rsplit('.').next() {
            if path.contains('.') && self.blocked_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
                return true;
            }
        }

        false
    }

    /// Queue pressure, clamped to `[0.0, 1.0]` (§4.2).
    pub fn queue_pressure(queue_size: usize, max_queue_size: usize) -> f64 {
        if max_queue_size == 0 {
            return 1.0;
        }
        (queue_size as f64 / max_queue_size as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_url() {
        let f = LinkFilter::new();
        assert!(f.should_reject("not a url"));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let f = LinkFilter::new();
        assert!(f.should_reject("ftp://example.com/file"));
        assert!(f.should_reject("mailto:a@example.com"));
    }

    #[test]
    fn rejects_blocked_host_suffix() {
        let f = LinkFilter::new();
        assert!(f.should_reject("https://www.facebook.com/somepage"));
        assert!(f.should_reject("https://en.wikipedia.org/wiki/Foo"));
    }

    #[test]
    fn rejects_blocked_path() {
        let f = LinkFilter::new();
        assert!(f.should_reject("https://example.com/login"));
        assert!(f.should_reject("https://example.com/privacy"));
    }

    #[test]
    fn rejects_blocked_extension() {
        let f = LinkFilter::new();
        assert!(f.should_reject("https://example.com/report.pdf.zip"));
        assert!(f.should_reject("https://example.com/banner.jpg"));
    }

    #[test]
    fn accepts_plausible_page() {
        let f = LinkFilter::new();
        assert!(!f.should_reject("https://www.examplepharma.com/pipeline/bms-986158"));
    }

    #[test]
    fn queue_pressure_clamps_to_one() {
        assert_eq!(LinkFilter::queue_pressure(500, 100), 1.0);
        assert_eq!(LinkFilter::queue_pressure(50, 100), 0.5);
        assert_eq!(LinkFilter::queue_pressure(0, 0), 1.0);
    }
}
