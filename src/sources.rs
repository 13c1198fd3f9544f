// src/sources.rs
//
// Canonicalizes and deduplicates discovered web sources. The registry is
// append-only: a canonical URL is stored once, in first-registration order,
// and later occurrences only merge newly available content into the
// existing entry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// A source candidate as returned by the search or extraction provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub url: String,
    pub title: String,
    pub snippet: Option<String>,
}

/// A registered source. `canonical_url` is unique within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItem {
    pub url: String,
    pub canonical_url: String,
    pub title: String,
    pub snippet: Option<String>,
    pub extracted_content: Option<String>,
}

/// Result of a registration attempt. `is_new` marks candidates eligible
/// for extraction this iteration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub is_new: bool,
    pub item: SourceItem,
}

#[derive(Debug, Default)]
pub struct SourceRegistry {
    // canonical url -> index into `items`
    index: HashMap<String, usize>,
    items: Vec<SourceItem>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a candidate. Unseen canonical URLs are stored and returned
    /// with `is_new = true`; repeats merge content into the existing entry.
    pub fn register(&mut self, candidate: SourceCandidate) -> Registration {
        let canonical = match canonicalize_url(&candidate.url) {
            Some(c) => c,
            // Unparseable URLs dedupe on their raw trimmed form
            None => candidate.url.trim().to_string(),
        };

        if let Some(&idx) = self.index.get(&canonical) {
            let existing = &mut self.items[idx];
            // Merge: fill in whatever the earlier occurrence lacked
            if existing.snippet.is_none() {
                existing.snippet = candidate.snippet;
            }
            if existing.title.is_empty() && !candidate.title.is_empty() {
                existing.title = candidate.title;
            }
            debug!(canonical = %canonical, "source already registered, merged");
            return Registration {
                is_new: false,
                item: existing.clone(),
            };
        }

        let item = SourceItem {
            url: candidate.url,
            canonical_url: canonical.clone(),
            title: candidate.title,
            snippet: candidate.snippet,
            extracted_content: None,
        };
        self.index.insert(canonical, self.items.len());
        self.items.push(item.clone());
        Registration { is_new: true, item }
    }

    /// Attach extracted page content to an already registered source.
    pub fn attach_content(&mut self, canonical_url: &str, content: String) {
        if let Some(&idx) = self.index.get(canonical_url) {
            self.items[idx].extracted_content = Some(content);
        }
    }

    /// All sources, ordered by first registration.
    pub fn all_sources(&self) -> &[SourceItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Sources whose content was successfully extracted, i.e. the ones
    /// shared with the observer via source-delta events.
    pub fn extracted_count(&self) -> usize {
        self.items.iter().filter(|s| s.extracted_content.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Compact text rendering used in planner and synthesis prompts.
    pub fn digest(&self) -> String {
        self.items
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mut line = format!("{}. {} <{}>", i + 1, s.title, s.url);
                if let Some(snippet) = &s.snippet {
                    line.push_str(&format!("\n   {}", snippet));
                }
                if let Some(content) = &s.extracted_content {
                    let preview: String = content.chars().take(1500).collect();
                    line.push_str(&format!("\n   extracted: {}", preview));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Normalize a URL into its deduplication key: lowercase host, stripped
/// fragment, no trailing slash, query pairs sorted by key then value.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw.trim()).ok()?;
    parsed.set_fragment(None);

    let host = parsed.host_str()?.to_lowercase();
    let path = parsed.path().trim_end_matches('/');

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let mut canonical = format!("{}://{}{}", parsed.scheme(), host, path);
    if let Some(port) = parsed.port() {
        canonical = format!("{}://{}:{}{}", parsed.scheme(), host, port, path);
    }
    if !pairs.is_empty() {
        let query = pairs
            .iter()
            .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{}={}", k, v) })
            .collect::<Vec<_>>()
            .join("&");
        canonical.push_str(&format!("?{}", query));
    }
    Some(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str) -> SourceCandidate {
        SourceCandidate {
            url: url.to_string(),
            title: "Title".to_string(),
            snippet: Some("snippet".to_string()),
        }
    }

    #[test]
    fn test_canonicalize_lowercases_host() {
        assert_eq!(
            canonicalize_url("https://Example.COM/Page"),
            Some("https://example.com/Page".to_string())
        );
    }

    #[test]
    fn test_canonicalize_strips_fragment_and_trailing_slash() {
        assert_eq!(
            canonicalize_url("https://example.com/docs/#section"),
            Some("https://example.com/docs".to_string())
        );
    }

    #[test]
    fn test_canonicalize_sorts_query_params() {
        assert_eq!(
            canonicalize_url("https://example.com/search?b=2&a=1"),
            canonicalize_url("https://example.com/search?a=1&b=2"),
        );
    }

    #[test]
    fn test_register_dedupes_case_and_query_order() {
        let mut registry = SourceRegistry::new();
        let first = registry.register(candidate("https://Example.com/page?x=1&y=2"));
        assert!(first.is_new);

        let second = registry.register(candidate("https://example.com/page/?y=2&x=1"));
        assert!(!second.is_new);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_merge_fills_missing_snippet() {
        let mut registry = SourceRegistry::new();
        registry.register(SourceCandidate {
            url: "https://example.com/a".into(),
            title: "A".into(),
            snippet: None,
        });
        let merged = registry.register(SourceCandidate {
            url: "https://example.com/a".into(),
            title: "A".into(),
            snippet: Some("now with snippet".into()),
        });
        assert!(!merged.is_new);
        assert_eq!(merged.item.snippet.as_deref(), Some("now with snippet"));
    }

    #[test]
    fn test_emission_order_is_first_registration() {
        let mut registry = SourceRegistry::new();
        registry.register(candidate("https://example.com/first"));
        registry.register(candidate("https://example.com/second"));
        registry.register(candidate("https://example.com/first")); // repeat

        let urls: Vec<_> = registry.all_sources().iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/first", "https://example.com/second"]);
    }

    #[test]
    fn test_attach_content() {
        let mut registry = SourceRegistry::new();
        let reg = registry.register(candidate("https://example.com/a"));
        registry.register(candidate("https://example.com/b"));
        assert_eq!(registry.extracted_count(), 0);

        registry.attach_content(&reg.item.canonical_url, "full page text".into());
        assert_eq!(
            registry.all_sources()[0].extracted_content.as_deref(),
            Some("full page text")
        );
        assert_eq!(registry.extracted_count(), 1);
    }

    #[test]
    fn test_unparseable_url_still_dedupes() {
        let mut registry = SourceRegistry::new();
        assert!(registry.register(candidate("not a url")).is_new);
        assert!(!registry.register(candidate("  not a url ")).is_new);
    }
}
