//! Filename search across both tiers.
//!
//! Queries match against the normalized file name only. The matcher grows
//! stricter with query length: short queries are prefix matches, longer
//! ones must appear as whole release-name words. Results come back largest
//! file first, Primary before Secondary.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use super::schema::{MediaRecord, MediaType, Tier};
use super::store::{MediaStore, StoreError};

/// Language tokens offered as filter buttons by the transport.
pub const LANGUAGES: [&str; 7] =
    ["english", "tamil", "hindi", "malayalam", "telugu", "korean", "sinhala"];

/// Resolution tokens offered as filter buttons by the transport.
pub const RESOLUTIONS: [&str; 5] = ["480p", "540p", "720p", "1080p", "2160p"];

/// Characters that delimit words inside release names.
const WORD_DELIMS: &str = r" \.\+\-_";

/// True when the name carries a season/episode marker such as `s01e02`.
pub fn is_series(file_name: &str) -> bool {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let re = MARKER.get_or_init(|| Regex::new(r"s\d{1,2}e\d{1,2}").unwrap());
    re.is_match(&file_name.to_lowercase())
}

/// Compiled query predicate.
enum Matcher {
    /// Query of one or two characters: anchored prefix.
    Prefix(String),
    /// Every token must appear as a whole delimiter-bounded word.
    Words(Vec<Regex>),
    /// Fallback when pattern compilation fails: plain containment.
    Substring(String),
}

impl Matcher {
    fn build(query: &str) -> Self {
        let query = query.trim();
        if query.chars().count() <= 2 {
            return Matcher::Prefix(query.to_lowercase());
        }
        let mut patterns = Vec::new();
        for token in query.split_whitespace() {
            let pattern = format!(
                "(?i)(^|[{delims}]){token}([{delims}]|$)",
                delims = WORD_DELIMS,
                token = regex::escape(token),
            );
            match Regex::new(&pattern) {
                Ok(re) => patterns.push(re),
                Err(e) => {
                    debug!(%query, error = %e, "query pattern failed to compile, using substring");
                    return Matcher::Substring(query.to_lowercase());
                }
            }
        }
        Matcher::Words(patterns)
    }

    fn matches(&self, file_name: &str) -> bool {
        match self {
            Matcher::Prefix(prefix) => file_name.to_lowercase().starts_with(prefix),
            Matcher::Words(patterns) => patterns.iter().all(|re| re.is_match(file_name)),
            Matcher::Substring(needle) => file_name.to_lowercase().contains(needle),
        }
    }
}

/// One window of search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub records: Vec<MediaRecord>,
    /// Offset of the next window, or `None` when exhausted.
    pub next_offset: Option<usize>,
    /// Per-tier match counts summed. A file indexed under different ids in
    /// both tiers counts twice; good enough for "page N of M" rendering.
    pub total: usize,
}

pub struct SearchEngine {
    store: Arc<MediaStore>,
}

impl SearchEngine {
    pub fn new(store: Arc<MediaStore>) -> Self {
        Self { store }
    }

    /// Run a filename query over both tiers.
    ///
    /// Matches are ordered by file size descending, Primary before
    /// Secondary, with Secondary rows dropped when Primary already produced
    /// the same id. An empty query lists recently indexed files instead.
    pub fn query(
        &self,
        text: &str,
        type_filter: Option<MediaType>,
        max_results: usize,
        offset: usize,
    ) -> Result<SearchPage, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return self.recent(max_results, offset);
        }
        let matcher = Matcher::build(text);

        let mut matched: Vec<MediaRecord> = Vec::new();
        let mut total = 0usize;
        for record in self.store.scan_by_size_desc(Tier::Primary)? {
            if type_filter.is_some_and(|t| t != record.file_type) {
                continue;
            }
            if matcher.matches(&record.file_name) {
                total += 1;
                matched.push(record);
            }
        }
        let primary_ids: std::collections::HashSet<String> =
            matched.iter().map(|r| r.id.clone()).collect();
        for record in self.store.scan_by_size_desc(Tier::Secondary)? {
            if type_filter.is_some_and(|t| t != record.file_type) {
                continue;
            }
            if matcher.matches(&record.file_name) {
                total += 1;
                if !primary_ids.contains(&record.id) {
                    matched.push(record);
                }
            }
        }

        let records: Vec<MediaRecord> =
            matched.into_iter().skip(offset).take(max_results).collect();
        let next_offset = Some(offset + records.len()).filter(|&n| n < total);
        debug!(query = %text, hits = records.len(), total, "search complete");
        Ok(SearchPage { records, next_offset, total })
    }

    /// Recently indexed Primary records, newest first.
    fn recent(&self, max_results: usize, offset: usize) -> Result<SearchPage, StoreError> {
        let (records, total) = self.store.recent(offset, max_results)?;
        let total = total as usize;
        let next_offset = Some(offset + records.len()).filter(|&n| n < total);
        Ok(SearchPage { records, next_offset, total })
    }

    /// Delete every record whose name matches the query, across both tiers.
    /// Returns the number of records removed.
    pub fn delete_matching(&self, query: &str) -> Result<usize, StoreError> {
        let page = self.query(query, None, usize::MAX, 0)?;
        let mut removed = 0;
        for record in &page.records {
            removed += self.store.delete(&record.id)?;
        }
        info!(%query, removed, "purged matching records");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::schema::{DescriptorParts, IncomingMedia, MediaDescriptor};
    use tempfile::TempDir;

    fn seed(store: &MediaStore, name: &str, size: u64, media_id: i64, file_type: MediaType) {
        let media = IncomingMedia {
            descriptor: MediaDescriptor {
                raw: format!("raw-{media_id}"),
                parts: Some(DescriptorParts {
                    kind: 4,
                    dc_id: 2,
                    media_id,
                    access_hash: media_id ^ 0x5a5a,
                    file_reference: vec![9],
                }),
            },
            file_name: Some(name.to_string()),
            file_size: size,
            file_type,
            file_unique_id: Some(format!("u{media_id}")),
            mime_type: None,
            caption: None,
        };
        store.put(&media).unwrap();
    }

    #[test]
    fn whole_word_query_orders_by_size_desc() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MediaStore::open(dir.path(), 0).unwrap());
        seed(&store, "Avengers Endgame 2019 1080p BluRay x264", 2_147_483_648, 1, MediaType::Video);
        seed(&store, "The Avengers 2012", 900_000_000, 2, MediaType::Video);
        seed(&store, "Interstellar 2014", 1_500_000_000, 3, MediaType::Video);

        let engine = SearchEngine::new(store);
        let page = engine.query("avengers", None, 10, 0).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.next_offset, None);
        let names: Vec<&str> = page.records.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(
            names,
            ["Avengers Endgame 2019 1080p BluRay x264", "The Avengers 2012"]
        );
    }

    #[test]
    fn short_query_is_prefix_anchored() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MediaStore::open(dir.path(), 0).unwrap());
        seed(&store, "It 2017", 1_000, 1, MediaType::Video);
        seed(&store, "The It Crowd S01E01", 2_000, 2, MediaType::Video);

        let engine = SearchEngine::new(store);
        let page = engine.query("it", None, 10, 0).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].file_name, "It 2017");
    }

    #[test]
    fn token_must_be_word_bounded() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MediaStore::open(dir.path(), 0).unwrap());
        seed(&store, "Heat 1995 720p", 1_000, 1, MediaType::Video);
        seed(&store, "Heater Repair Guide", 2_000, 2, MediaType::Document);

        let engine = SearchEngine::new(store);
        let page = engine.query("heat", None, 10, 0).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].file_name, "Heat 1995 720p");
    }

    #[test]
    fn multi_token_query_requires_every_token() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MediaStore::open(dir.path(), 0).unwrap());
        seed(&store, "Dune Part Two 2024 2160p", 5_000, 1, MediaType::Video);
        seed(&store, "Dune 2021 1080p", 4_000, 2, MediaType::Video);

        let engine = SearchEngine::new(store);
        // Order of tokens is irrelevant.
        let page = engine.query("two dune", None, 10, 0).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].file_name, "Dune Part Two 2024 2160p");
    }

    #[test]
    fn type_filter_narrows_results() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MediaStore::open(dir.path(), 0).unwrap());
        seed(&store, "Inception 2010", 3_000, 1, MediaType::Video);
        seed(&store, "Inception 2010 Soundtrack", 1_000, 2, MediaType::Audio);

        let engine = SearchEngine::new(store);
        let page = engine.query("inception", Some(MediaType::Audio), 10, 0).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].file_type, MediaType::Audio);
    }

    #[test]
    fn secondary_matches_fill_after_primary() {
        let dir = TempDir::new().unwrap();
        // Over-quota primary: everything lands in secondary.
        let store = Arc::new(MediaStore::open(dir.path(), 1).unwrap());
        seed(&store, "Fargo S01E01 720p", 2_000, 1, MediaType::Video);

        let engine = SearchEngine::new(store);
        let page = engine.query("fargo", None, 10, 0).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total, 1);
    }

    #[test]
    fn offsets_walk_the_merged_sequence() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MediaStore::open(dir.path(), 0).unwrap());
        for i in 0..15 {
            seed(&store, &format!("Fargo Episode {i}"), 10_000 - i as u64, i as i64 + 1, MediaType::Video);
        }
        let engine = SearchEngine::new(store);

        let first = engine.query("fargo", None, 10, 0).unwrap();
        assert_eq!(first.records.len(), 10);
        assert_eq!(first.next_offset, Some(10));
        assert_eq!(first.total, 15);

        let second = engine.query("fargo", None, 10, 10).unwrap();
        assert_eq!(second.records.len(), 5);
        assert_eq!(second.next_offset, None);
    }

    #[test]
    fn empty_query_lists_recent() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MediaStore::open(dir.path(), 0).unwrap());
        seed(&store, "Blade Runner 2049", 3_000, 1, MediaType::Video);
        seed(&store, "Blade Runner 1982", 2_000, 2, MediaType::Video);

        let engine = SearchEngine::new(store);
        let page = engine.query("", None, 10, 0).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn delete_matching_purges_both_tiers() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MediaStore::open(dir.path(), 0).unwrap());
        seed(&store, "Fargo S01E01", 2_000, 1, MediaType::Video);
        seed(&store, "Fargo S01E02", 1_900, 2, MediaType::Video);
        seed(&store, "True Detective S01E01", 1_800, 3, MediaType::Video);

        let engine = SearchEngine::new(Arc::clone(&store));
        assert_eq!(engine.delete_matching("fargo").unwrap(), 2);
        assert_eq!(store.stats().unwrap().primary_count, 1);
    }

    #[test]
    fn series_marker_detection() {
        assert!(is_series("The Wire S01E02 720p"));
        assert!(is_series("fargo s1e1"));
        assert!(!is_series("Dune Part Two 2024"));
        assert!(!is_series("Session 9 2001"));
    }
}
