//! Event facade between the chat transport and the core.
//!
//! The transport (message delivery, callback buttons, membership checks)
//! lives elsewhere; it feeds events in and renders the `Page` and
//! `PutOutcome` values that come back.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::index::schema::{IncomingMedia, PutOutcome};
use crate::index::search::SearchEngine;
use crate::index::store::{MediaStore, StoreError};
use crate::session::{
    FilterAxis, InMemorySessions, Page, SessionError, SessionKey, SessionManager, SessionStore,
};

pub struct Bot {
    store: Arc<MediaStore>,
    search: SearchEngine,
    sessions: SessionManager,
    superset_cap: usize,
    empty_dwell: Duration,
}

impl Bot {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(MediaStore::open(&config.data_dir(), config.primary_max_bytes)?);
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessions::default());
        Ok(Self::new(store, sessions, config))
    }

    pub fn new(store: Arc<MediaStore>, sessions: Arc<dyn SessionStore>, config: &Config) -> Self {
        let search = SearchEngine::new(Arc::clone(&store));
        let manager = SessionManager::new(sessions, Duration::from_secs(config.result_dwell_secs));
        Self {
            store,
            search,
            sessions: manager,
            superset_cap: config.superset_cap,
            empty_dwell: Duration::from_secs(config.empty_dwell_secs),
        }
    }

    /// A media message was forwarded into an indexed channel.
    pub fn on_media_arrived(&self, media: &IncomingMedia) -> Result<PutOutcome, StoreError> {
        self.store.put(media)
    }

    /// A user sent search text; snapshot the results into a session keyed
    /// by the reply message and return the first page.
    pub fn on_search_text(
        &self,
        chat_id: i64,
        message_id: i64,
        requester: i64,
        text: &str,
    ) -> Result<Page, StoreError> {
        let query = normalize_query(text);
        let results = self.search.query(&query, None, self.superset_cap, 0)?;
        if results.records.is_empty() {
            info!(%query, "no results, returning short-dwell notice");
            return Ok(Page::empty(&query, self.empty_dwell));
        }
        let key = SessionKey { chat_id, message_id };
        Ok(self.sessions.create(key, requester, &query, results.records))
    }

    /// A filter button was pressed under a rendered result page.
    pub fn on_filter_select(
        &self,
        key: SessionKey,
        requester: i64,
        axis: FilterAxis,
        value: &str,
    ) -> Result<Page, SessionError> {
        self.sessions.apply_filter(&key, requester, axis, value).inspect_err(
            |e| warn!(chat = key.chat_id, error = %e, "filter rejected"),
        )
    }

    /// A next/back button was pressed.
    pub fn on_page_nav(
        &self,
        key: SessionKey,
        requester: i64,
        offset: usize,
    ) -> Result<Page, SessionError> {
        self.sessions.turn_page(&key, requester, offset)
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    pub fn search(&self) -> &SearchEngine {
        &self.search
    }

    /// Spawn the periodic sweep that keeps session memory bounded.
    pub fn spawn_session_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let bot = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                bot.sessions.purge_expired();
            }
        })
    }
}

/// Queries use the same separator normalization as stored names, so
/// `dune.part.two` and `dune part two` hit the same records.
fn normalize_query(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '_' | '-' | '.' | '+' | '/' | '\\' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::schema::{DescriptorParts, MediaDescriptor, MediaType};
    use tempfile::TempDir;

    fn bot(dir: &TempDir) -> Bot {
        let config = Config {
            data_dir: dir.path().display().to_string(),
            ..Config::default()
        };
        Bot::from_config(&config).unwrap()
    }

    fn media(name: &str, size: u64, media_id: i64) -> IncomingMedia {
        IncomingMedia {
            descriptor: MediaDescriptor {
                raw: format!("raw-{media_id}"),
                parts: Some(DescriptorParts {
                    kind: 4,
                    dc_id: 5,
                    media_id,
                    access_hash: media_id + 7,
                    file_reference: vec![1],
                }),
            },
            file_name: Some(name.to_string()),
            file_size: size,
            file_type: MediaType::Video,
            file_unique_id: Some(format!("u{media_id}")),
            mime_type: None,
            caption: None,
        }
    }

    #[test]
    fn search_flow_end_to_end() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir);
        bot.on_media_arrived(&media("Avengers Endgame 2019 1080p BluRay x264", 2_147_483_648, 1))
            .unwrap();
        bot.on_media_arrived(&media("The Avengers 2012", 900_000_000, 2)).unwrap();

        let page = bot.on_search_text(-100, 50, 9, "avengers").unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.records[0].file_name, "Avengers Endgame 2019 1080p BluRay x264");
        assert_eq!(page.records[1].file_name, "The Avengers 2012");

        // The rendered page is interactive through its session key.
        let key = SessionKey { chat_id: -100, message_id: 50 };
        let paged = bot.on_page_nav(key, 9, 0).unwrap();
        assert_eq!(paged.records.len(), 2);
    }

    #[test]
    fn separator_heavy_query_still_matches() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir);
        bot.on_media_arrived(&media("Dune.Part.Two.2024.1080p.mkv", 3_000, 1)).unwrap();

        let page = bot.on_search_text(1, 2, 3, "dune.part.two").unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn slash_separated_query_matches_normalized_name() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir);
        bot.on_media_arrived(&media("Heat/1995\\Remux.mkv", 3_000, 1)).unwrap();

        let page = bot.on_search_text(1, 2, 3, "heat/1995").unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn no_results_yields_short_dwell_notice_without_session() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir);

        let page = bot.on_search_text(1, 2, 3, "unobtainium").unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.dwell_secs, Config::default().empty_dwell_secs);

        let key = SessionKey { chat_id: 1, message_id: 2 };
        assert_eq!(bot.on_page_nav(key, 3, 0).unwrap_err(), SessionError::NotFound);
    }

    #[test]
    fn filter_select_round_trip() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir);
        bot.on_media_arrived(&media("Jailer 2023 tamil 720p", 5_000, 1)).unwrap();
        bot.on_media_arrived(&media("Jailer 2023 hindi 1080p", 4_000, 2)).unwrap();

        bot.on_search_text(1, 2, 3, "jailer").unwrap();
        let key = SessionKey { chat_id: 1, message_id: 2 };
        let page = bot.on_filter_select(key, 3, FilterAxis::Language, "tamil").unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.filters.language, "tamil");
    }
}
