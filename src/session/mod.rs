//! Per-conversation search sessions.
//!
//! A search snapshot lives in memory keyed by the chat and the message the
//! results were rendered under. Filter clicks recompute the visible view
//! from the original snapshot (never from the previous view), page clicks
//! move a cursor over it. Sessions expire after a dwell window and a
//! periodic sweep reclaims them.

mod memory;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::index::schema::{MediaRecord, MediaType};
use crate::index::search::is_series;

pub use memory::InMemorySessions;

/// Results rendered per page.
pub const PAGE_SIZE: usize = 10;

/// Wildcard filter value.
pub const ANY: &str = "any";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAxis {
    Language,
    Resolution,
    Category,
}

/// One value per filter axis; `"any"` leaves the axis unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub language: String,
    pub resolution: String,
    pub category: String,
}

impl Default for FilterSelection {
    fn default() -> Self {
        Self { language: ANY.into(), resolution: ANY.into(), category: ANY.into() }
    }
}

impl FilterSelection {
    fn with(&self, axis: FilterAxis, value: &str) -> Self {
        let mut next = self.clone();
        match axis {
            FilterAxis::Language => next.language = value.to_lowercase(),
            FilterAxis::Resolution => next.resolution = value.to_lowercase(),
            FilterAxis::Category => next.category = value.to_lowercase(),
        }
        next
    }

    /// AND over the three axes. Language and resolution are substring
    /// checks on the lowercased name; category uses the season/episode
    /// marker.
    pub fn passes(&self, file_name: &str) -> bool {
        let name = file_name.to_lowercase();
        if self.language != ANY && !name.contains(&self.language) {
            return false;
        }
        if self.resolution != ANY && !name.contains(&self.resolution) {
            return false;
        }
        match self.category.as_str() {
            ANY => true,
            "series" => is_series(file_name),
            _ => !is_series(file_name),
        }
    }
}

/// Mutable per-conversation state behind the session store.
pub struct SearchSession {
    pub query: String,
    /// Requester that owns this rendering; 0 means anyone may interact.
    pub owner: i64,
    /// Immutable snapshot taken at query time.
    superset: Arc<Vec<MediaRecord>>,
    pub filters: FilterSelection,
    /// Indices into `superset` passing the active filters.
    view: Vec<usize>,
    pub cursor: usize,
    expires_at: Instant,
}

impl SearchSession {
    fn expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// The row shape the transport renders as a result button.
#[derive(Debug, Clone, Serialize)]
pub struct PageEntry {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: MediaType,
}

impl From<&MediaRecord> for PageEntry {
    fn from(record: &MediaRecord) -> Self {
        Self {
            id: record.id.clone(),
            file_name: record.file_name.clone(),
            file_size: record.file_size,
            file_type: record.file_type,
        }
    }
}

/// One rendered page of a session's filtered view.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub query: String,
    pub records: Vec<PageEntry>,
    pub next_offset: Option<usize>,
    pub prev_offset: Option<usize>,
    /// Size of the filtered view.
    pub total: usize,
    pub filters: FilterSelection,
    /// How long the transport should leave this rendering up.
    pub dwell_secs: u64,
}

impl Page {
    pub fn has_next(&self) -> bool {
        self.next_offset.is_some()
    }

    pub fn has_prev(&self) -> bool {
        self.prev_offset.is_some()
    }

    /// Empty notice page for a query that matched nothing.
    pub fn empty(query: &str, dwell: Duration) -> Self {
        Self {
            query: query.to_string(),
            records: Vec::new(),
            next_offset: None,
            prev_offset: None,
            total: 0,
            filters: FilterSelection::default(),
            dwell_secs: dwell.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("that result message has expired, please repeat your search")]
    NotFound,
    #[error("this search belongs to someone else")]
    NotYours,
    #[error("no results match the selected filters")]
    FilterYieldsEmpty,
}

/// Pluggable session map. Entries are independently locked so distinct
/// conversations never block each other.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &SessionKey) -> Option<Arc<Mutex<SearchSession>>>;
    fn set(&self, key: SessionKey, session: SearchSession);
    fn remove(&self, key: &SessionKey);
    /// Drop expired sessions, returning how many were reclaimed.
    fn purge_expired(&self, now: Instant) -> usize;
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    dwell: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, dwell: Duration) -> Self {
        Self { store, dwell }
    }

    /// Snapshot a query's results and return the first page.
    pub fn create(
        &self,
        key: SessionKey,
        owner: i64,
        query: &str,
        superset: Vec<MediaRecord>,
    ) -> Page {
        let superset = Arc::new(superset);
        let session = SearchSession {
            query: query.to_string(),
            owner,
            view: (0..superset.len()).collect(),
            superset,
            filters: FilterSelection::default(),
            cursor: 0,
            expires_at: Instant::now() + self.dwell,
        };
        let page = render(&session, 0, self.dwell);
        debug!(chat = key.chat_id, message = key.message_id, results = page.total, "session created");
        self.store.set(key, session);
        page
    }

    /// Set one filter axis and re-derive the view from the snapshot.
    /// Rejects without touching state when the result would be empty.
    pub fn apply_filter(
        &self,
        key: &SessionKey,
        requester: i64,
        axis: FilterAxis,
        value: &str,
    ) -> Result<Page, SessionError> {
        let entry = self.store.get(key).ok_or(SessionError::NotFound)?;
        let mut session = entry.lock();
        authorize(&session, requester)?;

        let candidate = session.filters.with(axis, value);
        let view: Vec<usize> = session
            .superset
            .iter()
            .enumerate()
            .filter(|(_, record)| candidate.passes(&record.file_name))
            .map(|(i, _)| i)
            .collect();
        if view.is_empty() {
            return Err(SessionError::FilterYieldsEmpty);
        }

        session.filters = candidate;
        session.view = view;
        session.cursor = 0;
        session.expires_at = Instant::now() + self.dwell;
        Ok(render(&session, 0, self.dwell))
    }

    /// Move the page cursor to `offset` within the filtered view.
    pub fn turn_page(
        &self,
        key: &SessionKey,
        requester: i64,
        offset: usize,
    ) -> Result<Page, SessionError> {
        let entry = self.store.get(key).ok_or(SessionError::NotFound)?;
        let mut session = entry.lock();
        authorize(&session, requester)?;

        session.cursor = offset;
        session.expires_at = Instant::now() + self.dwell;
        Ok(render(&session, offset, self.dwell))
    }

    /// Reclaim sessions whose dwell window has passed.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(Instant::now())
    }
}

fn authorize(session: &SearchSession, requester: i64) -> Result<(), SessionError> {
    if session.owner != 0 && requester != session.owner {
        return Err(SessionError::NotYours);
    }
    Ok(())
}

fn render(session: &SearchSession, offset: usize, dwell: Duration) -> Page {
    let total = session.view.len();
    let records: Vec<PageEntry> = session
        .view
        .iter()
        .skip(offset)
        .take(PAGE_SIZE)
        .map(|&i| PageEntry::from(&session.superset[i]))
        .collect();
    let next_offset = Some(offset + PAGE_SIZE).filter(|&n| n < total);
    let prev_offset = (offset > 0).then(|| offset.saturating_sub(PAGE_SIZE));
    Page {
        query: session.query.clone(),
        records,
        next_offset,
        prev_offset,
        total,
        filters: session.filters.clone(),
        dwell_secs: dwell.as_secs(),
    }
}
