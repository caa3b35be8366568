//! Two-tier persistent media store.
//!
//! Primary takes every write until it hits the configured byte cap; from
//! then on new records overflow into Secondary. Reads always consult
//! Primary first. Dedup is by the `(file_name, file_size)` natural key: a
//! re-upload with a reissued platform identifier replaces the stale key in
//! place instead of creating a second record.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode};
use tracing::{debug, info, warn};

use super::fileid;
use super::schema::{IncomingMedia, MediaRecord, MediaType, PutOutcome, StoreStats, Tier};

/// Store-level failures surfaced to the caller. Quota overflow and
/// identifier conflicts are handled inside `put` and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("media store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Outcome of a raw tier insert, before `put` decides what it means.
enum InsertOutcome {
    Inserted,
    /// Primary-key collision: the id already names a different record.
    IdConflict,
    /// SQLITE_FULL — treated as quota-class, same as the byte cap.
    Full,
}

pub struct MediaStore {
    primary: TierDb,
    secondary: TierDb,
    /// Byte cap for the Primary database file; 0 disables the cap.
    primary_max_bytes: u64,
    /// Serializes `put` so two concurrent saves of the same natural key
    /// cannot both miss the dedup lookup.
    put_gate: Mutex<()>,
}

impl MediaStore {
    /// Open (or create) both tier databases under `data_dir`.
    pub fn open(data_dir: &Path, primary_max_bytes: u64) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", data_dir.display())))?;
        let primary = TierDb::open(Tier::Primary, &data_dir.join("primary.db"))?;
        let secondary = TierDb::open(Tier::Secondary, &data_dir.join("secondary.db"))?;
        Ok(Self { primary, secondary, primary_max_bytes, put_gate: Mutex::new(()) })
    }

    /// Index one incoming media event.
    pub fn put(&self, media: &IncomingMedia) -> Result<PutOutcome, StoreError> {
        let id = match &media.descriptor.parts {
            Some(p) => fileid::pack_file_id(p.kind, p.dc_id, p.media_id, p.access_hash),
            None => {
                // Degraded mode: the platform handle did not decode into the
                // expected layout, so the raw string becomes the key as-is.
                warn!(raw = %media.descriptor.raw, "file id not decodable, storing raw handle");
                media.descriptor.raw.clone()
            }
        };

        let file_name = normalize_file_name(
            media.file_name.as_deref(),
            media.file_unique_id.as_deref(),
            media.file_type,
        );

        let record = MediaRecord {
            id,
            file_name,
            file_size: media.file_size,
            file_type: media.file_type,
            file_unique_id: media.file_unique_id.clone(),
            mime_type: media.mime_type.clone(),
            caption: media.caption.clone(),
            added_at: Utc::now(),
        };

        let _gate = self.put_gate.lock();

        // Natural-key dedup: Primary first, first hit wins.
        let existing = match self.primary.find_natural(&record.file_name, record.file_size)? {
            Some(found) => Some((found, Tier::Primary)),
            None => self
                .secondary
                .find_natural(&record.file_name, record.file_size)?
                .map(|found| (found, Tier::Secondary)),
        };

        if let Some((found, tier)) = existing {
            if found.id == record.id {
                debug!(name = %record.file_name, "already indexed with current id");
                return Ok(PutOutcome::Unchanged);
            }
            // The platform reissued the handle for the same logical file:
            // swap the stale key for the fresh one, in the tier it occupied.
            let tier_db = self.tier_db(tier);
            tier_db.delete(&found.id)?;
            match tier_db.insert(&record)? {
                InsertOutcome::Inserted => {
                    info!(name = %record.file_name, tier = tier.as_str(), "refreshed stale file id");
                    Ok(PutOutcome::Refreshed { old_id: found.id, new_id: record.id, tier })
                }
                InsertOutcome::IdConflict => Ok(PutOutcome::DuplicateConflict),
                // The occupied tier ran out of room for the replacement;
                // the natural key is still preserved, just displaced.
                InsertOutcome::Full => match self.overflow_insert(&record)? {
                    PutOutcome::Created { tier } => {
                        info!(name = %record.file_name, "refresh displaced to secondary");
                        Ok(PutOutcome::Refreshed { old_id: found.id, new_id: record.id, tier })
                    }
                    other => Ok(other),
                },
            }
        } else {
            if self.primary_over_quota()? {
                debug!(name = %record.file_name, "primary over quota, writing to secondary");
                return self.overflow_insert(&record);
            }
            match self.primary.insert(&record)? {
                InsertOutcome::Inserted => {
                    info!(name = %record.file_name, size = record.file_size, "indexed in primary");
                    Ok(PutOutcome::Created { tier: Tier::Primary })
                }
                InsertOutcome::IdConflict => {
                    warn!(id = %record.id, "file id already bound to a different file");
                    Ok(PutOutcome::DuplicateConflict)
                }
                InsertOutcome::Full => self.overflow_insert(&record),
            }
        }
    }

    fn overflow_insert(&self, record: &MediaRecord) -> Result<PutOutcome, StoreError> {
        // Reads consult Primary first: a Secondary row under an id Primary
        // already binds to a different file would be unreachable.
        if self.primary.get(&record.id)?.is_some() {
            warn!(id = %record.id, "file id already bound in primary");
            return Ok(PutOutcome::DuplicateConflict);
        }
        match self.secondary.insert(record)? {
            InsertOutcome::Inserted => {
                info!(name = %record.file_name, "indexed in secondary (overflow)");
                Ok(PutOutcome::Created { tier: Tier::Secondary })
            }
            InsertOutcome::IdConflict => Ok(PutOutcome::DuplicateConflict),
            InsertOutcome::Full => {
                Err(StoreError::Unavailable("both tiers rejected the write".into()))
            }
        }
    }

    fn primary_over_quota(&self) -> Result<bool, StoreError> {
        if self.primary_max_bytes == 0 {
            return Ok(false);
        }
        Ok(self.primary.db_bytes()? >= self.primary_max_bytes)
    }

    /// Fetch a record by storage key, Primary first.
    pub fn get(&self, id: &str) -> Result<Option<MediaRecord>, StoreError> {
        if let Some(record) = self.primary.get(id)? {
            return Ok(Some(record));
        }
        self.secondary.get(id)
    }

    /// Remove a record from whichever tier(s) hold it. A count above one
    /// means the same key lived in both tiers, the accepted cross-tier
    /// inconsistency.
    pub fn delete(&self, id: &str) -> Result<usize, StoreError> {
        Ok(self.primary.delete(id)? + self.secondary.delete(id)?)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            primary_count: self.primary.count()?,
            secondary_count: self.secondary.count()?,
            primary_bytes: self.primary.db_bytes()?,
            secondary_bytes: self.secondary.db_bytes()?,
        })
    }

    /// All records in one tier, largest file first. The search engine scans
    /// this order so bigger (usually better-quality) releases surface first.
    pub fn scan_by_size_desc(&self, tier: Tier) -> Result<Vec<MediaRecord>, StoreError> {
        self.tier_db(tier).scan_by_size_desc()
    }

    /// Most recently indexed Primary records, newest first, with the total
    /// Primary count for pagination.
    pub fn recent(&self, offset: usize, limit: usize) -> Result<(Vec<MediaRecord>, u64), StoreError> {
        let rows = self.primary.recent(offset, limit)?;
        let total = self.primary.count()?;
        Ok((rows, total))
    }

    fn tier_db(&self, tier: Tier) -> &TierDb {
        match tier {
            Tier::Primary => &self.primary,
            Tier::Secondary => &self.secondary,
        }
    }
}

/// One tier: a SQLite database behind a mutex.
struct TierDb {
    tier: Tier,
    conn: Mutex<Connection>,
}

const SELECT_COLS: &str =
    "id, file_name, file_size, file_type, file_unique_id, mime_type, caption, added_at";

impl TierDb {
    fn open(tier: Tier, path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA temp_store   = MEMORY;",
        )?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS media_files (
                id              TEXT PRIMARY KEY,
                file_name       TEXT NOT NULL,
                file_size       INTEGER NOT NULL,
                file_type       TEXT NOT NULL,
                file_unique_id  TEXT,
                mime_type       TEXT,
                caption         TEXT,
                added_at        TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_media_natural ON media_files(file_name, file_size);
            CREATE INDEX IF NOT EXISTS idx_media_size ON media_files(file_size);",
        )?;
        Ok(Self { tier, conn: Mutex::new(conn) })
    }

    fn insert(&self, record: &MediaRecord) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO media_files (id, file_name, file_size, file_type,
             file_unique_id, mime_type, caption, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.file_name,
                record.file_size as i64,
                record.file_type.as_str(),
                record.file_unique_id,
                record.mime_type,
                record.caption,
                record.added_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                debug!(tier = self.tier.as_str(), id = %record.id, "insert hit id collision");
                Ok(InsertOutcome::IdConflict)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::DiskFull => {
                warn!(tier = self.tier.as_str(), "database full");
                Ok(InsertOutcome::Full)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn find_natural(&self, file_name: &str, file_size: u64) -> Result<Option<MediaRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLS} FROM media_files WHERE file_name = ?1 AND file_size = ?2"
        ))?;
        let mut rows = stmt.query_map(params![file_name, file_size as i64], row_to_record)?;
        rows.next().transpose().map_err(Into::into)
    }

    fn get(&self, id: &str) -> Result<Option<MediaRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {SELECT_COLS} FROM media_files WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], row_to_record)?;
        rows.next().transpose().map_err(Into::into)
    }

    fn delete(&self, id: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM media_files WHERE id = ?1", params![id])?)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM media_files", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn db_bytes(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn scan_by_size_desc(&self) -> Result<Vec<MediaRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLS} FROM media_files ORDER BY file_size DESC"
        ))?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn recent(&self, offset: usize, limit: usize) -> Result<Vec<MediaRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLS} FROM media_files ORDER BY added_at DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<MediaRecord> {
    let file_type: String = row.get(3)?;
    let added_at: String = row.get(7)?;
    Ok(MediaRecord {
        id: row.get(0)?,
        file_name: row.get(1)?,
        file_size: row.get::<_, i64>(2)? as u64,
        file_type: MediaType::from_db(&file_type),
        file_unique_id: row.get(4)?,
        mime_type: row.get(5)?,
        caption: row.get(6)?,
        added_at: DateTime::parse_from_rfc3339(&added_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    })
}

/// Collapse path-hostile separators to spaces; synthesize a name from the
/// unique key and media type when the event carries none.
pub fn normalize_file_name(
    raw: Option<&str>,
    unique_id: Option<&str>,
    file_type: MediaType,
) -> String {
    let cleaned = raw
        .map(|name| {
            name.chars()
                .map(|c| match c {
                    '_' | '-' | '.' | '+' | '/' | '\\' => ' ',
                    other => other,
                })
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    if cleaned.is_empty() {
        format!("{} {}", file_type.as_str(), unique_id.unwrap_or("unknown"))
    } else {
        cleaned
    }
}
