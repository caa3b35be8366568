use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broad media class carried by the transport event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Document,
    Video,
    Audio,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Document => "document",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }

    /// Parse the stored text form. Unknown values fall back to `Document`
    /// so legacy rows stay readable.
    pub fn from_db(s: &str) -> Self {
        match s {
            "video" => MediaType::Video,
            "audio" => MediaType::Audio,
            _ => MediaType::Document,
        }
    }
}

/// Which of the two record collections a row lives in. Secondary exists
/// purely as overflow once Primary hits its byte cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Primary,
    Secondary,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::Secondary => "secondary",
        }
    }
}

/// A single indexed file. `id` is the storage key (codec output, or the raw
/// platform string in degraded mode); `(file_name, file_size)` is the
/// natural key used to recognize the same logical file across re-uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: MediaType,
    pub file_unique_id: Option<String>,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// The decoded scalar layout of a platform file id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorParts {
    pub kind: i32,
    pub dc_id: i32,
    pub media_id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
}

/// An external platform's opaque handle for a stored file.
///
/// `raw` is always present; `parts` is `None` when the transport could not
/// decode the handle into the expected layout, in which case the store
/// falls back to using `raw` as the record key directly.
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    pub raw: String,
    pub parts: Option<DescriptorParts>,
}

impl MediaDescriptor {
    pub fn raw_only(raw: impl Into<String>) -> Self {
        Self { raw: raw.into(), parts: None }
    }
}

/// A "new media arrived" event from the chat transport.
#[derive(Debug, Clone)]
pub struct IncomingMedia {
    pub descriptor: MediaDescriptor,
    pub file_name: Option<String>,
    pub file_size: u64,
    pub file_type: MediaType,
    pub file_unique_id: Option<String>,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
}

/// Result of indexing one media event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PutOutcome {
    /// Brand-new record.
    Created { tier: Tier },
    /// Identical record already present; nothing written.
    Unchanged,
    /// Same natural key with a reissued identifier: the stale key was
    /// replaced in place, in the tier that held it.
    Refreshed { old_id: String, new_id: String, tier: Tier },
    /// The identifier already names a different logical file.
    DuplicateConflict,
}

/// Per-tier record counts and on-disk size estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub primary_count: u64,
    pub secondary_count: u64,
    pub primary_bytes: u64,
    pub secondary_bytes: u64,
}
