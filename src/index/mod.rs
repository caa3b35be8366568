//! Media index — the two-tier file reference store and its search engine.
//!
//! Records arrive from the chat transport as forwarded media, get a compact
//! identifier from the file-id codec, and land in the Primary tier (or the
//! Secondary overflow tier when Primary is over quota). Search matches
//! filenames only; there is no content inspection.

pub mod fileid;
pub mod schema;
pub mod search;
pub mod store;

pub use schema::{IncomingMedia, MediaDescriptor, MediaRecord, MediaType, PutOutcome, Tier};
pub use search::SearchEngine;
pub use store::MediaStore;
