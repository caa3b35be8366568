//! mediadex — media-indexing chat-bot core.
//!
//! Two-tier file reference store, compact file-id codec, filename search,
//! and per-conversation filter/pagination sessions. The chat transport is
//! a consumer of this crate, not part of it: it delivers media and search
//! events to [`bot::Bot`] and renders the pages that come back.

pub mod bot;
pub mod config;
pub mod index;
pub mod session;

pub use bot::Bot;
pub use config::Config;
pub use index::{IncomingMedia, MediaDescriptor, MediaRecord, MediaType, PutOutcome, Tier};
pub use session::{FilterAxis, Page, SessionError, SessionKey};
