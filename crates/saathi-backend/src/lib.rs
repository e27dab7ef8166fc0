//! Backend Service boundary for Vyapaar Saathi.
//!
//! The managed backend (database, auth, realtime change feed) is treated as an
//! opaque service. This crate pins down the two contracts the rest of the
//! workspace consumes:
//!
//! - [`RowStore`]: owner-scoped row CRUD over named tables
//! - [`ChangeFeed`]: publish/subscribe channels delivering row changes that
//!   match a server-side filter
//!
//! ```text
//! panel ──select()──▶ RowStore
//! controller ──subscribe()──▶ ChangeFeed ──RowChange──▶ controller
//! ```
//!
//! [`MemoryBackend`] implements both contracts in-process and is what the
//! tests and the offline demo run against.

mod error;
mod feed;
mod memory;
mod types;

pub use error::{BackendError, BackendResult};
pub use feed::{ChangeFeed, ChangeSink, RowQuery, RowStore, SortOrder};
pub use memory::MemoryBackend;
pub use types::{
    ChangeKind, ChangeKinds, ChannelHandle, ChannelRequest, OwnerId, RowChange, OWNER_COLUMN,
};
