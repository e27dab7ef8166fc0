//! Core configuration and utilities shared by Vyapaar Saathi binaries.

mod config;
mod error;
mod logging;
mod paths;
mod session;

pub use config::{
    Config, InsightsConfig, LiveSyncConfig, DEFAULT_COMPLETION_API_URL, DEFAULT_COMPLETION_MODEL,
    DEFAULT_LOG_LEVEL, DEFAULT_SUPABASE_PUBLISHABLE_KEY, DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
pub use session::{SessionStore, StoredSession};
