//! Skyrelay - relay a ranked link feed to Bluesky
//!
//! This library holds everything the `skyrelay-*` binaries share: the
//! seen-store, the ranked-list source, the Bluesky publisher, the poll loop,
//! and the completion-backed reply generator.

pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod poller;
pub mod reply;
pub mod session;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use config::{Config, FailurePolicy};
pub use db::Database;
pub use error::{Result, SkyrelayError};
pub use poller::{CycleReport, Phase, Poller};
pub use session::AuthSession;
pub use types::{ExternalItem, PostDraft, RecordPath, SeenRecord, StrongRef};
