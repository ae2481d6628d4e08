//! Ranked-list sources
//!
//! A source hands out an ordered list of item ids and, one id at a time,
//! the item details. The poll loop truncates the list; sources return it
//! whole.

use async_trait::async_trait;

use crate::error::FetchError;
use crate::types::ExternalItem;

pub mod hackernews;

// Mock source is available for all builds (not just tests) to support integration tests
pub mod mock;

pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Current ranked list, best first
    ///
    /// # Errors
    ///
    /// `FetchError::NonOk` for a non-success status, `FetchError::Decode` for a
    /// malformed body, `FetchError::Network` when the request never completes.
    async fn fetch_ranked_list(&self) -> FetchResult<Vec<i64>>;

    /// Details for a single item; no batching, no caching
    async fn fetch_item(&self, id: i64) -> FetchResult<ExternalItem>;

    /// Short lowercase identifier used in logs
    fn name(&self) -> &str;
}
