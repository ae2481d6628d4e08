//! Mock ranked-list source for testing
//!
//! Serves a configurable list and item table from memory and records every
//! detail fetch, so tests can assert on truncation and ordering without
//! network access.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::FetchError;
use crate::source::{FetchResult, ItemSource};
use crate::types::ExternalItem;

/// Shared state behind a [`MockSource`]; clones observe the same data
#[derive(Debug, Clone, Default)]
pub struct MockSourceState {
    pub ranked: Arc<Mutex<Vec<i64>>>,
    pub items: Arc<Mutex<HashMap<i64, ExternalItem>>>,
    pub failing_items: Arc<Mutex<HashSet<i64>>>,
    pub list_error: Arc<Mutex<Option<FetchError>>>,
    pub fetched: Arc<Mutex<Vec<i64>>>,
}

pub struct MockSource {
    state: MockSourceState,
}

impl MockSource {
    /// Source whose list is `ids`; every id gets a generated item
    pub fn with_ids(ids: &[i64]) -> Self {
        let source = Self {
            state: MockSourceState::default(),
        };
        source.set_ranked(ids);
        source
    }

    /// Handle for inspecting or changing the source after it was boxed
    pub fn state(&self) -> MockSourceState {
        self.state.clone()
    }

    /// Replace the ranked list, generating items for ids not yet known
    pub fn set_ranked(&self, ids: &[i64]) {
        self.state.set_ranked(ids);
    }
}

impl MockSourceState {
    pub fn set_ranked(&self, ids: &[i64]) {
        let mut items = self.items.lock().unwrap();
        for &id in ids {
            items.entry(id).or_insert_with(|| sample_item(id));
        }
        *self.ranked.lock().unwrap() = ids.to_vec();
    }

    /// Make `fetch_item(id)` fail with a network error
    pub fn fail_item(&self, id: i64) {
        self.failing_items.lock().unwrap().insert(id);
    }

    pub fn fail_list(&self, error: FetchError) {
        *self.list_error.lock().unwrap() = Some(error);
    }

    /// Ids passed to `fetch_item`, in call order
    pub fn fetched(&self) -> Vec<i64> {
        self.fetched.lock().unwrap().clone()
    }
}

/// Deterministic item for `id`
pub fn sample_item(id: i64) -> ExternalItem {
    ExternalItem {
        id,
        title: format!("Story {}", id),
        url: Some(format!("https://example.com/story/{}", id)),
        by: Some("mock".to_string()),
        score: 100,
        time: 1_700_000_000 + id,
        kids: vec![],
        descendants: 0,
        kind: Some("story".to_string()),
    }
}

#[async_trait]
impl ItemSource for MockSource {
    async fn fetch_ranked_list(&self) -> FetchResult<Vec<i64>> {
        if let Some(error) = self.state.list_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.state.ranked.lock().unwrap().clone())
    }

    async fn fetch_item(&self, id: i64) -> FetchResult<ExternalItem> {
        self.state.fetched.lock().unwrap().push(id);

        if self.state.failing_items.lock().unwrap().contains(&id) {
            return Err(FetchError::Network(format!("mock failure for item {}", id)));
        }

        self.state
            .items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| FetchError::Decode(format!("item {} is null", id)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
