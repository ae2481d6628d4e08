//! Mock publisher for testing
//!
//! Configurable stand-in for a real account: refresh and publish can be made
//! to fail, every call is counted, and published drafts are kept for
//! inspection. Intended for integration tests of the poll loop and the reply
//! flow without credentials or network access.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::{AuthError, PublishError, Result};
use crate::platforms::Publisher;
use crate::types::{FeedPostRecord, FetchedPost, PostDraft, RecordPath, StrongRef};

/// Configuration for mock publisher behavior
///
/// The counters and logs are shared, so a clone taken before the publisher is
/// boxed keeps observing it.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "mock-bluesky")
    pub name: String,

    /// Error to return from `refresh_auth`; `None` means refresh succeeds
    pub auth_error: Option<String>,

    /// Error to return from every publish; `None` means publish succeeds
    pub publish_error: Option<String>,

    /// Drafts whose text is listed here fail to publish
    pub failing_texts: Arc<Mutex<HashSet<String>>>,

    /// Character limit for validation
    pub character_limit: Option<usize>,

    /// Records served by `get_post`, keyed by AT-URI
    pub records: Arc<Mutex<HashMap<String, FetchedPost>>>,

    /// Number of times refresh_auth has been called
    pub refresh_call_count: Arc<Mutex<usize>>,

    /// Number of times publish has been called
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Drafts that were published, in order
    pub published: Arc<Mutex<Vec<PostDraft>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            auth_error: None,
            publish_error: None,
            failing_texts: Arc::new(Mutex::new(HashSet::new())),
            character_limit: None,
            records: Arc::new(Mutex::new(HashMap::new())),
            refresh_call_count: Arc::new(Mutex::new(0)),
            publish_call_count: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockConfig {
    pub fn refresh_call_count(&self) -> usize {
        *self.refresh_call_count.lock().unwrap()
    }

    pub fn publish_call_count(&self) -> usize {
        *self.publish_call_count.lock().unwrap()
    }

    /// Everything that was published successfully
    pub fn published(&self) -> Vec<PostDraft> {
        self.published.lock().unwrap().clone()
    }

    /// Texts of everything that was published successfully
    pub fn published_texts(&self) -> Vec<String> {
        self.published().into_iter().map(|d| d.text).collect()
    }

    /// Make drafts with exactly this text fail
    pub fn fail_text(&self, text: &str) {
        self.failing_texts.lock().unwrap().insert(text.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_texts.lock().unwrap().clear();
    }

    /// Serve `record` from `get_post` under `reference.uri`
    pub fn add_record(&self, reference: StrongRef, record: FeedPostRecord) {
        self.records.lock().unwrap().insert(
            reference.uri.clone(),
            FetchedPost { reference, record },
        );
    }
}

/// Mock publisher for testing
pub struct MockPublisher {
    config: MockConfig,
    refreshed: bool,
}

impl MockPublisher {
    /// Create a new mock publisher with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            refreshed: false,
        }
    }

    /// Create a mock publisher that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock publisher whose session refresh fails
    pub fn auth_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            auth_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock publisher that fails every publish
    pub fn publish_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            publish_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock publisher with a character limit
    pub fn with_limit(name: &str, limit: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            character_limit: Some(limit),
            ..Default::default()
        })
    }

    /// Shared handle to counters, logs, and failure switches
    pub fn config(&self) -> MockConfig {
        self.config.clone()
    }

    pub fn refresh_call_count(&self) -> usize {
        self.config.refresh_call_count()
    }

    pub fn publish_call_count(&self) -> usize {
        self.config.publish_call_count()
    }

    pub fn published(&self) -> Vec<PostDraft> {
        self.config.published()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn refresh_auth(&mut self) -> Result<()> {
        *self.config.refresh_call_count.lock().unwrap() += 1;

        match &self.config.auth_error {
            None => {
                self.refreshed = true;
                Ok(())
            }
            Some(error) => Err(AuthError::Refresh(error.clone()).into()),
        }
    }

    async fn publish(&self, draft: &PostDraft) -> Result<StrongRef> {
        let n = {
            let mut count = self.config.publish_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        if !self.refreshed {
            return Err(PublishError::Authentication("Session not refreshed".to_string()).into());
        }

        self.validate_content(draft)?;

        if let Some(error) = &self.config.publish_error {
            return Err(PublishError::Rejected {
                status: 500,
                message: error.clone(),
            }
            .into());
        }

        if self.config.failing_texts.lock().unwrap().contains(&draft.text) {
            return Err(PublishError::Network(format!("Mock publish failed for '{}'", draft.text)).into());
        }

        self.config.published.lock().unwrap().push(draft.clone());

        Ok(StrongRef {
            uri: format!("at://did:plc:{}/app.bsky.feed.post/{}", self.config.name, n),
            cid: format!("cid{}", n),
        })
    }

    async fn get_post(&self, path: &RecordPath) -> Result<FetchedPost> {
        self.config
            .records
            .lock()
            .unwrap()
            .get(&path.to_string())
            .cloned()
            .ok_or_else(|| {
                PublishError::Rejected {
                    status: 400,
                    message: format!("RecordNotFound: {}", path),
                }
                .into()
            })
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkyrelayError;
    use crate::types::FEED_POST_COLLECTION;

    #[tokio::test]
    async fn test_mock_success() {
        let mut publisher = MockPublisher::success("mock");

        assert_eq!(publisher.name(), "mock");
        assert_eq!(publisher.character_limit(), None);

        publisher.refresh_auth().await.unwrap();
        assert_eq!(publisher.refresh_call_count(), 1);

        let first = publisher.publish(&PostDraft::text("one")).await.unwrap();
        let second = publisher.publish(&PostDraft::text("two")).await.unwrap();
        assert_eq!(first.uri, "at://did:plc:mock/app.bsky.feed.post/1");
        assert_eq!(first.cid, "cid1");
        assert_eq!(second.cid, "cid2");

        assert_eq!(publisher.config().published_texts(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_mock_auth_failure() {
        let mut publisher = MockPublisher::auth_failure("mock", "ExpiredToken");

        let result = publisher.refresh_auth().await;
        assert!(matches!(result, Err(SkyrelayError::Auth(AuthError::Refresh(_)))));
        assert!(result.unwrap_err().to_string().contains("ExpiredToken"));
    }

    #[tokio::test]
    async fn test_mock_requires_refresh() {
        let publisher = MockPublisher::success("mock");

        let result = publisher.publish(&PostDraft::text("early")).await;
        assert!(result.unwrap_err().to_string().contains("Session not refreshed"));
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_mock_publish_failure() {
        let mut publisher = MockPublisher::publish_failure("mock", "InternalServerError");
        publisher.refresh_auth().await.unwrap();

        let result = publisher.publish(&PostDraft::text("anything")).await;
        assert!(matches!(
            result,
            Err(SkyrelayError::Publish(PublishError::Rejected { status: 500, .. }))
        ));
        assert!(publisher.published().is_empty());
        assert_eq!(publisher.publish_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_failing_text() {
        let mut publisher = MockPublisher::success("mock");
        publisher.refresh_auth().await.unwrap();
        publisher.config().fail_text("bad");

        assert!(publisher.publish(&PostDraft::text("bad")).await.is_err());
        assert!(publisher.publish(&PostDraft::text("good")).await.is_ok());
        assert_eq!(publisher.config().published_texts(), vec!["good"]);
        assert_eq!(publisher.publish_call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_with_character_limit() {
        let publisher = MockPublisher::with_limit("mock", 10);

        assert!(publisher.validate_content(&PostDraft::text("Short")).is_ok());

        let result = publisher.validate_content(&PostDraft::text("This is way too long"));
        assert!(result.unwrap_err().to_string().contains("character limit"));
    }

    #[tokio::test]
    async fn test_mock_get_post() {
        let publisher = MockPublisher::success("mock");
        let reference = StrongRef {
            uri: "at://did:plc:alice/app.bsky.feed.post/3k".to_string(),
            cid: "cid-alice".to_string(),
        };
        publisher.config().add_record(
            reference.clone(),
            FeedPostRecord {
                kind: FEED_POST_COLLECTION.to_string(),
                text: "hi".to_string(),
                created_at: "2024-01-01T00:00:00.000Z".to_string(),
                embed: None,
                reply: None,
            },
        );

        let path: RecordPath = reference.uri.parse().unwrap();
        let post = publisher.get_post(&path).await.unwrap();
        assert_eq!(post.reference, reference);

        let missing: RecordPath = "at://did:plc:alice/app.bsky.feed.post/nope".parse().unwrap();
        assert!(publisher.get_post(&missing).await.is_err());
    }
}
