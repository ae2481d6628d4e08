//! Poll loop behavior against the in-tree mock source and publisher

use libskyrelay::config::FailurePolicy;
use libskyrelay::error::{AuthError, FetchError, SkyrelayError};
use libskyrelay::platforms::mock::{MockConfig, MockPublisher};
use libskyrelay::poller::{Phase, Poller};
use libskyrelay::source::mock::{MockSource, MockSourceState};
use libskyrelay::types::PostEmbed;
use libskyrelay::Database;
use tempfile::TempDir;

struct Harness {
    _temp_dir: TempDir,
    db_path: String,
    source: MockSourceState,
    publisher: MockConfig,
    poller: Poller,
}

async fn harness(ids: &[i64], top_n: usize, policy: FailurePolicy) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("seen.db").to_str().unwrap().to_string();
    let db = Database::new(&db_path).await.unwrap();

    let source = MockSource::with_ids(ids);
    let publisher = MockPublisher::success("mock");
    let source_state = source.state();
    let publisher_config = publisher.config();

    let poller = Poller::new(Box::new(source), Box::new(publisher), db, top_n).with_policy(policy);

    Harness {
        _temp_dir: temp_dir,
        db_path,
        source: source_state,
        publisher: publisher_config,
        poller,
    }
}

#[tokio::test]
async fn test_first_n_fetched_and_published_in_order() {
    let mut h = harness(&[101, 102, 103], 2, FailurePolicy::Isolate).await;

    let report = h.poller.run_cycle().await.unwrap();

    assert_eq!(report.listed, 3);
    assert_eq!(report.considered, 2);
    assert_eq!(report.published_ids(), vec![101, 102]);
    assert_eq!(h.source.fetched(), vec![101, 102]);
    assert_eq!(h.publisher.published_texts(), vec!["Story 101", "Story 102"]);

    let db = h.poller.database();
    assert!(db.lookup(101).await.unwrap().is_some());
    assert!(db.lookup(102).await.unwrap().is_some());
    assert!(db.lookup(103).await.unwrap().is_none());
}

#[tokio::test]
async fn test_changed_list_publishes_only_new_item() {
    let mut h = harness(&[101, 102, 103], 3, FailurePolicy::Isolate).await;
    h.poller.run_cycle().await.unwrap();

    h.source.set_ranked(&[101, 102, 104]);
    let report = h.poller.run_cycle().await.unwrap();

    assert_eq!(report.skipped, 2);
    assert_eq!(report.published_ids(), vec![104]);
    assert_eq!(h.poller.database().count().await.unwrap(), 4);
    // Seen ids are never fetched again
    assert_eq!(h.source.fetched(), vec![101, 102, 103, 104]);
}

#[tokio::test]
async fn test_new_item_beyond_top_n_is_ignored() {
    let mut h = harness(&[101, 102, 103], 2, FailurePolicy::Isolate).await;
    h.poller.run_cycle().await.unwrap();

    h.source.set_ranked(&[101, 102, 104]);
    let report = h.poller.run_cycle().await.unwrap();

    assert_eq!(report.considered, 2);
    assert_eq!(report.skipped, 2);
    assert!(report.published.is_empty());
    assert_eq!(h.source.fetched(), vec![101, 102]);
    assert!(h.poller.database().lookup(104).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_order_is_kept_and_duplicates_skipped() {
    let mut h = harness(&[103, 101, 103, 102], 3, FailurePolicy::Isolate).await;

    let report = h.poller.run_cycle().await.unwrap();

    assert_eq!(report.considered, 3);
    assert_eq!(report.published_ids(), vec![103, 101]);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.source.fetched(), vec![103, 101]);
    assert_eq!(h.publisher.published_texts(), vec!["Story 103", "Story 101"]);
    assert!(h.poller.database().lookup(102).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unchanged_list_is_idempotent() {
    let mut h = harness(&[1, 2, 3], 10, FailurePolicy::Isolate).await;

    let first = h.poller.run_cycle().await.unwrap();
    let second = h.poller.run_cycle().await.unwrap();

    assert_eq!(first.published.len(), 3);
    assert!(second.published.is_empty());
    assert_eq!(second.skipped, 3);
    assert_eq!(h.publisher.publish_call_count(), 3);
}

#[tokio::test]
async fn test_every_cycle_refreshes_first() {
    let mut h = harness(&[1], 10, FailurePolicy::Isolate).await;

    h.poller.run_cycle().await.unwrap();
    h.poller.run_cycle().await.unwrap();

    assert_eq!(h.publisher.refresh_call_count(), 2);
}

#[tokio::test]
async fn test_link_post_uses_item_url_and_title() {
    let mut h = harness(&[42], 10, FailurePolicy::Isolate).await;
    h.poller.run_cycle().await.unwrap();

    let published = h.publisher.published();
    match &published[0].embed {
        Some(PostEmbed::External(link)) => {
            assert_eq!(link.uri, "https://example.com/story/42");
            assert_eq!(link.title, "Story 42");
            assert!(link.description.is_empty());
        }
        other => panic!("Expected external embed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_isolate_skips_failed_publish_and_continues() {
    let mut h = harness(&[1, 2, 3], 10, FailurePolicy::Isolate).await;
    h.publisher.fail_text("Story 2");

    let report = h.poller.run_cycle().await.unwrap();

    assert_eq!(report.published_ids(), vec![1, 3]);
    assert_eq!(report.failed_ids(), vec![2]);
    assert_eq!(report.failed[0].phase, Phase::Publishing);
    assert!(h.poller.database().lookup(2).await.unwrap().is_none());

    // Once the publisher recovers the item goes out on the next cycle
    h.publisher.clear_failures();
    let report = h.poller.run_cycle().await.unwrap();
    assert_eq!(report.published_ids(), vec![2]);
}

#[tokio::test]
async fn test_isolate_reports_fetch_failure_phase() {
    let mut h = harness(&[1, 2], 10, FailurePolicy::Isolate).await;
    h.source.fail_item(1);

    let report = h.poller.run_cycle().await.unwrap();

    assert_eq!(report.failed_ids(), vec![1]);
    assert_eq!(report.failed[0].phase, Phase::Fetching);
    assert_eq!(report.published_ids(), vec![2]);
}

#[tokio::test]
async fn test_abort_stops_at_failing_item() {
    let mut h = harness(&[1, 2, 3], 10, FailurePolicy::Abort).await;
    h.publisher.fail_text("Story 2");

    let result = h.poller.run_cycle().await;

    assert!(matches!(result, Err(SkyrelayError::Publish(_))));
    assert_eq!(h.publisher.published_texts(), vec!["Story 1"]);
    assert_eq!(h.source.fetched(), vec![1, 2]);

    let db = h.poller.database();
    assert!(db.lookup(1).await.unwrap().is_some());
    assert!(db.lookup(2).await.unwrap().is_none());
    assert!(db.lookup(3).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejecting_publisher_records_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(temp_dir.path().join("seen.db").to_str().unwrap())
        .await
        .unwrap();
    let publisher = MockPublisher::publish_failure("mock", "InternalServerError");
    let published = publisher.config();

    let mut poller = Poller::new(Box::new(MockSource::with_ids(&[1, 2])), Box::new(publisher), db, 10);

    let report = poller.run_cycle().await.unwrap();

    assert_eq!(report.failed_ids(), vec![1, 2]);
    assert!(report.failed[0].message.contains("InternalServerError"));
    assert_eq!(published.publish_call_count(), 2);
    assert_eq!(poller.database().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_failure_isolated_ends_cycle() {
    let mut h = harness(&[1], 10, FailurePolicy::Isolate).await;
    h.source.fail_list(FetchError::NonOk {
        url: "mock://topstories".to_string(),
        status: 503,
    });

    let report = h.poller.run_cycle().await.unwrap();

    assert!(report.list_error.unwrap().contains("503"));
    assert!(report.published.is_empty());
    assert!(h.source.fetched().is_empty());
}

#[tokio::test]
async fn test_list_failure_aborts_under_abort_policy() {
    let mut h = harness(&[1], 10, FailurePolicy::Abort).await;
    h.source.fail_list(FetchError::Decode("truncated body".to_string()));

    let result = h.poller.run_cycle().await;
    assert!(matches!(result, Err(SkyrelayError::Fetch(FetchError::Decode(_)))));
}

#[tokio::test]
async fn test_auth_failure_is_fatal_under_isolate() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(temp_dir.path().join("seen.db").to_str().unwrap())
        .await
        .unwrap();
    let source = MockSource::with_ids(&[1, 2]);
    let state = source.state();

    let mut poller = Poller::new(
        Box::new(source),
        Box::new(MockPublisher::auth_failure("mock", "ExpiredToken")),
        db,
        10,
    );

    let result = poller.run_cycle().await;

    assert!(matches!(result, Err(SkyrelayError::Auth(AuthError::Refresh(_)))));
    // Nothing was listed or fetched
    assert!(state.fetched().is_empty());
    assert_eq!(poller.database().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_restart_does_not_republish() {
    let mut h = harness(&[5, 6], 10, FailurePolicy::Isolate).await;
    h.poller.run_cycle().await.unwrap();
    h.poller.database().close().await;

    // A fresh process: new store handle, new publisher, same list
    let db = Database::new(&h.db_path).await.unwrap();
    let publisher = MockPublisher::success("mock");
    let published = publisher.config();
    let mut restarted = Poller::new(Box::new(MockSource::with_ids(&[5, 6, 7])), Box::new(publisher), db, 10);

    let report = restarted.run_cycle().await.unwrap();

    assert_eq!(report.published_ids(), vec![7]);
    assert_eq!(published.published_texts(), vec!["Story 7"]);

    let recent = restarted.database().recent(10).await.unwrap();
    let mut ids: Vec<i64> = recent.iter().map(|r| r.external_id).collect();
    ids.sort();
    assert_eq!(ids, vec![5, 6, 7]);
}

#[tokio::test]
async fn test_interrupted_cycle_resumes_without_duplicates() {
    let mut h = harness(&[1, 2, 3], 10, FailurePolicy::Isolate).await;
    // Item 3 fails mid-cycle, standing in for a crash before it was recorded
    h.publisher.fail_text("Story 3");
    h.poller.run_cycle().await.unwrap();

    h.publisher.clear_failures();
    h.poller.run_cycle().await.unwrap();

    let texts = h.publisher.published_texts();
    assert_eq!(texts, vec!["Story 1", "Story 2", "Story 3"]);
    assert_eq!(h.poller.database().count().await.unwrap(), 3);
}
