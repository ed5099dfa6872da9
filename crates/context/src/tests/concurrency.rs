//! Searches, rebuilds and refreshes running at the same time.

use super::support::*;
use crate::types::{Selection, SelectionMethod};
use chrono::Duration as ChronoDuration;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const EMBED_DELAY: Duration = Duration::from_millis(20);

/// Every selected id is a stored dashboard and nothing repeats.
fn assert_served_from_store(h: &Harness, selection: &Selection) {
    assert!(!selection.is_empty());
    let mut seen = HashSet::new();
    for result in &selection.results {
        let id = result.context.dashboard_id.as_str();
        assert!(h.system.store().get(id).is_some(), "unknown dashboard {}", id);
        assert!(seen.insert(id), "dashboard {} selected twice", id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_select_while_rebuilding() {
    let embeddings = Arc::new(SlowEmbeddings::new(EMBED_DELAY));
    let h = HarnessBuilder::new().embeddings(embeddings.clone()).build();
    let report = h.system.refresh(&abc_dashboards(), false).await;
    assert!(report.index_rebuilt);

    let manager = h.system.index_manager();
    let (rebuilt, selections) = tokio::join!(manager.build(true), async {
        let mut selections = Vec::new();
        for _ in 0..5 {
            selections.push(h.system.select("server latency", 1).await);
            tokio::time::sleep(EMBED_DELAY / 2).await;
        }
        selections
    });

    assert!(rebuilt.unwrap());
    for selection in &selections {
        assert_served_from_store(&h, selection);
        if selection.method == Some(SelectionMethod::VectorSearch) {
            assert_eq!(selection_ids(selection), vec!["b"]);
        }
    }

    assert_eq!(manager.vector_count().await, 3);
    let after = h.system.select("server latency", 1).await;
    assert_eq!(after.method, Some(SelectionMethod::VectorSearch));
    assert_eq!(selection_ids(&after), vec!["b"]);
    assert!(embeddings.calls() > 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_select_while_refreshing() {
    let h = HarnessBuilder::new()
        .embeddings(Arc::new(SlowEmbeddings::new(EMBED_DELAY)))
        .summarizer(
            abc_summarizer()
                .slow_for("a", Duration::from_millis(30))
                .slow_for("c", Duration::from_millis(30)),
        )
        .build();
    h.system.refresh(&abc_dashboards(), false).await;

    // Every context has expired; the refresh rewrites all of them
    h.clock.advance(ChronoDuration::days(8));

    let (report, selections) = tokio::join!(h.system.refresh(&abc_dashboards(), false), async {
        let mut selections = Vec::new();
        for _ in 0..6 {
            selections.push(h.system.select("campaign conversion", 2).await);
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        selections
    });

    assert_eq!(report.updated.len(), 3);
    assert!(report.failed.is_empty());
    assert!(report.index_rebuilt);
    for selection in &selections {
        assert_served_from_store(&h, selection);
        assert_eq!(selection.len(), 2);
    }

    assert_eq!(h.system.index_manager().vector_count().await, 3);
    assert!(!h.system.index_manager().should_rebuild());
    let after = h.system.select("campaign conversion", 1).await;
    assert_eq!(selection_ids(&after), vec!["c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_searches_build_once() {
    // Contexts on disk but no index yet
    let first = HarnessBuilder::new()
        .embeddings(Arc::new(UnavailableEmbeddings))
        .build();
    let report = first.system.refresh(&abc_dashboards(), false).await;
    assert!(!report.index_rebuilt);

    let embeddings = Arc::new(SlowEmbeddings::new(EMBED_DELAY));
    let h = HarnessBuilder::new()
        .workspace(first.temp)
        .embeddings(embeddings.clone())
        .build();
    assert!(!h.system.restore_index().await);

    let selections = join_all((0..4).map(|_| h.system.select("revenue by region", 1))).await;

    for selection in &selections {
        assert_served_from_store(&h, selection);
    }
    assert_eq!(h.system.index_manager().vector_count().await, 3);

    // One build of three contexts plus at most one query embedding per search
    assert!(embeddings.calls() <= 3 + selections.len());
}
