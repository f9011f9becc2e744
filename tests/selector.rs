// tests/selector.rs
mod common;

use bill_backlog::record::{EnrichmentOutput, FailureCategory, SelectionReason, StoredRecord};
use bill_backlog::selector::{SelectionStrategy, WorkSelector};
use bill_backlog::{BacklogError, RecordId, RunState};
use common::{complete, profile_names, Harness, ScriptedProvider};

fn with_failure(mut r: StoredRecord, profile: &str) -> StoredRecord {
    r.outputs.insert(
        profile.to_string(),
        EnrichmentOutput::failed(FailureCategory::RemoteError, "HTTP 500"),
    );
    r
}

fn ids(items: &[bill_backlog::record::WorkItem]) -> Vec<u64> {
    items.iter().map(|w| w.id.0).collect()
}

#[tokio::test]
async fn complete_records_are_excluded_and_sentinels_included() {
    let mut placeholder = complete(4, "fp-4");
    placeholder.outputs.insert(
        "simple".into(),
        EnrichmentOutput::from_column(Some("Placeholder for simple summary")),
    );
    let h = Harness::new(
        vec![
            complete(1, "fp-1"),
            with_failure(complete(2, "fp-2"), "complex"),
            StoredRecord::pending(3),
            placeholder,
        ],
        ScriptedProvider::new(),
    );

    for strategy in [SelectionStrategy::default(), SelectionStrategy::Filter] {
        let selector = WorkSelector::new(strategy, profile_names());
        let items = selector
            .select_worklist(h.store.as_ref(), h.provider.as_ref())
            .await
            .unwrap();
        assert_eq!(ids(&items), vec![2, 3, 4]);
        assert_eq!(items[0].reason, SelectionReason::Failed);
        assert_eq!(items[0].stored_fingerprint.as_deref(), Some("fp-2"));
        assert_eq!(items[1].reason, SelectionReason::Pending);
        assert_eq!(items[2].reason, SelectionReason::Pending);
    }
}

#[tokio::test]
async fn master_list_adds_known_stale_records_once() {
    let h = Harness::new(
        vec![
            complete(1, "a"),
            complete(2, "b"),
            with_failure(complete(3, "c"), "simple"),
            StoredRecord::pending(4),
        ],
        ScriptedProvider::new().with_master_list(&[(1, "a2"), (2, "b"), (3, "c2"), (9, "z")]),
    );
    let selector = WorkSelector::new(SelectionStrategy::MasterList, profile_names());

    let items = selector
        .select_worklist(h.store.as_ref(), h.provider.as_ref())
        .await
        .unwrap();

    // 3 keeps its first (Failed) entry; 9 is unknown to the store
    assert_eq!(ids(&items), vec![3, 4, 1]);
    assert_eq!(items[0].reason, SelectionReason::Failed);
    assert_eq!(items[2].reason, SelectionReason::Stale);
    assert_eq!(items[2].stored_fingerprint.as_deref(), Some("a"));
}

#[tokio::test]
async fn master_list_failure_is_a_data_access_error() {
    let h = Harness::new(vec![StoredRecord::pending(1)], ScriptedProvider::new());
    let selector = WorkSelector::new(SelectionStrategy::MasterList, profile_names());

    let err = selector
        .select_worklist(h.store.as_ref(), h.provider.as_ref())
        .await
        .unwrap_err();

    assert!(matches!(err, BacklogError::DataAccess(ref m) if m.contains("Unknown session")));
}

#[tokio::test]
async fn stale_record_with_unchanged_fetch_is_skipped_as_current() {
    let h = Harness::new(
        vec![complete(1, "a"), complete(2, "b")],
        ScriptedProvider::new()
            .with_master_list(&[(1, "a2"), (2, "b2")])
            // provider metadata for 1 still reports the old hash
            .with_document(1, "a", "unchanged text")
            .with_document(2, "b2", "amended text"),
    );

    let summary = h
        .orchestrator()
        .with_selection(SelectionStrategy::MasterList)
        .run()
        .await;

    assert!(matches!(summary.state, RunState::Finished));
    assert_eq!(summary.total, 2);
    assert_eq!(summary.skipped_current, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(h.written_ids(), vec![2]);
    assert_eq!(h.backend.calls(), 3);
    let updated = h.store.get(RecordId(2)).unwrap();
    assert_eq!(updated.fingerprint.as_deref(), Some("b2"));
    assert_eq!(updated.source_text.as_deref(), Some("amended text"));
}
