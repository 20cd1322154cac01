//! Orphan reconciliation sweep.

mod common;

use common::{Harness, pdf};
use docket_ingest::{ReconcileStats, Reconciler, UploadContext};
use time::{Duration, OffsetDateTime};

fn reconciler(harness: &Harness) -> Reconciler {
    Reconciler::new(
        harness.store.clone(),
        harness.records.clone(),
        &harness.config.namespace,
        Duration::hours(1),
    )
}

#[tokio::test]
async fn test_sweep_removes_only_old_unrecorded_blobs() {
    let harness = Harness::new();
    harness.records.fail_inserts_containing("lost");
    let orchestrator = harness.orchestrator();

    let report = orchestrator
        .submit_batch(
            &UploadContext::new("case-1", "u"),
            vec![pdf("kept.pdf"), pdf("lost.pdf")],
        )
        .await;
    let orphan = report
        .errors()
        .next()
        .and_then(|(_, e)| e.orphaned_key())
        .unwrap()
        .to_string();

    // Outside the namespace: never touched.
    harness
        .store
        .insert_at("other/x.pdf", b"%PDF", OffsetDateTime::now_utc() - Duration::days(3));

    // Within the grace period nothing is removed.
    let stats = reconciler(&harness).sweep().await.unwrap();
    assert_eq!(
        stats,
        ReconcileStats {
            scanned: 2,
            orphaned: 0,
            removed: 0,
            skipped_recent: 1,
            errors: 0,
        }
    );
    assert!(harness.store.object(&orphan).is_some());

    let later = OffsetDateTime::now_utc() + Duration::hours(2);
    let stats = reconciler(&harness).sweep_at(later).await.unwrap();
    assert_eq!(stats.orphaned, 1);
    assert_eq!(stats.removed, 1);
    assert!(harness.store.object(&orphan).is_none());

    assert_eq!(harness.store.keys().len(), 2);
    assert!(harness.store.object("other/x.pdf").is_some());
    assert_eq!(harness.records.rows().len(), 1);
}

#[tokio::test]
async fn test_dry_run_reports_without_deleting() {
    let harness = Harness::new();
    let old = OffsetDateTime::now_utc() - Duration::days(1);
    harness
        .store
        .insert_at("case-files/case-1/1-abc_stray.pdf", b"%PDF", old);

    let stats = reconciler(&harness).dry_run(true).sweep().await.unwrap();

    assert_eq!(stats.orphaned, 1);
    assert_eq!(stats.removed, 0);
    assert!(
        harness
            .store
            .object("case-files/case-1/1-abc_stray.pdf")
            .is_some()
    );
}

#[tokio::test]
async fn test_sweep_without_bucket_is_storage_unavailable() {
    let harness = Harness::with_bucket(false);
    let err = reconciler(&harness).sweep().await.unwrap_err();
    assert_eq!(err.code(), "storage_unavailable");
}

#[tokio::test]
async fn test_sweep_finds_orphans_under_a_sanitized_namespace() {
    let mut harness = Harness::new();
    harness.config.namespace = "case files".to_string();
    harness.records.fail_inserts_containing("lost");
    let orchestrator = harness.orchestrator();

    let report = orchestrator
        .submit_batch(&UploadContext::new("case-1", "u"), vec![pdf("lost.pdf")])
        .await;
    let orphan = report
        .errors()
        .next()
        .and_then(|(_, e)| e.orphaned_key())
        .unwrap()
        .to_string();
    assert!(orphan.starts_with("case_files/"));

    let later = OffsetDateTime::now_utc() + Duration::hours(2);
    let stats = reconciler(&harness).sweep_at(later).await.unwrap();

    assert_eq!(stats.scanned, 1);
    assert_eq!(stats.removed, 1);
    assert!(harness.store.object(&orphan).is_none());
}
