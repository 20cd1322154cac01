//! Background batch execution.

mod common;

use common::{FakeConverter, Harness, docx, pdf};
use docket_ingest::{SupervisorError, UploadContext, UploadSupervisor};
use std::sync::Arc;

fn ctx() -> UploadContext {
    UploadContext::new("case-9", "clerk")
}

#[tokio::test]
async fn test_ticket_yields_the_batch_report() {
    let harness = Harness::new();
    let supervisor = UploadSupervisor::new(Arc::new(harness.orchestrator()));

    let ticket = supervisor
        .submit(ctx(), vec![pdf("a.pdf"), pdf("b.pdf")])
        .await;
    let report = ticket.wait().await.unwrap();

    assert_eq!(report.summary(), "2 of 2 succeeded");
    assert_eq!(harness.records.rows().len(), 2);
}

#[tokio::test]
async fn test_worker_panic_fails_the_ticket() {
    let harness = Harness::new();
    let orchestrator = harness
        .orchestrator()
        .with_converter(Arc::new(FakeConverter::panicking(&["cursed.docx"])));
    let supervisor = UploadSupervisor::new(Arc::new(orchestrator));

    let ticket = supervisor.submit(ctx(), vec![docx("cursed.docx")]).await;
    let err = ticket.wait().await.unwrap_err();

    match err {
        SupervisorError::Panicked(message) => assert!(message.contains("cursed.docx")),
        other => panic!("expected panic, got {other:?}"),
    }
    supervisor.drain().await;
    assert_eq!(supervisor.outstanding().await, 0);
}

#[tokio::test]
async fn test_drain_waits_for_every_batch() {
    let harness = Harness::new();
    let supervisor = UploadSupervisor::new(Arc::new(harness.orchestrator()));

    let mut tickets = Vec::new();
    for i in 0..4 {
        let files = vec![pdf(&format!("batch-{i}-a.pdf")), pdf(&format!("batch-{i}-b.pdf"))];
        tickets.push(supervisor.submit(ctx(), files).await);
    }

    supervisor.drain().await;

    assert_eq!(supervisor.outstanding().await, 0);
    assert_eq!(harness.records.rows().len(), 8);
    for ticket in tickets {
        assert_eq!(ticket.wait().await.unwrap().succeeded(), 2);
    }
}

#[tokio::test]
async fn test_dropped_ticket_does_not_stop_the_batch() {
    let harness = Harness::new();
    let supervisor = UploadSupervisor::new(Arc::new(harness.orchestrator()));

    drop(supervisor.submit(ctx(), vec![pdf("fire-and-forget.pdf")]).await);
    supervisor.drain().await;

    assert_eq!(harness.records.rows().len(), 1);
}
