//! HTTP conversion client against a mock conversion service.

use bytes::Bytes;
use docket_core::document::{DOC_MIME, DOCX_MIME};
use docket_ingest::{ConversionClient, DocumentConverter, IngestError, PdfOptimizer};
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;
use std::time::Duration;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn client(server: &MockServer) -> ConversionClient {
    ConversionClient::new(&server.base_url(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn conversion_client_success_paths() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    let convert = server.mock(|when, then| {
        when.method(POST)
            .path("/convert-word-to-pdf")
            .header_exists("content-type")
            .body_contains("filename=\"memo.docx\"");
        then.status(200)
            .header("content-type", "application/pdf")
            .body("%PDF-1.7 converted");
    });

    let normalize = server.mock(|when, then| {
        when.method(POST)
            .path("/normalize-pdf")
            .body_contains("application/pdf");
        then.status(200)
            .header("content-type", "application/pdf")
            .body("%PDF-1.7 normalized");
    });

    server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(200).json_body(json!({
            "status": "ok",
            "ghostscript_version": "10.02.1",
            "libreoffice_version": "LibreOffice 7.6"
        }));
    });

    let client = client(&server);

    let pdf = client
        .convert_to_pdf("memo.docx", DOCX_MIME, Bytes::from_static(b"PK\x03\x04"))
        .await
        .unwrap();
    assert_eq!(pdf, Bytes::from_static(b"%PDF-1.7 converted"));
    convert.assert();

    let optimized = client
        .optimize("scan.pdf", Bytes::from_static(b"%PDF-1.4"))
        .await
        .unwrap();
    assert_eq!(optimized, Bytes::from_static(b"%PDF-1.7 normalized"));
    normalize.assert();

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.ghostscript_version.as_deref(), Some("10.02.1"));
    assert!(health.libreoffice_error.is_none());
}

#[tokio::test]
async fn conversion_client_error_paths() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    server.mock(|when, then| {
        when.method(POST).path("/convert-word-to-pdf");
        then.status(500).json_body(json!({
            "success": false,
            "error": "soffice exited with status 1: source file could not be loaded",
            "code": "tool_execution_failed"
        }));
    });

    server.mock(|when, then| {
        when.method(POST).path("/normalize-pdf");
        then.status(429)
            .header("retry-after", "120")
            .body("slow down");
    });

    let client = client(&server);

    let err = client
        .convert_to_pdf("memo.doc", DOC_MIME, Bytes::from_static(b"doc"))
        .await
        .unwrap_err();
    match err {
        IngestError::Conversion(message) => {
            assert!(message.contains("500"));
            assert!(message.contains("source file could not be loaded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = client
        .optimize("scan.pdf", Bytes::from_static(b"%PDF"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "conversion_failed");
    assert!(err.to_string().contains("slow down"));
}

#[test]
fn conversion_client_rejects_invalid_url() {
    let err = match ConversionClient::new("not a url", Duration::from_secs(1)) {
        Ok(_) => panic!("expected error"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("invalid conversion URL"));
}

#[tokio::test]
async fn conversion_client_sends_declared_type_for_unnamed_documents() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let convert = server.mock(|when, then| {
        when.method(POST)
            .path("/convert-word-to-pdf")
            .body_contains("filename=\"memo\"")
            .body_contains(DOCX_MIME);
        then.status(200)
            .header("content-type", "application/pdf")
            .body("%PDF-1.7 converted");
    });

    let pdf = client(&server)
        .convert_to_pdf("memo", DOCX_MIME, Bytes::from_static(b"PK\x03\x04"))
        .await
        .unwrap();

    assert_eq!(pdf, Bytes::from_static(b"%PDF-1.7 converted"));
    convert.assert();
    // The service accepts what was sent.
    assert_eq!(
        docket_core::validate_upload("memo", Some(DOCX_MIME), 4, 1024).unwrap(),
        docket_core::DocumentKind::WordDocument
    );
}
