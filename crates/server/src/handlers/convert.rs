//! Conversion endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use docket_core::document::pdf_file_name;
use docket_core::{DocumentKind, PDF_MIME, sanitize_file_name, validate_upload};

/// The `file` part of a multipart upload.
struct UploadedFile {
    /// Name as sent by the client. Used for classification only.
    original_name: String,
    content_type: Option<String>,
    data: Bytes,
}

async fn read_file_field(multipart: &mut Multipart) -> ApiResult<UploadedFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return Ok(UploadedFile {
            original_name,
            content_type,
            data,
        });
    }
    Err(ApiError::MissingFile)
}

fn accept(
    state: &AppState,
    file: &UploadedFile,
    expected: DocumentKind,
    expected_label: &'static str,
) -> ApiResult<()> {
    let kind = validate_upload(
        &file.original_name,
        file.content_type.as_deref(),
        file.data.len() as u64,
        state.config.server.max_upload_bytes,
    )?;
    if kind != expected {
        return Err(docket_core::Error::WrongType {
            name: sanitize_file_name(&file.original_name),
            expected: expected_label,
        }
        .into());
    }
    Ok(())
}

fn pdf_attachment(data: Bytes, original_name: &str) -> Response {
    let file_name = pdf_file_name(&sanitize_file_name(original_name));
    (
        [
            (header::CONTENT_TYPE, PDF_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        data,
    )
        .into_response()
}

/// POST /normalize-pdf
pub async fn normalize_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let file = read_file_field(&mut multipart).await?;
    accept(&state, &file, DocumentKind::Pdf, "PDF")?;

    let output = state.converter.normalize_pdf(file.data).await?;
    Ok(pdf_attachment(output, &file.original_name))
}

/// POST /convert-word-to-pdf
pub async fn convert_word_to_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let file = read_file_field(&mut multipart).await?;
    accept(&state, &file, DocumentKind::WordDocument, "Word document")?;

    let output = state
        .converter
        .convert_word_to_pdf(file.data, &file.original_name)
        .await?;
    Ok(pdf_attachment(output, &file.original_name))
}
