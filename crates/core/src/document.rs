//! Document classification.

use crate::error::{Error, Result};

pub const DOC_MIME: &str = "application/msword";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// The input classes the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Pdf,
    WordDocument,
    Other,
}

impl DocumentKind {
    pub fn is_accepted(self) -> bool {
        !matches!(self, DocumentKind::Other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::WordDocument => "word",
            DocumentKind::Other => "other",
        }
    }
}

/// Classify a file by extension, falling back to its declared MIME type.
///
/// Extensions win because browsers routinely report `application/octet-stream`
/// for office files.
pub fn classify(file_name: &str, mime_type: Option<&str>) -> DocumentKind {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => return DocumentKind::Pdf,
        Some("doc" | "docx") => return DocumentKind::WordDocument,
        _ => {}
    }

    let mime = mime_type
        .map(|m| m.split(';').next().unwrap_or(m).trim().to_ascii_lowercase())
        .unwrap_or_default();
    match mime.as_str() {
        crate::PDF_MIME => DocumentKind::Pdf,
        DOC_MIME | DOCX_MIME => DocumentKind::WordDocument,
        _ => DocumentKind::Other,
    }
}

/// Size and type checks applied before any conversion work.
pub fn validate_upload(
    file_name: &str,
    mime_type: Option<&str>,
    size: u64,
    limit: u64,
) -> Result<DocumentKind> {
    if size > limit {
        return Err(Error::TooLarge {
            name: file_name.to_string(),
            size,
            limit,
        });
    }
    if size == 0 {
        return Err(Error::Empty {
            name: file_name.to_string(),
        });
    }
    let kind = classify(file_name, mime_type);
    if !kind.is_accepted() {
        return Err(Error::UnsupportedType {
            name: file_name.to_string(),
        });
    }
    Ok(kind)
}

/// MIME type to record for a stored file of the given kind.
pub fn mime_for(kind: DocumentKind, file_name: &str) -> &'static str {
    match kind {
        DocumentKind::Pdf => crate::PDF_MIME,
        DocumentKind::WordDocument if file_name.to_ascii_lowercase().ends_with(".doc") => DOC_MIME,
        DocumentKind::WordDocument => DOCX_MIME,
        DocumentKind::Other => "application/octet-stream",
    }
}

/// Name a converted artifact after its source: `brief.docx` becomes `brief.pdf`.
pub fn pdf_file_name(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        Some(_) => "document",
        None if file_name.is_empty() => "document",
        None => file_name,
    };
    format!("{stem}.pdf")
}
