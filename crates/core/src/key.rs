//! Storage key construction.
//!
//! Keys have the shape `<namespace>/<parent>/<unix-millis>-<discriminator>_<file>`.
//! Every component is reduced to `[A-Za-z0-9._-]` so a client-supplied name
//! can never add a path segment or climb out of its namespace.

use std::fmt;
use time::OffsetDateTime;

const MAX_NAME_LEN: usize = 128;

/// A sanitized object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Build a key for a document.
    ///
    /// `discriminator` separates two uploads of the same name in the same
    /// millisecond; callers pass a per-task identifier.
    pub fn build(
        namespace: &str,
        parent_reference: &str,
        at: OffsetDateTime,
        discriminator: &str,
        file_name: &str,
    ) -> Self {
        let namespace = sanitize_namespace(namespace);
        let parent = sanitize_component(parent_reference, "unassigned");
        let millis = at.unix_timestamp_nanos() / 1_000_000;
        let discriminator = sanitize_component(discriminator, "0");
        let name = sanitize_file_name(file_name);

        Self(format!(
            "{namespace}/{parent}/{millis}-{discriminator}_{name}"
        ))
    }

    /// The listing prefix covering every key built under `namespace`.
    pub fn namespace_prefix(namespace: &str) -> String {
        format!("{}/", sanitize_namespace(namespace))
    }

    /// Wrap an existing key read back from storage.
    pub fn from_existing(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce a client file name to a safe final key component.
///
/// Only the last path component survives, characters outside the allowlist
/// are dropped (spaces become `_`), dot runs collapse and leading dots are
/// removed.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    sanitize_component(base, "file")
}

fn sanitize_namespace(namespace: &str) -> String {
    let namespace = namespace
        .split('/')
        .map(|segment| sanitize_component(segment, ""))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if namespace.is_empty() {
        "files".to_string()
    } else {
        namespace
    }
}

fn sanitize_component(input: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous_dot = false;
    for c in input.chars() {
        let mapped = match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => c,
            '.' if previous_dot => continue,
            '.' => '.',
            ' ' => '_',
            _ => continue,
        };
        previous_dot = mapped == '.';
        out.push(mapped);
    }

    let trimmed = out.trim_start_matches('.');
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    truncate_keeping_extension(trimmed)
}

/// Cut an over-long ASCII name to `MAX_NAME_LEN`, shortening the stem so the
/// extension survives.
fn truncate_keeping_extension(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }
    if let Some(dot) = name.rfind('.')
        && dot > 0
        && name.len() - dot < MAX_NAME_LEN / 2
    {
        let extension = &name[dot..];
        let stem = name[..MAX_NAME_LEN - extension.len()].trim_end_matches('.');
        return format!("{stem}{extension}");
    }
    name[..MAX_NAME_LEN].to_string()
}
