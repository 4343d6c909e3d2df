//! Filename sanitization
//!
//! The service-reported filename is free text; before it touches a path it
//! goes through [`sanitize_base_name`], a pure function of the raw name and
//! the unicode policy. When the service reports no filename at all,
//! [`fallback_base_name`] derives a deterministic one from the asset id.

use unicode_normalization::UnicodeNormalization;

use crate::domain::{AssetId, MediaHint};

/// Characters forbidden on at least one supported filesystem.
const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Sanitizes a service-reported base name into a filesystem-safe one.
///
/// With `keep_unicode` off, the name is NFKD-decomposed and non-ASCII marks
/// are dropped, so `Réunion.jpg` becomes `Reunion.jpg`. Forbidden and
/// control characters always become `_`. Returns `None` when nothing
/// printable survives; callers fall back to the fingerprint name.
pub fn sanitize_base_name(raw: &str, keep_unicode: bool) -> Option<String> {
    let normalized: String = if keep_unicode {
        raw.to_string()
    } else {
        raw.nfkd().filter(char::is_ascii).collect()
    };

    let cleaned: String = normalized
        .chars()
        .map(|c| {
            if FORBIDDEN.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_' || c == '.') {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Deterministic base name for assets the service reports no filename for.
///
/// Uses the 7-character id fingerprint as the stem and an extension derived
/// from the rendition's media type.
#[must_use]
pub fn fallback_base_name(asset_id: &AssetId, hint: MediaHint) -> String {
    format!("{}.{}", asset_id.token7(), hint.default_extension())
}

/// Inserts `suffix` immediately before the extension dot, or appends it
/// when the name has no extension.
#[must_use]
pub fn insert_before_extension(name: &str, suffix: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}{suffix}.{ext}"),
        None => format!("{name}{suffix}"),
    }
}

/// Splits a base name into `(stem, Some(extension))` at the last dot.
#[must_use]
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    }
}
