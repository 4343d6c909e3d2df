//! Folder structure templates
//!
//! Folder layout under the output directory is driven by a strftime-style
//! template such as `{:%Y/%m/%d}`, evaluated against the asset's capture
//! wall-clock. The sentinel value `none` collapses the hierarchy so every
//! file lands directly in the output directory.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{Locale, NaiveDate, NaiveDateTime};

use crate::domain::DomainError;

/// A parsed, validated folder structure template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderTemplate {
    /// No intermediate folders
    Flat,
    /// strftime pattern, e.g. `%Y/%m/%d`
    Pattern(String),
}

impl FolderTemplate {
    /// Parses a template from its configuration form.
    ///
    /// Accepts `none`, a `{:%...}`-wrapped pattern, or a bare strftime
    /// pattern. The pattern is validated by formatting a probe date, so an
    /// unknown specifier is a configuration error instead of a panic at the
    /// first asset.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("none") {
            return Ok(FolderTemplate::Flat);
        }

        let pattern = trimmed
            .strip_prefix("{:")
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(trimmed)
            .to_string();

        if pattern.is_empty() {
            return Err(DomainError::InvalidTemplate(raw.to_string()));
        }

        // Probe with a fixed date; chrono surfaces bad specifiers as fmt errors.
        let probe = NaiveDate::from_ymd_opt(2000, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| DomainError::InvalidTemplate(raw.to_string()))?;
        try_format(&probe, &pattern, None)
            .map_err(|_| DomainError::InvalidTemplate(raw.to_string()))?;

        Ok(FolderTemplate::Pattern(pattern))
    }

    /// Renders the template for a capture wall-clock into a relative path.
    ///
    /// The formatted string is split on `/` into path components; empty
    /// components are dropped so a pattern like `%Y//%m` cannot escape or
    /// double up directories.
    pub fn resolve(
        &self,
        wall_clock: NaiveDateTime,
        locale: Option<Locale>,
    ) -> Result<PathBuf, DomainError> {
        match self {
            FolderTemplate::Flat => Ok(PathBuf::new()),
            FolderTemplate::Pattern(pattern) => {
                let rendered = try_format(&wall_clock, pattern, locale)
                    .map_err(|_| DomainError::InvalidTemplate(pattern.clone()))?;

                let mut path = PathBuf::new();
                for component in rendered.split('/') {
                    let component = component.trim();
                    if component.is_empty() || component == "." || component == ".." {
                        continue;
                    }
                    path.push(component);
                }
                Ok(path)
            }
        }
    }
}

/// Formats without panicking on invalid strftime specifiers.
fn try_format(
    wall_clock: &NaiveDateTime,
    pattern: &str,
    locale: Option<Locale>,
) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    match locale {
        Some(locale) => write!(
            out,
            "{}",
            wall_clock.and_utc().format_localized(pattern, locale)
        )?,
        None => write!(out, "{}", wall_clock.format(pattern))?,
    }
    Ok(out)
}

/// Resolves the OS locale for month/day names from the usual environment
/// variables, falling back to `None` (C/POSIX formatting) when unset or
/// unknown to chrono.
#[must_use]
pub fn os_locale() -> Option<Locale> {
    for var in ["LC_ALL", "LC_TIME", "LANG"] {
        if let Ok(value) = std::env::var(var) {
            let name = value.split('.').next().unwrap_or("");
            if name.is_empty() || name == "C" || name == "POSIX" {
                continue;
            }
            if let Ok(locale) = Locale::try_from(name) {
                return Some(locale);
            }
        }
    }
    None
}
