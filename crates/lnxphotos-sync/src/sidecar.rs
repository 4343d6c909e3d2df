//! Sidecar writers
//!
//! Pure post-processors applied after a file is published:
//!
//! - [`write_xmp_sidecar`] emits a companion `.xmp` document carrying the
//!   capture date, a rating derived from the favorite flag, and the edit
//!   timestamp when the asset's adjustment payload is parseable.
//! - [`ensure_exif_datetime`] injects `DateTimeOriginal` into JPEGs that
//!   lack it. Detection uses the `exif` reader; injection writes a minimal
//!   APP1/TIFF segment right after SOI (no registry crate in the ecosystem
//!   writes EXIF, so the 64-byte segment is assembled here).

use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveDateTime};
use tracing::debug;

use lnxphotos_core::domain::Asset;
use lnxphotos_core::error::SyncError;

/// JPEG start-of-image marker.
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Sidecar location: the full published name plus `.xmp`, so
/// `IMG_1.HEIC` pairs with `IMG_1.HEIC.xmp`.
#[must_use]
pub fn sidecar_path(published: &Path) -> PathBuf {
    let mut name = published.file_name().unwrap_or_default().to_os_string();
    name.push(".xmp");
    published.with_file_name(name)
}

/// Writes the XMP sidecar next to a published file.
pub fn write_xmp_sidecar(
    published: &Path,
    asset: &Asset,
    fallback: FixedOffset,
) -> Result<PathBuf, SyncError> {
    let path = sidecar_path(published);
    let document = render_xmp(asset, fallback);
    std::fs::write(&path, document).map_err(|e| SyncError::filesystem(path.clone(), e))?;
    debug!(path = %path.display(), "Wrote XMP sidecar");
    Ok(path)
}

fn render_xmp(asset: &Asset, fallback: FixedOffset) -> String {
    let mut attributes = String::new();

    if let Some(captured) = asset.captured_at() {
        let stamp = captured
            .resolve_utc(fallback)
            .format("%Y-%m-%dT%H:%M:%SZ");
        attributes.push_str(&format!(
            "\n   exif:DateTimeOriginal=\"{stamp}\"\n   xmp:CreateDate=\"{stamp}\""
        ));
    }

    if asset.is_favorite() {
        attributes.push_str("\n   xmp:Rating=\"5\"");
    }

    if let Some(modify) = adjustment_timestamp(asset) {
        attributes.push_str(&format!("\n   xmp:ModifyDate=\"{modify}\""));
    }

    format!(
        "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n\
         <x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n\
         \x20<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n\
         \x20 <rdf:Description rdf:about=\"\"\n\
         \x20  xmlns:exif=\"http://ns.adobe.com/exif/1.0/\"\n\
         \x20  xmlns:xmp=\"http://ns.adobe.com/xap/1.0/\"{attributes}/>\n\
         \x20</rdf:RDF>\n\
         </x:xmpmeta>\n\
         <?xpacket end=\"w\"?>\n"
    )
}

/// Pulls an edit timestamp out of the asset's adjustment payload, when the
/// payload is JSON and carries one. Unparseable payloads are ignored.
fn adjustment_timestamp(asset: &Asset) -> Option<String> {
    let raw = asset.adjustment_data()?;
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value
        .get("adjustmentTimestamp")
        .and_then(|v| v.as_str())
        .map(String::from)
}

// ============================================================================
// EXIF DateTimeOriginal injection
// ============================================================================

/// Ensures a JPEG carries `DateTimeOriginal`, injecting it from the capture
/// wall-clock when absent.
///
/// # Returns
/// `true` when a tag was injected, `false` when the file already had one or
/// is not a JPEG (non-JPEG containers are left untouched).
pub fn ensure_exif_datetime(
    path: &Path,
    wall_clock: NaiveDateTime,
) -> Result<bool, SyncError> {
    let bytes = std::fs::read(path).map_err(|e| SyncError::filesystem(path.to_path_buf(), e))?;
    if bytes.len() < 4 || bytes[..2] != JPEG_SOI {
        debug!(path = %path.display(), "Not a JPEG, skipping EXIF injection");
        return Ok(false);
    }

    if has_datetime_original(path) {
        return Ok(false);
    }

    let stamp = wall_clock.format("%Y:%m:%d %H:%M:%S").to_string();
    let segment = build_exif_app1(&stamp);

    let mut patched = Vec::with_capacity(bytes.len() + segment.len());
    patched.extend_from_slice(&JPEG_SOI);
    patched.extend_from_slice(&segment);
    patched.extend_from_slice(&bytes[2..]);

    // Replace via temp-and-rename so a crash cannot leave a torn image
    let tmp = path.with_extension("exif-tmp");
    std::fs::write(&tmp, &patched).map_err(|e| SyncError::filesystem(tmp.clone(), e))?;
    std::fs::rename(&tmp, path).map_err(|e| SyncError::filesystem(path.to_path_buf(), e))?;

    debug!(path = %path.display(), %stamp, "Injected DateTimeOriginal");
    Ok(true)
}

/// Reads the file's EXIF block and checks for `DateTimeOriginal`.
/// Files without a parseable EXIF block count as missing the tag.
fn has_datetime_original(path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(path) else {
        return false;
    };
    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(data) => data
            .get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)
            .is_some(),
        Err(_) => false,
    }
}

/// Assembles an APP1 segment holding a single-tag EXIF block:
/// IFD0 → ExifIFD → DateTimeOriginal (ASCII, 20 bytes).
fn build_exif_app1(stamp: &str) -> Vec<u8> {
    debug_assert_eq!(stamp.len(), 19);

    let mut tiff: Vec<u8> = Vec::with_capacity(64);
    // TIFF header: little-endian, magic 42, IFD0 at offset 8
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());

    // IFD0: one entry pointing at the Exif sub-IFD (offset 26 = 8 + 18)
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x8769u16.to_le_bytes()); // ExifIFD pointer
    tiff.extend_from_slice(&4u16.to_le_bytes()); // LONG
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&26u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes()); // no next IFD

    // Exif IFD: one entry, DateTimeOriginal data at offset 44 = 26 + 18
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x9003u16.to_le_bytes()); // DateTimeOriginal
    tiff.extend_from_slice(&2u16.to_le_bytes()); // ASCII
    tiff.extend_from_slice(&20u32.to_le_bytes());
    tiff.extend_from_slice(&44u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes()); // no next IFD

    tiff.extend_from_slice(stamp.as_bytes());
    tiff.push(0); // ASCII NUL terminator

    let mut segment = Vec::with_capacity(tiff.len() + 10);
    segment.extend_from_slice(&[0xFF, 0xE1]);
    let length = (2 + 6 + tiff.len()) as u16;
    segment.extend_from_slice(&length.to_be_bytes());
    segment.extend_from_slice(b"Exif\0\0");
    segment.extend_from_slice(&tiff);
    segment
}
