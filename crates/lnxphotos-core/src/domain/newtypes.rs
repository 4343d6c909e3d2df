//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers the photo service hands us.
//! All service ids are opaque strings; the wrappers only guarantee they are
//! non-empty and free of control characters, and give each id a distinct
//! type so an album id can never be passed where an asset id is expected.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::errors::DomainError;

/// RFC 4648 base32 alphabet, used for the asset-id fingerprint token.
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Number of fingerprint characters used to disambiguate file names.
pub const FINGERPRINT_LEN: usize = 7;

fn validate_opaque_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(|c| c.is_control())
}

/// Encodes `data` as RFC 4648 base32 (no padding).
///
/// The corpus carries no base32 crate; this is the textbook 5-bit window
/// encoder and is only used for short fingerprint prefixes.
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;
    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

// ============================================================================
// AssetId
// ============================================================================

/// Stable opaque identifier for a photo or video asset.
///
/// The service assigns these; they survive renames and edits on the remote
/// side and are the only durable identity an asset has.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    /// Create a new AssetId
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAssetId` if the id is empty or contains
    /// control characters.
    pub fn new(id: String) -> Result<Self, DomainError> {
        if !validate_opaque_id(&id) {
            return Err(DomainError::InvalidAssetId(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic 7-character fingerprint token for this id.
    ///
    /// First [`FINGERPRINT_LEN`] characters of the base32-encoded SHA-256 of
    /// the raw id. Used both as the `name-id7` duplicate-policy suffix and as
    /// the fallback base name when the service reports no filename.
    #[must_use]
    pub fn token7(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        let mut encoded = base32_encode(&digest);
        encoded.truncate(FINGERPRINT_LEN);
        encoded
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssetId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for AssetId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.0
    }
}

// ============================================================================
// AlbumId
// ============================================================================

/// Identifier for a remote album.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AlbumId(String);

impl AlbumId {
    /// Create a new AlbumId
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAlbumId` if the id is empty or contains
    /// control characters.
    pub fn new(id: String) -> Result<Self, DomainError> {
        if !validate_opaque_id(&id) {
            return Err(DomainError::InvalidAlbumId(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AlbumId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AlbumId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for AlbumId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<AlbumId> for String {
    fn from(id: AlbumId) -> Self {
        id.0
    }
}

// ============================================================================
// LibraryId
// ============================================================================

/// Identifier for a photo library (personal or shared).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LibraryId(String);

impl LibraryId {
    /// Create a new LibraryId
    ///
    /// # Errors
    /// Returns `DomainError::InvalidLibraryId` if the id is empty or contains
    /// control characters.
    pub fn new(id: String) -> Result<Self, DomainError> {
        if !validate_opaque_id(&id) {
            return Err(DomainError::InvalidLibraryId(id));
        }
        Ok(Self(id))
    }

    /// The personal (primary) library.
    #[must_use]
    pub fn personal() -> Self {
        Self("PrimarySync".to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the personal library zone.
    #[must_use]
    pub fn is_personal(&self) -> bool {
        self.0 == "PrimarySync"
    }
}

impl Display for LibraryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LibraryId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for LibraryId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<LibraryId> for String {
    fn from(id: LibraryId) -> Self {
        id.0
    }
}

// ============================================================================
// Username
// ============================================================================

/// Validated account username (an Apple ID, i.e. an email address).
///
/// Performs basic structural validation: exactly one `@`, non-empty local
/// part, non-empty domain containing a dot. Stored lowercased so the same
/// account always maps to the same session file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Create a new validated Username
    ///
    /// # Errors
    /// Returns `DomainError::InvalidUsername` if the value is not a
    /// structurally plausible email address.
    pub fn new(username: String) -> Result<Self, DomainError> {
        Self::validate(&username)?;
        Ok(Self(username.to_lowercase()))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe form of the username, used to derive session file
    /// names: everything outside `[A-Za-z0-9._-]` becomes `_`.
    #[must_use]
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn validate(username: &str) -> Result<(), DomainError> {
        let parts: Vec<&str> = username.split('@').collect();
        if parts.len() != 2 {
            return Err(DomainError::InvalidUsername(format!(
                "must contain exactly one '@': {username}"
            )));
        }

        let (local, domain) = (parts[0], parts[1]);
        if local.is_empty() {
            return Err(DomainError::InvalidUsername(format!(
                "empty local part: {username}"
            )));
        }
        if domain.is_empty() || !domain.contains('.') {
            return Err(DomainError::InvalidUsername(format!(
                "domain must contain a dot: {username}"
            )));
        }
        if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DomainError::InvalidUsername(format!(
                "contains whitespace or control characters: {username}"
            )));
        }

        Ok(())
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Username {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Username {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Username> for String {
    fn from(username: Username) -> Self {
        username.0
    }
}

// ============================================================================
// Tests
// ============================================================================
