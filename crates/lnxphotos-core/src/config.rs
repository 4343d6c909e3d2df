//! Configuration module for LNXPhotos.
//!
//! A [`Config`] is the fully resolved configuration for one account context.
//! The core never parses command-line arguments; the CLI layer materializes
//! one `Config` per `--username` occurrence (applying layered defaults) and
//! hands it over. Every knob the engine honors is a field here.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{SizeTag, Username};

// ---------------------------------------------------------------------------
// Policy enums
// ---------------------------------------------------------------------------

/// How colliding file names between distinct assets are disambiguated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileMatchPolicy {
    /// Keep the plain name; a collider gains a `-{byte_length}` suffix.
    #[default]
    NameSizeDedupWithSuffix,
    /// Every asset carries a `_{7-char id token}` suffix, collisions cannot
    /// happen and names are independent of discovery order.
    NameId7,
}

impl FileMatchPolicy {
    pub const ALL: &'static [&'static str] = &["name-size-dedup-with-suffix", "name-id7"];
}

impl fmt::Display for FileMatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileMatchPolicy::NameSizeDedupWithSuffix => write!(f, "name-size-dedup-with-suffix"),
            FileMatchPolicy::NameId7 => write!(f, "name-id7"),
        }
    }
}

impl FromStr for FileMatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name-size-dedup-with-suffix" => Ok(Self::NameSizeDedupWithSuffix),
            "name-id7" => Ok(Self::NameId7),
            other => Err(format!(
                "invalid file match policy '{other}'; valid options: {}",
                Self::ALL.join(", ")
            )),
        }
    }
}

/// Naming of the video half of a live photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LivePhotoMovPolicy {
    /// HEIC stills get `<base>_HEVC.MOV`; other stills get `<base>.MOV`.
    #[default]
    Suffix,
    /// Video name is the still base name with the extension replaced by
    /// `.MOV`. Must be combined with [`FileMatchPolicy::NameId7`] so the
    /// still and video of different assets cannot clash.
    Original,
}

impl fmt::Display for LivePhotoMovPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivePhotoMovPolicy::Suffix => write!(f, "suffix"),
            LivePhotoMovPolicy::Original => write!(f, "original"),
        }
    }
}

impl FromStr for LivePhotoMovPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "suffix" => Ok(Self::Suffix),
            "original" => Ok(Self::Original),
            other => Err(format!(
                "invalid live photo mov filename policy '{other}'; valid options: suffix, original"
            )),
        }
    }
}

/// Which representation of a RAW+JPEG asset is labeled `original`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignRawPolicy {
    /// RAW is `original`, JPEG is `alternative`.
    Original,
    /// JPEG is `original`, RAW is `alternative`.
    Alternative,
    /// Keep the service-provided assignment.
    #[default]
    AsIs,
}

impl fmt::Display for AlignRawPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignRawPolicy::Original => write!(f, "original"),
            AlignRawPolicy::Alternative => write!(f, "alternative"),
            AlignRawPolicy::AsIs => write!(f, "as-is"),
        }
    }
}

impl FromStr for AlignRawPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(Self::Original),
            "alternative" => Ok(Self::Alternative),
            "as-is" => Ok(Self::AsIs),
            other => Err(format!(
                "invalid align-raw policy '{other}'; valid options: original, alternative, as-is"
            )),
        }
    }
}

/// Which library of the account a configuration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LibraryScope {
    #[default]
    Personal,
    Shared,
}

impl FromStr for LibraryScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Self::Personal),
            "shared" => Ok(Self::Shared),
            other => Err(format!(
                "invalid library '{other}'; valid options: personal, shared"
            )),
        }
    }
}

/// Password acquisition backends, tried in configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordProviderKind {
    /// The `--password` parameter
    Parameter,
    /// OS keyring
    Keyring,
    /// Interactive console prompt
    Console,
    /// Local web page
    Webui,
}

impl FromStr for PasswordProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parameter" => Ok(Self::Parameter),
            "keyring" => Ok(Self::Keyring),
            "console" => Ok(Self::Console),
            "webui" => Ok(Self::Webui),
            other => Err(format!(
                "invalid password provider '{other}'; valid options: parameter, keyring, console, webui"
            )),
        }
    }
}

/// MFA code acquisition backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MfaProviderKind {
    #[default]
    Console,
    Webui,
}

impl FromStr for MfaProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "console" => Ok(Self::Console),
            "webui" => Ok(Self::Webui),
            other => Err(format!(
                "invalid MFA provider '{other}'; valid options: console, webui"
            )),
        }
    }
}

/// Service region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceDomain {
    #[default]
    Com,
    Cn,
}

impl FromStr for ServiceDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "com" => Ok(Self::Com),
            "cn" => Ok(Self::Cn),
            other => Err(format!("invalid domain '{other}'; valid options: com, cn")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level resolved configuration for one account context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub output: OutputConfig,
    pub filters: FilterConfig,
    pub sizes: SizeConfig,
    pub naming: NamingConfig,
    pub mode: ModeConfig,
    pub side_effects: SideEffectsConfig,
    pub watch: WatchConfig,
    pub auth: AuthConfig,
    pub reporting: ReportingConfig,
}

/// Output tree settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root of the local photo tree for this configuration.
    pub directory: PathBuf,
    /// strftime-style folder template, e.g. `{:%Y/%m/%d}`, or `none` to
    /// collapse the hierarchy.
    pub folder_structure: String,
    /// Render month/day names with the OS locale instead of C/POSIX.
    pub use_os_locale: bool,
    /// UTC offset in seconds applied to capture times that carry no
    /// timezone. `None` means UTC.
    pub fallback_offset_seconds: Option<i32>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            folder_structure: "{:%Y/%m/%d}".to_string(),
            use_os_locale: false,
            fallback_offset_seconds: None,
        }
    }
}

/// Asset selection filters and termination predicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Album names to sync; empty means the whole library.
    pub albums: Vec<String>,
    /// Which library to iterate.
    pub library: LibraryScope,
    /// Yield at most this many assets.
    pub recent: Option<u64>,
    /// Stop after this many consecutive already-present assets.
    pub until_found: Option<u64>,
    pub skip_videos: bool,
    pub skip_photos: bool,
    pub skip_live_photos: bool,
    /// Drop assets captured before this instant (filter, not terminator).
    pub skip_created_before: Option<DateTime<Utc>>,
    /// Drop assets captured after this instant (filter, not terminator).
    pub skip_created_after: Option<DateTime<Utc>>,
}

/// Which renditions to download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeConfig {
    /// Requested sizes, in order; may repeat.
    pub sizes: Vec<SizeTag>,
    /// When true, a missing requested size is skipped instead of falling
    /// back to `original`.
    pub force_size: bool,
    /// Size of the video half of live photos.
    pub live_photo_size: SizeTag,
    pub live_photo_mov_policy: LivePhotoMovPolicy,
    pub align_raw: AlignRawPolicy,
}

impl Default for SizeConfig {
    fn default() -> Self {
        Self {
            sizes: vec![SizeTag::Original],
            force_size: false,
            live_photo_size: SizeTag::Original,
            live_photo_mov_policy: LivePhotoMovPolicy::default(),
            align_raw: AlignRawPolicy::default(),
        }
    }
}

/// File naming settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamingConfig {
    pub file_match_policy: FileMatchPolicy,
    /// Keep non-ASCII characters in file names instead of transliterating.
    pub keep_unicode: bool,
}

/// Deletion behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Mirror Recently-Deleted into local deletions.
    pub auto_delete: bool,
    /// Deprecated: move just-downloaded assets to Recently-Deleted.
    pub delete_after_download: bool,
    /// Move assets older than this many days to Recently-Deleted after
    /// processing. `Some(0)` deletes every processed asset.
    pub keep_icloud_recent_days: Option<u32>,
}

/// Post-download side effects and no-op modes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideEffectsConfig {
    /// Inject `DateTimeOriginal` into JPEGs that lack it.
    pub set_exif_datetime: bool,
    /// Write an XMP sidecar next to each published file.
    pub xmp_sidecar: bool,
    /// Decide everything, download and delete nothing.
    pub dry_run: bool,
    /// Print target paths to stdout and perform no side effects.
    pub only_print_filenames: bool,
}

/// Watch-mode settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds to sleep between passes; `None` runs a single pass.
    pub interval_seconds: Option<u64>,
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: Username,
    /// Password from the command line, if given.
    pub password: Option<String>,
    /// Provider chain tried in order for the password.
    pub password_providers: Vec<PasswordProviderKind>,
    pub mfa_provider: MfaProviderKind,
    /// Directory holding per-username session files.
    pub cookie_directory: PathBuf,
    /// Authenticate and exit without iterating assets.
    pub auth_only: bool,
    pub domain: ServiceDomain,
}

impl AuthConfig {
    /// Default session store directory (`~/.pyicloud`), shared with other
    /// tools that speak the same session format.
    #[must_use]
    pub fn default_cookie_directory() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join(".pyicloud")
    }
}

/// Re-authentication notification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Recipient for re-auth-required emails.
    pub notification_email: Option<String>,
    /// Sender address; defaults to the recipient.
    pub notification_email_from: Option<String>,
    pub smtp: Option<SmtpConfig>,
    /// Script invoked when re-authentication is required.
    pub notification_script: Option<PathBuf>,
}

/// SMTP relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Plain connection instead of STARTTLS.
    pub no_tls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: None,
            password: None,
            no_tls: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"filters.recent"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Minimal valid configuration for the given account and output tree.
    #[must_use]
    pub fn for_account(username: Username, directory: PathBuf) -> Self {
        Self {
            output: OutputConfig {
                directory,
                ..OutputConfig::default()
            },
            filters: FilterConfig::default(),
            sizes: SizeConfig::default(),
            naming: NamingConfig::default(),
            mode: ModeConfig::default(),
            side_effects: SideEffectsConfig::default(),
            watch: WatchConfig::default(),
            auth: AuthConfig {
                username,
                password: None,
                password_providers: vec![
                    PasswordProviderKind::Parameter,
                    PasswordProviderKind::Keyring,
                    PasswordProviderKind::Console,
                ],
                mfa_provider: MfaProviderKind::default(),
                cookie_directory: AuthConfig::default_cookie_directory(),
                auth_only: false,
                domain: ServiceDomain::default(),
            },
            reporting: ReportingConfig::default(),
        }
    }

    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- output ---
        if self.output.directory.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "output.directory".into(),
                message: "must be set".into(),
            });
        }

        // --- filters ---
        if self.filters.skip_photos && self.filters.skip_videos {
            errors.push(ValidationError {
                field: "filters.skip_photos".into(),
                message: "skipping both photos and videos leaves nothing to sync".into(),
            });
        }
        if let Some(0) = self.filters.until_found {
            errors.push(ValidationError {
                field: "filters.until_found".into(),
                message: "must be greater than 0".into(),
            });
        }
        if let (Some(before), Some(after)) = (
            self.filters.skip_created_before,
            self.filters.skip_created_after,
        ) {
            if before > after {
                errors.push(ValidationError {
                    field: "filters.skip_created_before".into(),
                    message: format!(
                        "skip-created-before ({before}) is after skip-created-after ({after}); \
                         every asset would be excluded"
                    ),
                });
            }
        }

        // --- sizes ---
        if self.sizes.sizes.is_empty() {
            errors.push(ValidationError {
                field: "sizes.sizes".into(),
                message: "at least one size must be requested".into(),
            });
        }
        if !matches!(
            self.sizes.live_photo_size,
            SizeTag::Original | SizeTag::Medium | SizeTag::Thumb
        ) {
            errors.push(ValidationError {
                field: "sizes.live_photo_size".into(),
                message: "live photo size must be original, medium, or thumb".into(),
            });
        }
        if self.sizes.live_photo_mov_policy == LivePhotoMovPolicy::Original
            && self.naming.file_match_policy != FileMatchPolicy::NameId7
        {
            errors.push(ValidationError {
                field: "sizes.live_photo_mov_policy".into(),
                message: "policy 'original' requires file match policy 'name-id7' \
                          to rule out still/video name clashes"
                    .into(),
            });
        }

        // --- mode ---
        if self.mode.auto_delete && self.mode.keep_icloud_recent_days.is_some() {
            errors.push(ValidationError {
                field: "mode.auto_delete".into(),
                message: "auto-delete and keep-icloud-recent-days are mutually exclusive".into(),
            });
        }
        if self.mode.auto_delete && self.mode.delete_after_download {
            errors.push(ValidationError {
                field: "mode.auto_delete".into(),
                message: "auto-delete and delete-after-download are mutually exclusive".into(),
            });
        }

        // --- watch ---
        if let Some(0) = self.watch.interval_seconds {
            errors.push(ValidationError {
                field: "watch.interval_seconds".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- auth ---
        if self.auth.password_providers.is_empty() {
            errors.push(ValidationError {
                field: "auth.password_providers".into(),
                message: "at least one password provider is required".into(),
            });
        }
        if self.auth.cookie_directory.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "auth.cookie_directory".into(),
                message: "must be set".into(),
            });
        }

        // --- reporting ---
        if self.reporting.smtp.is_some() && self.reporting.notification_email.is_none() {
            errors.push(ValidationError {
                field: "reporting.notification_email".into(),
                message: "SMTP settings given but no notification email recipient".into(),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::for_account`] and allows selective overrides;
/// used heavily by tests and by the CLI layering code.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(username: Username, directory: PathBuf) -> Self {
        Self {
            config: Config::for_account(username, directory),
        }
    }

    // --- output ---

    pub fn folder_structure(mut self, template: impl Into<String>) -> Self {
        self.config.output.folder_structure = template.into();
        self
    }

    pub fn use_os_locale(mut self, enabled: bool) -> Self {
        self.config.output.use_os_locale = enabled;
        self
    }

    pub fn fallback_offset_seconds(mut self, seconds: i32) -> Self {
        self.config.output.fallback_offset_seconds = Some(seconds);
        self
    }

    // --- filters ---

    pub fn albums(mut self, albums: Vec<String>) -> Self {
        self.config.filters.albums = albums;
        self
    }

    pub fn library(mut self, scope: LibraryScope) -> Self {
        self.config.filters.library = scope;
        self
    }

    pub fn recent(mut self, n: u64) -> Self {
        self.config.filters.recent = Some(n);
        self
    }

    pub fn until_found(mut self, n: u64) -> Self {
        self.config.filters.until_found = Some(n);
        self
    }

    pub fn skip_videos(mut self, skip: bool) -> Self {
        self.config.filters.skip_videos = skip;
        self
    }

    pub fn skip_photos(mut self, skip: bool) -> Self {
        self.config.filters.skip_photos = skip;
        self
    }

    pub fn skip_live_photos(mut self, skip: bool) -> Self {
        self.config.filters.skip_live_photos = skip;
        self
    }

    pub fn skip_created_before(mut self, t: DateTime<Utc>) -> Self {
        self.config.filters.skip_created_before = Some(t);
        self
    }

    pub fn skip_created_after(mut self, t: DateTime<Utc>) -> Self {
        self.config.filters.skip_created_after = Some(t);
        self
    }

    // --- sizes ---

    pub fn sizes(mut self, sizes: Vec<SizeTag>) -> Self {
        self.config.sizes.sizes = sizes;
        self
    }

    pub fn force_size(mut self, force: bool) -> Self {
        self.config.sizes.force_size = force;
        self
    }

    pub fn live_photo_size(mut self, size: SizeTag) -> Self {
        self.config.sizes.live_photo_size = size;
        self
    }

    pub fn live_photo_mov_policy(mut self, policy: LivePhotoMovPolicy) -> Self {
        self.config.sizes.live_photo_mov_policy = policy;
        self
    }

    pub fn align_raw(mut self, policy: AlignRawPolicy) -> Self {
        self.config.sizes.align_raw = policy;
        self
    }

    // --- naming ---

    pub fn file_match_policy(mut self, policy: FileMatchPolicy) -> Self {
        self.config.naming.file_match_policy = policy;
        self
    }

    pub fn keep_unicode(mut self, keep: bool) -> Self {
        self.config.naming.keep_unicode = keep;
        self
    }

    // --- mode ---

    pub fn auto_delete(mut self, enabled: bool) -> Self {
        self.config.mode.auto_delete = enabled;
        self
    }

    pub fn delete_after_download(mut self, enabled: bool) -> Self {
        self.config.mode.delete_after_download = enabled;
        self
    }

    pub fn keep_icloud_recent_days(mut self, days: u32) -> Self {
        self.config.mode.keep_icloud_recent_days = Some(days);
        self
    }

    // --- side effects ---

    pub fn set_exif_datetime(mut self, enabled: bool) -> Self {
        self.config.side_effects.set_exif_datetime = enabled;
        self
    }

    pub fn xmp_sidecar(mut self, enabled: bool) -> Self {
        self.config.side_effects.xmp_sidecar = enabled;
        self
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.config.side_effects.dry_run = enabled;
        self
    }

    pub fn only_print_filenames(mut self, enabled: bool) -> Self {
        self.config.side_effects.only_print_filenames = enabled;
        self
    }

    // --- watch ---

    pub fn watch_interval_seconds(mut self, seconds: u64) -> Self {
        self.config.watch.interval_seconds = Some(seconds);
        self
    }

    // --- auth ---

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.auth.password = Some(password.into());
        self
    }

    pub fn password_providers(mut self, providers: Vec<PasswordProviderKind>) -> Self {
        self.config.auth.password_providers = providers;
        self
    }

    pub fn mfa_provider(mut self, provider: MfaProviderKind) -> Self {
        self.config.auth.mfa_provider = provider;
        self
    }

    pub fn cookie_directory(mut self, dir: PathBuf) -> Self {
        self.config.auth.cookie_directory = dir;
        self
    }

    pub fn auth_only(mut self, enabled: bool) -> Self {
        self.config.auth.auth_only = enabled;
        self
    }

    pub fn domain(mut self, domain: ServiceDomain) -> Self {
        self.config.auth.domain = domain;
        self
    }

    // --- reporting ---

    pub fn notification_email(mut self, email: impl Into<String>) -> Self {
        self.config.reporting.notification_email = Some(email.into());
        self
    }

    pub fn notification_email_from(mut self, email: impl Into<String>) -> Self {
        self.config.reporting.notification_email_from = Some(email.into());
        self
    }

    pub fn smtp(mut self, smtp: SmtpConfig) -> Self {
        self.config.reporting.smtp = Some(smtp);
        self
    }

    pub fn notification_script(mut self, script: PathBuf) -> Self {
        self.config.reporting.notification_script = Some(script);
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
