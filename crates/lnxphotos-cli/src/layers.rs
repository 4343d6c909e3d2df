//! Layered argument parsing
//!
//! One invocation can drive several account configurations: every option
//! appearing before the first `--username` contributes to the defaults
//! block, options after a `--username` bind to that configuration, and the
//! same user may appear twice to produce distinct configurations (photos
//! and videos into different trees, say).
//!
//! The splitter below cuts raw argv at `--username` boundaries; every
//! segment is then parsed by the same clap derive struct and merged
//! (account over defaults) before materializing a validated core `Config`.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;

use lnxphotos_core::config::{
    AlignRawPolicy, AuthConfig, Config, ConfigBuilder, FileMatchPolicy, LibraryScope,
    LivePhotoMovPolicy, MfaProviderKind, PasswordProviderKind, ServiceDomain, SmtpConfig,
};
use lnxphotos_core::domain::{SizeTag, Username};

/// One segment's worth of options. Every field is optional so the same
/// struct parses the defaults block and each account block.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "lnxphotos",
    version,
    about = "Native iCloud Photos downloader and sync engine for Linux"
)]
pub struct SegmentArgs {
    // --- output ---
    /// Root directory of the local photo tree
    #[arg(long, short = 'd')]
    pub directory: Option<PathBuf>,

    /// Folder template, e.g. "{:%Y/%m/%d}" or "none"
    #[arg(long)]
    pub folder_structure: Option<String>,

    /// Render month/day names with the OS locale
    #[arg(long)]
    pub use_os_locale: bool,

    // --- filters ---
    /// Album to sync (repeatable; albums are unioned)
    #[arg(long)]
    pub album: Vec<String>,

    /// Library to sync: personal or shared
    #[arg(long)]
    pub library: Option<LibraryScope>,

    /// Sync only the N most recently added assets
    #[arg(long)]
    pub recent: Option<u64>,

    /// Stop after N consecutive already-downloaded assets
    #[arg(long)]
    pub until_found: Option<u64>,

    #[arg(long)]
    pub skip_videos: bool,

    #[arg(long)]
    pub skip_photos: bool,

    #[arg(long)]
    pub skip_live_photos: bool,

    /// Skip assets created before this date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub skip_created_before: Option<String>,

    /// Skip assets created after this date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub skip_created_after: Option<String>,

    // --- sizes ---
    /// Rendition size to download (repeatable)
    #[arg(long)]
    pub size: Vec<SizeTag>,

    /// Skip a requested size instead of falling back to original
    #[arg(long)]
    pub force_size: bool,

    /// Size of the video half of live photos
    #[arg(long)]
    pub live_photo_size: Option<SizeTag>,

    /// Naming of live photo videos: suffix or original
    #[arg(long)]
    pub live_photo_mov_filename_policy: Option<LivePhotoMovPolicy>,

    /// RAW+JPEG labeling: original, alternative, or as-is
    #[arg(long)]
    pub align_raw: Option<AlignRawPolicy>,

    // --- naming ---
    /// Collision policy: name-size-dedup-with-suffix or name-id7
    #[arg(long)]
    pub file_match_policy: Option<FileMatchPolicy>,

    /// Keep non-ASCII characters in file names
    #[arg(long)]
    pub keep_unicode_in_filenames: bool,

    // --- mode ---
    /// Delete local files of assets in Recently-Deleted
    #[arg(long)]
    pub auto_delete: bool,

    /// Deprecated: move just-downloaded assets to Recently-Deleted
    #[arg(long)]
    pub delete_after_download: bool,

    /// Move assets older than N days to Recently-Deleted after download
    #[arg(long)]
    pub keep_icloud_recent_days: Option<u32>,

    // --- side effects ---
    /// Write DateTimeOriginal into JPEGs that lack it
    #[arg(long)]
    pub set_exif_datetime: bool,

    /// Write an XMP sidecar next to each download
    #[arg(long)]
    pub xmp_sidecar: bool,

    /// Decide everything, change nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Print target paths to stdout and do nothing else
    #[arg(long)]
    pub only_print_filenames: bool,

    // --- loop ---
    /// Keep running, sleeping this many seconds between passes
    #[arg(long)]
    pub watch_with_interval: Option<u64>,

    // --- auth ---
    /// Account password (prefer a password provider)
    #[arg(long)]
    pub password: Option<String>,

    /// Password source, in order (repeatable): parameter, keyring,
    /// console, webui
    #[arg(long = "password-provider")]
    pub password_providers: Vec<PasswordProviderKind>,

    /// Two-factor code source: console or webui
    #[arg(long)]
    pub mfa_provider: Option<MfaProviderKind>,

    /// Directory holding session cookies and tokens
    #[arg(long)]
    pub cookie_directory: Option<PathBuf>,

    /// Authenticate and exit
    #[arg(long)]
    pub auth_only: bool,

    /// Service region: com or cn
    #[arg(long)]
    pub domain: Option<ServiceDomain>,

    // --- reporting ---
    #[arg(long)]
    pub notification_email: Option<String>,

    #[arg(long)]
    pub notification_email_from: Option<String>,

    #[arg(long)]
    pub smtp_host: Option<String>,

    #[arg(long)]
    pub smtp_port: Option<u16>,

    #[arg(long)]
    pub smtp_username: Option<String>,

    #[arg(long)]
    pub smtp_password: Option<String>,

    #[arg(long)]
    pub smtp_no_tls: bool,

    /// Script to run when re-authentication is required
    #[arg(long)]
    pub notification_script: Option<PathBuf>,

    // --- global ---
    /// Verbose output (repeatable: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl SegmentArgs {
    /// Folds an account segment over the defaults segment: scalars from
    /// the account win, lists replace when non-empty, flags are additive.
    #[must_use]
    pub fn merged_over(self, defaults: &SegmentArgs) -> SegmentArgs {
        let d = defaults.clone();
        SegmentArgs {
            directory: self.directory.or(d.directory),
            folder_structure: self.folder_structure.or(d.folder_structure),
            use_os_locale: self.use_os_locale || d.use_os_locale,
            album: if self.album.is_empty() { d.album } else { self.album },
            library: self.library.or(d.library),
            recent: self.recent.or(d.recent),
            until_found: self.until_found.or(d.until_found),
            skip_videos: self.skip_videos || d.skip_videos,
            skip_photos: self.skip_photos || d.skip_photos,
            skip_live_photos: self.skip_live_photos || d.skip_live_photos,
            skip_created_before: self.skip_created_before.or(d.skip_created_before),
            skip_created_after: self.skip_created_after.or(d.skip_created_after),
            size: if self.size.is_empty() { d.size } else { self.size },
            force_size: self.force_size || d.force_size,
            live_photo_size: self.live_photo_size.or(d.live_photo_size),
            live_photo_mov_filename_policy: self
                .live_photo_mov_filename_policy
                .or(d.live_photo_mov_filename_policy),
            align_raw: self.align_raw.or(d.align_raw),
            file_match_policy: self.file_match_policy.or(d.file_match_policy),
            keep_unicode_in_filenames: self.keep_unicode_in_filenames
                || d.keep_unicode_in_filenames,
            auto_delete: self.auto_delete || d.auto_delete,
            delete_after_download: self.delete_after_download || d.delete_after_download,
            keep_icloud_recent_days: self.keep_icloud_recent_days.or(d.keep_icloud_recent_days),
            set_exif_datetime: self.set_exif_datetime || d.set_exif_datetime,
            xmp_sidecar: self.xmp_sidecar || d.xmp_sidecar,
            dry_run: self.dry_run || d.dry_run,
            only_print_filenames: self.only_print_filenames || d.only_print_filenames,
            watch_with_interval: self.watch_with_interval.or(d.watch_with_interval),
            password: self.password.or(d.password),
            password_providers: if self.password_providers.is_empty() {
                d.password_providers
            } else {
                self.password_providers
            },
            mfa_provider: self.mfa_provider.or(d.mfa_provider),
            cookie_directory: self.cookie_directory.or(d.cookie_directory),
            auth_only: self.auth_only || d.auth_only,
            domain: self.domain.or(d.domain),
            notification_email: self.notification_email.or(d.notification_email),
            notification_email_from: self.notification_email_from.or(d.notification_email_from),
            smtp_host: self.smtp_host.or(d.smtp_host),
            smtp_port: self.smtp_port.or(d.smtp_port),
            smtp_username: self.smtp_username.or(d.smtp_username),
            smtp_password: self.smtp_password.or(d.smtp_password),
            smtp_no_tls: self.smtp_no_tls || d.smtp_no_tls,
            notification_script: self.notification_script.or(d.notification_script),
            verbose: self.verbose.max(d.verbose),
        }
    }
}

/// The fully split invocation: shared defaults plus one entry per
/// `--username` occurrence, in command-line order.
#[derive(Debug)]
pub struct LayeredInvocation {
    pub defaults: SegmentArgs,
    pub accounts: Vec<(Username, SegmentArgs)>,
}

/// Splits raw argv (without the program name) at `--username` boundaries
/// and parses every segment.
pub fn parse_layers(args: &[String]) -> Result<LayeredInvocation, String> {
    let mut segments: Vec<(Option<String>, Vec<String>)> = vec![(None, Vec::new())];

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "--username" {
            let value = iter
                .next()
                .ok_or_else(|| "--username requires a value".to_string())?;
            segments.push((Some(value.clone()), Vec::new()));
        } else if let Some(value) = arg.strip_prefix("--username=") {
            segments.push((Some(value.to_string()), Vec::new()));
        } else {
            // Use match to get mutable access to last segment's args
            if let Some(last) = segments.last_mut() {
                last.1.push(arg.clone());
            }
        }
    }

    let mut iter = segments.into_iter();
    let (_, default_args) = iter.next().unwrap_or((None, Vec::new()));
    let defaults = parse_segment(&default_args)?;

    let mut accounts = Vec::new();
    for (username, segment_args) in iter {
        let username = username
            .ok_or_else(|| "internal: account segment without username".to_string())
            .and_then(|raw| Username::new(raw).map_err(|e| e.to_string()))?;
        let parsed = parse_segment(&segment_args)?;
        accounts.push((username, parsed));
    }

    if accounts.is_empty() {
        return Err("at least one --username is required".to_string());
    }

    Ok(LayeredInvocation { defaults, accounts })
}

fn parse_segment(args: &[String]) -> Result<SegmentArgs, String> {
    let mut argv = vec!["lnxphotos".to_string()];
    argv.extend_from_slice(args);
    SegmentArgs::try_parse_from(&argv).map_err(|err| {
        if matches!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
        ) {
            err.exit();
        }
        err.to_string()
    })
}

/// Materializes one account's merged arguments into a validated core
/// configuration.
pub fn materialize(username: Username, args: SegmentArgs) -> Result<Config, String> {
    let directory = args
        .directory
        .ok_or_else(|| format!("--directory is required (account {username})"))?;

    let mut builder = ConfigBuilder::new(username, directory);

    if let Some(template) = args.folder_structure {
        builder = builder.folder_structure(template);
    }
    builder = builder.use_os_locale(args.use_os_locale);
    if args.use_os_locale {
        // Floating capture times resolve through the machine's offset
        // instead of UTC when the OS locale is in charge
        let offset = chrono::Local::now().offset().local_minus_utc();
        builder = builder.fallback_offset_seconds(offset);
    }
    if !args.album.is_empty() {
        builder = builder.albums(args.album);
    }
    if let Some(library) = args.library {
        builder = builder.library(library);
    }
    if let Some(recent) = args.recent {
        builder = builder.recent(recent);
    }
    if let Some(until_found) = args.until_found {
        builder = builder.until_found(until_found);
    }
    builder = builder
        .skip_videos(args.skip_videos)
        .skip_photos(args.skip_photos)
        .skip_live_photos(args.skip_live_photos);
    if let Some(raw) = args.skip_created_before {
        builder = builder.skip_created_before(parse_date(&raw)?);
    }
    if let Some(raw) = args.skip_created_after {
        builder = builder.skip_created_after(parse_date(&raw)?);
    }

    if !args.size.is_empty() {
        builder = builder.sizes(args.size);
    }
    builder = builder.force_size(args.force_size);
    if let Some(size) = args.live_photo_size {
        builder = builder.live_photo_size(size);
    }
    if let Some(policy) = args.live_photo_mov_filename_policy {
        builder = builder.live_photo_mov_policy(policy);
    }
    if let Some(policy) = args.align_raw {
        builder = builder.align_raw(policy);
    }

    if let Some(policy) = args.file_match_policy {
        builder = builder.file_match_policy(policy);
    }
    builder = builder.keep_unicode(args.keep_unicode_in_filenames);

    builder = builder
        .auto_delete(args.auto_delete)
        .delete_after_download(args.delete_after_download);
    if let Some(days) = args.keep_icloud_recent_days {
        builder = builder.keep_icloud_recent_days(days);
    }

    builder = builder
        .set_exif_datetime(args.set_exif_datetime)
        .xmp_sidecar(args.xmp_sidecar)
        .dry_run(args.dry_run)
        .only_print_filenames(args.only_print_filenames);

    if let Some(interval) = args.watch_with_interval {
        builder = builder.watch_interval_seconds(interval);
    }

    if let Some(password) = args.password {
        builder = builder.password(password);
    }
    if !args.password_providers.is_empty() {
        builder = builder.password_providers(args.password_providers);
    }
    if let Some(provider) = args.mfa_provider {
        builder = builder.mfa_provider(provider);
    }
    builder = builder.cookie_directory(
        args.cookie_directory
            .unwrap_or_else(AuthConfig::default_cookie_directory),
    );
    builder = builder.auth_only(args.auth_only);
    if let Some(domain) = args.domain {
        builder = builder.domain(domain);
    }

    if let Some(email) = args.notification_email {
        builder = builder.notification_email(email);
    }
    if let Some(from) = args.notification_email_from {
        builder = builder.notification_email_from(from);
    }
    if args.smtp_host.is_some()
        || args.smtp_port.is_some()
        || args.smtp_username.is_some()
        || args.smtp_no_tls
    {
        let mut smtp = SmtpConfig::default();
        if let Some(host) = args.smtp_host {
            smtp.host = host;
        }
        if let Some(port) = args.smtp_port {
            smtp.port = port;
        }
        smtp.username = args.smtp_username;
        smtp.password = args.smtp_password;
        smtp.no_tls = args.smtp_no_tls;
        builder = builder.smtp(smtp);
    }
    if let Some(script) = args.notification_script {
        builder = builder.notification_script(script);
    }

    builder.build_validated().map_err(|errors| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    })
}

/// Accepts a bare date (midnight UTC) or a full RFC 3339 timestamp.
fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::from_naive_utc_and_offset(midnight, Utc));
        }
    }
    Err(format!(
        "invalid date '{raw}': expected YYYY-MM-DD or RFC 3339"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_requires_username() {
        let err = parse_layers(&argv("--directory /out")).unwrap_err();
        assert!(err.contains("--username"));
    }

    #[test]
    fn test_single_account_with_defaults() {
        let layers = parse_layers(&argv(
            "--directory /out --recent 10 --username user@example.com --skip-videos",
        ))
        .unwrap();

        assert_eq!(layers.accounts.len(), 1);
        assert_eq!(layers.defaults.recent, Some(10));

        let (username, args) = layers.accounts.into_iter().next().unwrap();
        let merged = args.merged_over(&layers.defaults);
        assert_eq!(username.as_str(), "user@example.com");
        assert_eq!(merged.directory, Some(PathBuf::from("/out")));
        assert_eq!(merged.recent, Some(10));
        assert!(merged.skip_videos);
    }

    #[test]
    fn test_same_user_twice_produces_two_configs() {
        let layers = parse_layers(&argv(
            "--username user@example.com --directory /photos --skip-videos \
             --username user@example.com --directory /videos --skip-photos",
        ))
        .unwrap();

        assert_eq!(layers.accounts.len(), 2);
        let first = layers.accounts[0].1.clone().merged_over(&layers.defaults);
        let second = layers.accounts[1].1.clone().merged_over(&layers.defaults);
        assert_eq!(first.directory, Some(PathBuf::from("/photos")));
        assert!(first.skip_videos && !first.skip_photos);
        assert_eq!(second.directory, Some(PathBuf::from("/videos")));
        assert!(second.skip_photos && !second.skip_videos);
    }

    #[test]
    fn test_account_overrides_defaults() {
        let layers = parse_layers(&argv(
            "--recent 10 --size thumb --username a@example.com --recent 5 --size original --size medium",
        ))
        .unwrap();

        let merged = layers.accounts[0].1.clone().merged_over(&layers.defaults);
        assert_eq!(merged.recent, Some(5));
        assert_eq!(merged.size, vec![SizeTag::Original, SizeTag::Medium]);
    }

    #[test]
    fn test_username_equals_form() {
        let layers =
            parse_layers(&argv("--directory /out --username=user@example.com")).unwrap();
        assert_eq!(layers.accounts[0].0.as_str(), "user@example.com");
    }

    #[test]
    fn test_invalid_username_rejected() {
        assert!(parse_layers(&argv("--username not-an-email")).is_err());
    }

    #[test]
    fn test_materialize_minimal() {
        let layers = parse_layers(&argv("--directory /out --username user@example.com")).unwrap();
        let (username, args) = layers.accounts.into_iter().next().unwrap();
        let config = materialize(username, args.merged_over(&layers.defaults)).unwrap();

        assert_eq!(config.output.directory, PathBuf::from("/out"));
        assert_eq!(config.sizes.sizes, vec![SizeTag::Original]);
    }

    #[test]
    fn test_materialize_requires_directory() {
        let layers = parse_layers(&argv("--username user@example.com")).unwrap();
        let (username, args) = layers.accounts.into_iter().next().unwrap();
        let err = materialize(username, args.merged_over(&layers.defaults)).unwrap_err();
        assert!(err.contains("--directory"));
    }

    #[test]
    fn test_materialize_rejects_invalid_combination() {
        let layers = parse_layers(&argv(
            "--directory /out --auto-delete --keep-icloud-recent-days 7 \
             --username user@example.com",
        ))
        .unwrap();
        let (username, args) = layers.accounts.into_iter().next().unwrap();
        assert!(materialize(username, args.merged_over(&layers.defaults)).is_err());
    }

    #[test]
    fn test_parse_date_forms() {
        assert_eq!(
            parse_date("2025-01-02").unwrap().to_rfc3339(),
            "2025-01-02T00:00:00+00:00"
        );
        assert_eq!(
            parse_date("2025-01-02T10:30:00+02:00").unwrap().to_rfc3339(),
            "2025-01-02T08:30:00+00:00"
        );
        assert!(parse_date("January 2nd").is_err());
    }

    #[test]
    fn test_policy_values_parse() {
        let layers = parse_layers(&argv(
            "--directory /out --file-match-policy name-id7 \
             --live-photo-mov-filename-policy original --align-raw as-is \
             --password-provider keyring --password-provider console \
             --username user@example.com",
        ))
        .unwrap();
        let merged = layers.accounts[0].1.clone().merged_over(&layers.defaults);
        assert_eq!(merged.file_match_policy, Some(FileMatchPolicy::NameId7));
        assert_eq!(
            merged.password_providers,
            vec![PasswordProviderKind::Keyring, PasswordProviderKind::Console]
        );
    }
}
