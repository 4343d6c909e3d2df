//! Canonical path policy
//!
//! [`PathPlanner`] turns `(asset, rendition, config)` into on-disk paths.
//! Everything here is a pure function of its inputs: no clock reads, no
//! filesystem probes. The reconciliation engine asks for the canonical path
//! (the only path ever written), the admissible paths (any of which counts
//! as "already have it"), and the dedup variant used when two distinct
//! assets collide on the same canonical path.

use std::path::PathBuf;

use chrono::Locale;

use crate::config::{Config, FileMatchPolicy, LivePhotoMovPolicy};
use crate::domain::{Asset, DomainError, MediaHint, Rendition, SizeTag};

use super::sanitize::{
    fallback_base_name, insert_before_extension, sanitize_base_name, split_extension,
};
use super::template::{os_locale, FolderTemplate};

/// Path computation for one resolved configuration.
///
/// Construction parses and validates the folder template once; afterwards
/// every method is deterministic for a given asset and rendition.
#[derive(Debug, Clone)]
pub struct PathPlanner {
    directory: PathBuf,
    template: FolderTemplate,
    locale: Option<Locale>,
    match_policy: FileMatchPolicy,
    keep_unicode: bool,
    mov_policy: LivePhotoMovPolicy,
}

impl PathPlanner {
    /// Builds a planner from the resolved configuration.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTemplate` when the folder structure
    /// template does not parse.
    pub fn from_config(config: &Config) -> Result<Self, DomainError> {
        let template = FolderTemplate::parse(&config.output.folder_structure)?;
        let locale = if config.output.use_os_locale {
            os_locale()
        } else {
            None
        };

        Ok(Self {
            directory: config.output.directory.clone(),
            template,
            locale,
            match_policy: config.naming.file_match_policy,
            keep_unicode: config.naming.keep_unicode,
            mov_policy: config.sizes.live_photo_mov_policy,
        })
    }

    // ------------------------------------------------------------------
    // Still renditions
    // ------------------------------------------------------------------

    /// The canonical on-disk path for a still rendition. This is the only
    /// path new content is ever written to.
    pub fn canonical_still_path(
        &self,
        asset: &Asset,
        size: SizeTag,
        rendition: &Rendition,
    ) -> Result<PathBuf, DomainError> {
        let name = self.policy_name(asset, self.sized_still_name(asset, size, rendition));
        self.join(asset, name)
    }

    /// The collision-resolution path for a still rendition under
    /// `name-size-dedup-with-suffix`: the plain name with a `-{byte_length}`
    /// suffix before the extension.
    pub fn dedup_still_path(
        &self,
        asset: &Asset,
        size: SizeTag,
        rendition: &Rendition,
    ) -> Result<PathBuf, DomainError> {
        let plain = self.sized_still_name(asset, size, rendition);
        let name = insert_before_extension(&plain, &format!("-{}", rendition.byte_length));
        self.join(asset, name)
    }

    /// Every path at which previously written content for this rendition is
    /// accepted as present, canonical path first. The set covers both file
    /// match policies plus the size-dedup variant so a policy change between
    /// runs never re-downloads content.
    pub fn admissible_still_paths(
        &self,
        asset: &Asset,
        size: SizeTag,
        rendition: &Rendition,
    ) -> Result<Vec<PathBuf>, DomainError> {
        let plain = self.sized_still_name(asset, size, rendition);
        self.admissible(asset, plain, rendition.byte_length)
    }

    // ------------------------------------------------------------------
    // Live-photo video renditions
    // ------------------------------------------------------------------

    /// The canonical path of the video half of a live photo.
    ///
    /// The name derives from the paired still: under the `suffix` policy a
    /// HEIC still yields `<stem>_HEVC.MOV`, any other still `<stem>.MOV`;
    /// under the `original` policy the extension is simply replaced with
    /// `.MOV` (valid only together with `name-id7`, enforced at config
    /// validation).
    pub fn canonical_live_video_path(
        &self,
        asset: &Asset,
        live_size: SizeTag,
        still: &Rendition,
        _video: &Rendition,
    ) -> Result<PathBuf, DomainError> {
        let name = self.policy_name(asset, self.sized_video_name(asset, live_size, still));
        self.join(asset, name)
    }

    /// Collision-resolution path for a live video, suffixed with the video
    /// rendition's byte length.
    pub fn dedup_live_video_path(
        &self,
        asset: &Asset,
        live_size: SizeTag,
        still: &Rendition,
        video: &Rendition,
    ) -> Result<PathBuf, DomainError> {
        let plain = self.sized_video_name(asset, live_size, still);
        let name = insert_before_extension(&plain, &format!("-{}", video.byte_length));
        self.join(asset, name)
    }

    /// Admissible paths for a live video, canonical first.
    pub fn admissible_live_video_paths(
        &self,
        asset: &Asset,
        live_size: SizeTag,
        still: &Rendition,
        video: &Rendition,
    ) -> Result<Vec<PathBuf>, DomainError> {
        let plain = self.sized_video_name(asset, live_size, still);
        self.admissible(asset, plain, video.byte_length)
    }

    // ------------------------------------------------------------------
    // Name assembly
    // ------------------------------------------------------------------

    /// Base name of a still rendition with the size suffix applied.
    fn sized_still_name(&self, asset: &Asset, size: SizeTag, rendition: &Rendition) -> String {
        let base = self.base_name(asset, rendition);
        match size {
            SizeTag::Original | SizeTag::Alternative => base,
            SizeTag::Medium => insert_before_extension(&base, "-medium"),
            SizeTag::Thumb => insert_before_extension(&base, "-thumb"),
            SizeTag::Adjusted => {
                // Suffix only when the edit shares the original's extension;
                // a differing extension already disambiguates the file.
                let original_ext = asset
                    .rendition(SizeTag::Original)
                    .and_then(Rendition::extension);
                if original_ext.is_some() && original_ext == rendition.extension() {
                    insert_before_extension(&base, "-adjusted")
                } else {
                    base
                }
            }
        }
    }

    /// Name of the video half of a live photo with the size suffix applied.
    fn sized_video_name(&self, asset: &Asset, live_size: SizeTag, still: &Rendition) -> String {
        let still_base = self.base_name(asset, still);
        let (stem, ext) = split_extension(&still_base);

        let video_base = match self.mov_policy {
            LivePhotoMovPolicy::Suffix => {
                if ext.is_some_and(|e| e.eq_ignore_ascii_case("heic")) {
                    format!("{stem}_HEVC.MOV")
                } else {
                    format!("{stem}.MOV")
                }
            }
            LivePhotoMovPolicy::Original => format!("{stem}.MOV"),
        };

        match live_size {
            SizeTag::Medium => insert_before_extension(&video_base, "-medium"),
            SizeTag::Thumb => insert_before_extension(&video_base, "-thumb"),
            _ => video_base,
        }
    }

    /// Sanitized service filename, or the fingerprint fallback.
    fn base_name(&self, asset: &Asset, rendition: &Rendition) -> String {
        rendition
            .filename
            .as_deref()
            .and_then(|raw| sanitize_base_name(raw, self.keep_unicode))
            .unwrap_or_else(|| fallback_base_name(asset.id(), rendition.media_hint))
    }

    /// Applies the configured file match policy to a sized name.
    fn policy_name(&self, asset: &Asset, sized: String) -> String {
        match self.match_policy {
            FileMatchPolicy::NameSizeDedupWithSuffix => sized,
            FileMatchPolicy::NameId7 => {
                insert_before_extension(&sized, &format!("_{}", asset.id().token7()))
            }
        }
    }

    /// Orders the admissible variants for a sized name: current policy's
    /// canonical first, the other policy's name second, the size-dedup
    /// variant last.
    fn admissible(
        &self,
        asset: &Asset,
        plain: String,
        byte_length: u64,
    ) -> Result<Vec<PathBuf>, DomainError> {
        let id7 = insert_before_extension(&plain, &format!("_{}", asset.id().token7()));
        let sized = insert_before_extension(&plain, &format!("-{byte_length}"));

        let names = match self.match_policy {
            FileMatchPolicy::NameSizeDedupWithSuffix => [plain, id7, sized],
            FileMatchPolicy::NameId7 => [id7, plain, sized],
        };

        names
            .into_iter()
            .map(|name| self.join(asset, name))
            .collect()
    }

    /// `directory / folder_template(capture wall-clock) / name`.
    fn join(&self, asset: &Asset, name: String) -> Result<PathBuf, DomainError> {
        let wall_clock = asset
            .captured_at()
            .map(|c| c.wall_clock())
            .unwrap_or_else(|| asset.added_at().naive_utc());
        let folder = self.template.resolve(wall_clock, self.locale)?;
        Ok(self.directory.join(folder).join(name))
    }
}
