//! Version selection
//!
//! Given an asset's available renditions and the user's ordered size list,
//! decides which renditions to download and under which logical identity.
//! Pure policy: the selector never touches the network or filesystem, and
//! RAW/JPEG relabeling happens here so naming and reconciliation only ever
//! see the effective assignment.

use std::collections::BTreeMap;
use std::collections::HashSet;

use crate::config::{AlignRawPolicy, SizeConfig};
use crate::domain::{Asset, Rendition, SizeTag};

/// One download decision: a still rendition under a logical size, plus the
/// correlated live-photo video when the asset has one.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Logical identity the rendition is downloaded under (drives naming)
    pub logical_size: SizeTag,
    pub still: Rendition,
    /// The live-photo video rendition, attached to the first selection of
    /// the asset so it is fetched exactly once per pass.
    pub live_video: Option<Rendition>,
}

/// Applies the requested sizes to an asset's renditions.
///
/// Rules:
/// 1. A requested size present on the asset is selected as-is.
/// 2. An absent size falls back to `original` unless `force_size` is set;
///    the fallback is emitted at most once no matter how many requested
///    sizes fall back.
/// 3. `adjusted` always falls back to `original` when no edit exists.
/// 4. `alternative` is only selectable on two-representation assets; the
///    `align_raw` policy decides which representation carries which label.
/// 5. For live assets the video rendition under `live_photo_size` is
///    attached (with its own fallback to the original-size video), unless
///    `skip_live` is set.
#[must_use]
pub fn select(asset: &Asset, sizes: &SizeConfig, skip_live: bool) -> Vec<Selection> {
    let renditions = apply_raw_policy(asset.renditions(), sizes.align_raw);

    let mut selections: Vec<Selection> = Vec::new();
    let mut emitted: HashSet<SizeTag> = HashSet::new();

    for &requested in &sizes.sizes {
        let (logical, rendition) = match renditions.get(&requested) {
            Some(r) => (requested, r),
            None => {
                // Rule 2/3: fall back to original. `force_size` suppresses
                // the fallback except for `adjusted`, whose fallback is
                // unconditional (an unedited asset has nothing else to give).
                if sizes.force_size && requested != SizeTag::Adjusted {
                    continue;
                }
                match renditions.get(&SizeTag::Original) {
                    Some(original) => (SizeTag::Original, original),
                    None => continue,
                }
            }
        };

        if !emitted.insert(logical) {
            continue;
        }
        selections.push(Selection {
            logical_size: logical,
            still: rendition.clone(),
            live_video: None,
        });
    }

    if asset.is_live() && !skip_live {
        let video = asset
            .live_video(sizes.live_photo_size)
            .or_else(|| asset.live_video(SizeTag::Original));
        if let (Some(video), Some(first)) = (video, selections.first_mut()) {
            first.live_video = Some(video.clone());
        }
    }

    selections
}

/// Relabels the `original`/`alternative` pair of a RAW+JPEG asset according
/// to the configured policy. Assets without an alternative representation
/// pass through untouched.
fn apply_raw_policy(
    renditions: &BTreeMap<SizeTag, Rendition>,
    policy: AlignRawPolicy,
) -> BTreeMap<SizeTag, Rendition> {
    let mut out = renditions.clone();

    let (Some(original), Some(alternative)) =
        (out.get(&SizeTag::Original), out.get(&SizeTag::Alternative))
    else {
        return out;
    };

    let swap = match policy {
        AlignRawPolicy::AsIs => false,
        // RAW must be labeled original
        AlignRawPolicy::Original => !original.is_raw() && alternative.is_raw(),
        // JPEG must be labeled original
        AlignRawPolicy::Alternative => original.is_raw() && !alternative.is_raw(),
    };

    if swap {
        if let (Some(mut first), Some(mut second)) = (
            out.remove(&SizeTag::Original),
            out.remove(&SizeTag::Alternative),
        ) {
            std::mem::swap(&mut first.size_tag, &mut second.size_tag);
            out.insert(first.size_tag, first);
            out.insert(second.size_tag, second);
        }
    }

    out
}
