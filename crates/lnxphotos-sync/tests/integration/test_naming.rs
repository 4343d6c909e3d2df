//! Naming scenarios end-to-end: duplicate collision handling under both
//! file match policies, and live photo video naming.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use lnxphotos_core::config::{FileMatchPolicy, LivePhotoMovPolicy};
use lnxphotos_core::domain::AssetId;

use crate::common::{config, live_photo, photo, publish_asset, run_pass, FakeService};

#[tokio::test]
async fn duplicate_names_get_size_suffix_under_default_policy() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());

    // Two distinct assets, same filename, same capture date. The newer
    // added one (12345) is yielded first and claims the plain name.
    publish_asset(
        &service,
        &photo("asset-a", "IMG_0001.JPG", 12345, 1, "2025-01-02T10:00:00+00:00"),
    );
    publish_asset(
        &service,
        &photo("asset-b", "IMG_0001.JPG", 67890, 2, "2025-01-02T10:00:00+00:00"),
    );

    let cfg = config(tmp.path()).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;
    assert_eq!(outcome.summary.downloaded, 2);

    let dir = tmp.path().join("2025/01/02");
    let plain = std::fs::metadata(dir.join("IMG_0001.JPG")).unwrap();
    assert_eq!(plain.len(), 12345);
    let suffixed = std::fs::metadata(dir.join("IMG_0001-67890.JPG")).unwrap();
    assert_eq!(suffixed.len(), 67890);
}

#[tokio::test]
async fn duplicate_names_under_id7_policy_never_collide() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &photo("asset-a", "IMG_0001.JPG", 12345, 1, "2025-01-02T10:00:00+00:00"),
    );
    publish_asset(
        &service,
        &photo("asset-b", "IMG_0001.JPG", 67890, 2, "2025-01-02T10:00:00+00:00"),
    );

    let cfg = config(tmp.path())
        .file_match_policy(FileMatchPolicy::NameId7)
        .build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;
    assert_eq!(outcome.summary.downloaded, 2);

    let dir = tmp.path().join("2025/01/02");
    let tok_a = AssetId::new("asset-a".to_string()).unwrap().token7();
    let tok_b = AssetId::new("asset-b".to_string()).unwrap().token7();
    assert_ne!(tok_a, tok_b);
    assert!(dir.join(format!("IMG_0001_{tok_a}.JPG")).exists());
    assert!(dir.join(format!("IMG_0001_{tok_b}.JPG")).exists());
    assert!(!dir.join("IMG_0001.JPG").exists());
}

#[tokio::test]
async fn collision_against_predating_file_uses_suffix() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &photo("asset-b", "IMG_0001.JPG", 67890, 1, "2025-01-02T10:00:00+00:00"),
    );

    // A different asset's file already sits at the plain path from an
    // earlier run
    let dir = tmp.path().join("2025/01/02");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("IMG_0001.JPG"), vec![b'x'; 12345]).unwrap();

    let cfg = config(tmp.path()).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;

    assert_eq!(outcome.summary.downloaded, 1);
    assert_eq!(
        std::fs::metadata(dir.join("IMG_0001.JPG")).unwrap().len(),
        12345,
        "pre-existing file untouched"
    );
    assert_eq!(
        std::fs::metadata(dir.join("IMG_0001-67890.JPG"))
            .unwrap()
            .len(),
        67890
    );
}

#[tokio::test]
async fn live_video_suffix_policy_names_hevc_mov() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &live_photo("live-1", "IMG_1234.HEIC", 1000, 2000, 1, "2025-01-02T10:00:00+00:00"),
    );

    let cfg = config(tmp.path()).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;

    // Still and video both downloaded
    assert_eq!(outcome.summary.downloaded, 2);

    let dir = tmp.path().join("2025/01/02");
    assert!(dir.join("IMG_1234.HEIC").exists());
    let video = std::fs::metadata(dir.join("IMG_1234_HEVC.MOV")).unwrap();
    assert_eq!(video.len(), 2000);
}

#[tokio::test]
async fn live_video_original_policy_replaces_extension() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &live_photo("live-1", "IMG_1234.HEIC", 1000, 2000, 1, "2025-01-02T10:00:00+00:00"),
    );

    // `original` requires name-id7 (config validation enforces it)
    let cfg = config(tmp.path())
        .file_match_policy(FileMatchPolicy::NameId7)
        .live_photo_mov_policy(LivePhotoMovPolicy::Original)
        .build();
    assert!(cfg.validate().is_empty());

    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;
    assert_eq!(outcome.summary.downloaded, 2);

    let tok = AssetId::new("live-1".to_string()).unwrap().token7();
    let dir = tmp.path().join("2025/01/02");
    assert!(dir.join(format!("IMG_1234_{tok}.HEIC")).exists());
    assert!(dir.join(format!("IMG_1234_{tok}.MOV")).exists());
}

#[tokio::test]
async fn skip_live_photos_downloads_no_video() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &live_photo("live-1", "IMG_1234.HEIC", 1000, 2000, 1, "2025-01-02T10:00:00+00:00"),
    );
    publish_asset(
        &service,
        &photo("plain-1", "IMG_5.JPG", 100, 2, "2025-01-02T10:00:00+00:00"),
    );

    let cfg = config(tmp.path()).skip_live_photos(true).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;

    // The live asset is dropped by the kind filter entirely
    assert_eq!(outcome.summary.downloaded, 1);
    let dir = tmp.path().join("2025/01/02");
    assert!(dir.join("IMG_5.JPG").exists());
    assert!(!dir.join("IMG_1234.HEIC").exists());
    assert!(!dir.join("IMG_1234_HEVC.MOV").exists());
}
