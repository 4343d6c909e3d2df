//! Basic reconciliation: download with mtime provenance, idempotent
//! re-runs, until-found termination, dry-run.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::common::{config, photo, publish_asset, run_pass, FakeService};

#[tokio::test]
async fn basic_download_lands_at_dated_path_with_provenance_mtime() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &photo("a1", "IMG_1234.HEIC", 1000, 1, "2025-01-02T10:00:00+00:00"),
    );

    let cfg = config(tmp.path()).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;

    assert_eq!(outcome.summary.downloaded, 1);

    let expected = tmp.path().join("2025/01/02/IMG_1234.HEIC");
    let metadata = std::fs::metadata(&expected).expect("file published");
    assert_eq!(metadata.len(), 1000);

    // mtime = capture instant, 2025-01-02T10:00:00Z
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    assert_eq!(mtime.unix_seconds(), 1735812000);

    // No stray partial
    assert!(!tmp.path().join("2025/01/02/IMG_1234.HEIC.part").exists());
}

#[tokio::test]
async fn second_pass_downloads_nothing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &photo("a1", "IMG_1.JPG", 500, 1, "2025-01-02T10:00:00+00:00"),
    );
    publish_asset(
        &service,
        &photo("a2", "IMG_2.JPG", 600, 2, "2025-01-03T10:00:00+00:00"),
    );

    let cfg = config(tmp.path()).build();

    let first = run_pass(service.clone(), &cfg, CancellationToken::new()).await;
    assert_eq!(first.summary.downloaded, 2);
    assert!(first.plan.is_empty());

    let second = run_pass(service, &cfg, CancellationToken::new()).await;
    assert_eq!(second.summary.downloaded, 0);
    assert_eq!(second.summary.already_present, 2);
    assert!(second.plan.is_empty());
}

#[tokio::test]
async fn until_found_stops_after_n_consecutive_existing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());

    // Ten assets, all already on disk
    for i in 0..10 {
        let asset = photo(
            &format!("asset-{i}"),
            &format!("IMG_{i:04}.JPG"),
            100,
            i,
            "2025-01-02T10:00:00+00:00",
        );
        publish_asset(&service, &asset);
        let dir = tmp.path().join("2025/01/02");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("IMG_{i:04}.JPG")), vec![b'x'; 100]).unwrap();
    }

    let cfg = config(tmp.path()).until_found(5).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;

    // Exactly five probes, all existing, then the iterator stops
    assert_eq!(outcome.summary.assets_seen, 5);
    assert_eq!(outcome.summary.already_present, 5);
    assert_eq!(outcome.summary.downloaded, 0);
}

#[tokio::test]
async fn dry_run_decides_but_writes_nothing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &photo("a1", "IMG_1.JPG", 500, 1, "2025-01-02T10:00:00+00:00"),
    );

    let cfg = config(tmp.path()).dry_run(true).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;

    assert_eq!(outcome.summary.would_download, 1);
    assert_eq!(outcome.summary.downloaded, 0);
    assert!(!tmp.path().join("2025/01/02/IMG_1.JPG").exists());
}

#[tokio::test]
async fn recent_limits_pass_to_newest_assets() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    for i in 0..6 {
        publish_asset(
            &service,
            &photo(
                &format!("asset-{i}"),
                &format!("IMG_{i:04}.JPG"),
                100,
                i,
                "2025-01-02T10:00:00+00:00",
            ),
        );
    }

    let cfg = config(tmp.path()).recent(2).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;

    assert_eq!(outcome.summary.assets_seen, 2);
    assert_eq!(outcome.summary.downloaded, 2);
    // Newest added first
    assert!(tmp.path().join("2025/01/02/IMG_0000.JPG").exists());
    assert!(tmp.path().join("2025/01/02/IMG_0001.JPG").exists());
    assert!(!tmp.path().join("2025/01/02/IMG_0002.JPG").exists());
}

#[tokio::test]
async fn legacy_path_counts_as_present_without_rename() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    let asset = photo("a1", "IMG_1.JPG", 100, 1, "2025-01-02T10:00:00+00:00");
    publish_asset(&service, &asset);

    // File exists under the other policy's name (id7 token)
    let dir = tmp.path().join("2025/01/02");
    std::fs::create_dir_all(&dir).unwrap();
    let legacy_name = format!("IMG_1_{}.JPG", asset.id().token7());
    std::fs::write(dir.join(&legacy_name), vec![b'x'; 100]).unwrap();

    let cfg = config(tmp.path()).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;

    assert_eq!(outcome.summary.already_present, 1);
    assert_eq!(outcome.summary.downloaded, 0);
    // No rename: the canonical plain name was not created
    assert!(dir.join(&legacy_name).exists());
    assert!(!dir.join("IMG_1.JPG").exists());
}
