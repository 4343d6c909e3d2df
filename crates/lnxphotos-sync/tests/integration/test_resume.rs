//! Interruption and resume: a cancelled pass leaves a partial behind, the
//! next pass continues from the same byte offset and publishes exactly one
//! complete file.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use lnxphotos_sync::LocalIndex;

use crate::common::{config, photo, publish_asset, run_pass, FakeService};

#[tokio::test]
async fn interrupted_download_resumes_on_next_pass() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &photo("a1", "IMG_A.JPG", 1000, 1, "2025-01-02T10:00:00+00:00"),
    );

    // Pass A: the stream stalls after 600 bytes and trips the cancel token
    let cancel = CancellationToken::new();
    service.stall_at("fake://a1/original", 600, cancel.clone());

    let outcome = run_pass(service.clone(), &config(tmp.path()).build(), cancel).await;
    assert!(outcome.cancelled);
    assert_eq!(outcome.summary.downloaded, 0);

    let target = tmp.path().join("2025/01/02/IMG_A.JPG");
    let part = LocalIndex::part_path(&target);
    assert!(!target.exists());
    assert_eq!(std::fs::metadata(&part).unwrap().len(), 600);

    // Pass B: same config, stall removed; continues from byte 600
    service.clear_stalls();
    let outcome = run_pass(
        service,
        &config(tmp.path()).build(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.summary.downloaded, 1);
    assert_eq!(outcome.summary.resumed, 1);
    assert_eq!(std::fs::metadata(&target).unwrap().len(), 1000);
    assert!(!part.exists());
}

#[tokio::test]
async fn oversized_partial_is_discarded_and_restarted() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &photo("a1", "IMG_A.JPG", 1000, 1, "2025-01-02T10:00:00+00:00"),
    );

    // A stale partial longer than the rendition itself
    let target = tmp.path().join("2025/01/02/IMG_A.JPG");
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    std::fs::write(LocalIndex::part_path(&target), vec![b'z'; 1500]).unwrap();

    let outcome = run_pass(
        service,
        &config(tmp.path()).build(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.summary.downloaded, 1);
    // Restarted from zero, so not counted as a resume
    assert_eq!(outcome.summary.resumed, 0);
    assert_eq!(std::fs::metadata(&target).unwrap().len(), 1000);
}

#[tokio::test]
async fn exact_length_partial_is_published_without_refetch() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &photo("a1", "IMG_A.JPG", 1000, 1, "2025-01-02T10:00:00+00:00"),
    );

    let target = tmp.path().join("2025/01/02/IMG_A.JPG");
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    std::fs::write(LocalIndex::part_path(&target), vec![b'x'; 1000]).unwrap();

    let outcome = run_pass(
        service,
        &config(tmp.path()).build(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.summary.downloaded, 1);
    assert_eq!(outcome.summary.resumed, 1);
    assert_eq!(std::fs::metadata(&target).unwrap().len(), 1000);
    assert!(!LocalIndex::part_path(&target).exists());
}

#[tokio::test]
async fn cancellation_mid_pass_preserves_later_assets_for_next_run() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());

    // Newest asset stalls; the older one would be processed after it
    publish_asset(
        &service,
        &photo("first", "IMG_0.JPG", 500, 1, "2025-01-02T10:00:00+00:00"),
    );
    publish_asset(
        &service,
        &photo("second", "IMG_1.JPG", 500, 2, "2025-01-02T10:00:00+00:00"),
    );

    let cancel = CancellationToken::new();
    service.stall_at("fake://first/original", 200, cancel.clone());

    let outcome = run_pass(service.clone(), &config(tmp.path()).build(), cancel).await;
    assert!(outcome.cancelled);

    // Nothing published yet; next pass finishes both
    service.clear_stalls();
    let outcome = run_pass(
        service,
        &config(tmp.path()).build(),
        CancellationToken::new(),
    )
    .await;
    assert_eq!(outcome.summary.downloaded, 2);
    assert!(tmp.path().join("2025/01/02/IMG_0.JPG").exists());
    assert!(tmp.path().join("2025/01/02/IMG_1.JPG").exists());
}
