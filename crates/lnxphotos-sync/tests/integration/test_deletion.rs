//! Deletion scenarios: filter-bounded remote deletion, the deprecated
//! delete-after-download restriction, and Recently-Deleted mirroring.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use lnxphotos_core::domain::AssetId;
use lnxphotos_core::ports::NullEventSink;
use lnxphotos_sync::{DeletionPlanner, LocalIndex};

use crate::common::{config, photo, publish_asset, run_pass, video, FakeService};

/// Captured forty days ago, well past the 30-day retention window.
fn old_capture() -> String {
    (chrono::Utc::now() - chrono::Duration::days(40)).to_rfc3339()
}

/// Stamps a pre-placed file with the provenance mtime the engine would
/// have written, so the deletion guard accepts it as the recorded content.
fn stamp_provenance(path: &std::path::Path, captured_rfc3339: &str) {
    let instant = chrono::DateTime::parse_from_rfc3339(captured_rfc3339).unwrap();
    filetime::set_file_mtime(
        path,
        filetime::FileTime::from_unix_time(instant.timestamp(), 0),
    )
    .unwrap();
}

#[tokio::test]
async fn keep_icloud_recent_days_spares_filtered_videos() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());

    for i in 0..3 {
        publish_asset(
            &service,
            &photo(&format!("photo-{i}"), &format!("IMG_{i}.JPG"), 100, i, &old_capture()),
        );
    }
    for i in 0..4 {
        publish_asset(
            &service,
            &video(&format!("video-{i}"), &format!("MOV_{i}.MP4"), 200, 10 + i, &old_capture()),
        );
    }

    let cfg = config(tmp.path())
        .skip_videos(true)
        .keep_icloud_recent_days(30)
        .build();

    let mut outcome = run_pass(service.clone(), &cfg, CancellationToken::new()).await;

    // Photos downloaded, videos never touched
    assert_eq!(outcome.summary.downloaded, 3);
    assert_eq!(outcome.plan.remote.len(), 3);
    assert!(outcome
        .plan
        .remote
        .iter()
        .all(|id| id.as_str().starts_with("photo-")));

    // Realize: the three photos move to Recently-Deleted remotely
    let planner = DeletionPlanner::new(
        service.clone(),
        LocalIndex::new(tmp.path()),
        Arc::new(NullEventSink),
        false,
        CancellationToken::new(),
    );
    let stats = planner.realize(&mut outcome.plan).await.unwrap();
    assert_eq!(stats.remote_deleted, 3);

    let deleted = service.deleted_ids();
    assert_eq!(deleted.len(), 3);
    assert!(deleted.iter().all(|id| id.as_str().starts_with("photo-")));
}

#[tokio::test]
async fn keep_icloud_recent_days_zero_deletes_every_processed_asset() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &photo("fresh", "IMG_0.JPG", 100, 1, &chrono::Utc::now().to_rfc3339()),
    );

    let cfg = config(tmp.path()).keep_icloud_recent_days(0).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;

    assert_eq!(outcome.plan.remote.len(), 1);
}

#[tokio::test]
async fn recent_assets_survive_the_retention_window() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(
        &service,
        &photo("fresh", "IMG_0.JPG", 100, 1, &chrono::Utc::now().to_rfc3339()),
    );
    publish_asset(&service, &photo("old", "IMG_1.JPG", 100, 2, &old_capture()));

    let cfg = config(tmp.path()).keep_icloud_recent_days(30).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;

    assert_eq!(outcome.plan.remote.len(), 1);
    assert_eq!(outcome.plan.remote[0].as_str(), "old");
}

#[tokio::test]
async fn delete_after_download_marks_only_downloaded_assets() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());

    let present = photo("present", "IMG_0.JPG", 100, 1, "2025-01-02T10:00:00+00:00");
    publish_asset(&service, &present);
    publish_asset(
        &service,
        &photo("missing", "IMG_1.JPG", 100, 2, "2025-01-02T10:00:00+00:00"),
    );

    // IMG_0 already on disk: confirmed present, not downloaded
    let dir = tmp.path().join("2025/01/02");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("IMG_0.JPG"), vec![b'x'; 100]).unwrap();

    let cfg = config(tmp.path()).delete_after_download(true).build();
    let outcome = run_pass(service, &cfg, CancellationToken::new()).await;

    assert_eq!(outcome.summary.downloaded, 1);
    assert_eq!(outcome.plan.remote.len(), 1);
    assert_eq!(outcome.plan.remote[0].as_str(), "missing");
}

#[tokio::test]
async fn auto_delete_mirrors_recently_deleted_locally() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());

    // The asset was downloaded on an earlier run, then deleted in the
    // cloud; it now sits in Recently-Deleted
    let asset = photo("gone-1", "IMG_9.JPG", 100, 1, "2025-01-02T10:00:00+00:00")
        .with_deleted_in_icloud(true);
    service.add_recently_deleted(asset);

    let dir = tmp.path().join("2025/01/02");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("IMG_9.JPG"), vec![b'x'; 100]).unwrap();
    stamp_provenance(&dir.join("IMG_9.JPG"), "2025-01-02T10:00:00+00:00");

    let cfg = config(tmp.path()).auto_delete(true).build();
    let mut outcome = run_pass(service.clone(), &cfg, CancellationToken::new()).await;

    assert_eq!(outcome.plan.local.len(), 1);

    let planner = DeletionPlanner::new(
        service,
        LocalIndex::new(tmp.path()),
        Arc::new(NullEventSink),
        false,
        CancellationToken::new(),
    );
    let stats = planner.realize(&mut outcome.plan).await.unwrap();

    assert_eq!(stats.local_deleted, 1);
    assert!(!dir.join("IMG_9.JPG").exists());
    // The dated directory emptied out and was swept
    assert!(!tmp.path().join("2025").exists());
}

#[tokio::test]
async fn local_delete_refuses_on_size_mismatch() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());

    let asset = photo("gone-1", "IMG_9.JPG", 100, 1, "2025-01-02T10:00:00+00:00")
        .with_deleted_in_icloud(true);
    service.add_recently_deleted(asset);

    let dir = tmp.path().join("2025/01/02");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("IMG_9.JPG"), vec![b'x'; 100]).unwrap();
    stamp_provenance(&dir.join("IMG_9.JPG"), "2025-01-02T10:00:00+00:00");

    let cfg = config(tmp.path()).auto_delete(true).build();
    let mut outcome = run_pass(service.clone(), &cfg, CancellationToken::new()).await;
    assert_eq!(outcome.plan.local.len(), 1);

    // The file changes between planning and realization
    std::fs::write(dir.join("IMG_9.JPG"), vec![b'y'; 50]).unwrap();

    let planner = DeletionPlanner::new(
        service,
        LocalIndex::new(tmp.path()),
        Arc::new(NullEventSink),
        false,
        CancellationToken::new(),
    );
    let stats = planner.realize(&mut outcome.plan).await.unwrap();

    assert_eq!(stats.local_deleted, 0);
    assert_eq!(stats.conflicts, 1);
    assert!(dir.join("IMG_9.JPG").exists());
}

#[tokio::test]
async fn local_delete_refuses_on_mtime_mismatch() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());

    let asset = photo("gone-1", "IMG_9.JPG", 100, 1, "2025-01-02T10:00:00+00:00")
        .with_deleted_in_icloud(true);
    service.add_recently_deleted(asset);

    // Right length, but the mtime is not the recorded provenance instant
    // (the file was touched or replaced by something else since)
    let dir = tmp.path().join("2025/01/02");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("IMG_9.JPG"), vec![b'x'; 100]).unwrap();
    stamp_provenance(&dir.join("IMG_9.JPG"), "2026-06-06T06:00:00+00:00");

    let cfg = config(tmp.path()).auto_delete(true).build();
    let mut outcome = run_pass(service.clone(), &cfg, CancellationToken::new()).await;
    assert_eq!(outcome.plan.local.len(), 1);

    let planner = DeletionPlanner::new(
        service,
        LocalIndex::new(tmp.path()),
        Arc::new(NullEventSink),
        false,
        CancellationToken::new(),
    );
    let stats = planner.realize(&mut outcome.plan).await.unwrap();

    assert_eq!(stats.local_deleted, 0);
    assert_eq!(stats.conflicts, 1);
    assert!(dir.join("IMG_9.JPG").exists());
}

#[tokio::test]
async fn dry_run_plans_deletions_but_realizes_nothing() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());
    publish_asset(&service, &photo("old", "IMG_1.JPG", 100, 1, &old_capture()));

    let cfg = config(tmp.path())
        .keep_icloud_recent_days(0)
        .dry_run(true)
        .build();
    let mut outcome = run_pass(service.clone(), &cfg, CancellationToken::new()).await;
    assert_eq!(outcome.plan.remote.len(), 1);

    let planner = DeletionPlanner::new(
        service.clone(),
        LocalIndex::new(tmp.path()),
        Arc::new(NullEventSink),
        true, // dry run
        CancellationToken::new(),
    );
    let stats = planner.realize(&mut outcome.plan).await.unwrap();

    assert_eq!(stats.remote_deleted, 0);
    assert!(service.deleted_ids().is_empty());
}

#[tokio::test]
async fn remote_deletes_are_batched() {
    let tmp = tempfile::TempDir::new().unwrap();
    let service = Arc::new(FakeService::new());

    let mut plan = lnxphotos_sync::DeletePlan::default();
    for i in 0..45 {
        plan.remote
            .push(AssetId::new(format!("asset-{i}")).unwrap());
    }

    let planner = DeletionPlanner::new(
        service.clone(),
        LocalIndex::new(tmp.path()),
        Arc::new(NullEventSink),
        false,
        CancellationToken::new(),
    );
    let stats = planner.realize(&mut plan).await.unwrap();

    assert_eq!(stats.remote_deleted, 45);
    assert_eq!(service.deleted_ids().len(), 45);
    assert!(plan.is_empty());
}
