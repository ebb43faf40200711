// End-to-end submission flow against a stub downloader binary. The stub
// stands in for yt-dlp via the YT_DLP_BIN override, printing post-move file
// paths the way the real tool does with `--print after_move:filepath`.
#![cfg(unix)]

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use vodarchiver::jobs::{self, YT_DLP_BIN_ENV};
use vodarchiver::paths::DataPaths;
use vodarchiver::store::{self, DownloadStatus};
use vodarchiver::ytdlp::{DownloadMode, DownloadRequest};

// YT_DLP_BIN is process-wide; tests touching it must not interleave.
static ENV_LOCK: Mutex<()> = Mutex::new(());

const REPORTED_FILE: &str = "creator/2026-01-01/title [id].mp4";

/// Holds the env lock for the test's duration and restores YT_DLP_BIN on
/// drop, so a panicking test neither leaks the override nor poisons the
/// other tests through the shared mutex.
struct StubBin {
    _guard: MutexGuard<'static, ()>,
}

impl StubBin {
    fn set(bin: &str) -> Self {
        let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var(YT_DLP_BIN_ENV, bin);
        Self { _guard: guard }
    }
}

impl Drop for StubBin {
    fn drop(&mut self) {
        std::env::remove_var(YT_DLP_BIN_ENV);
    }
}

fn write_stub(dir: &Path, name: &str, script: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, script).expect("write stub");
    let mut perms = std::fs::metadata(&path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod stub");
    path.to_string_lossy().into_owned()
}

fn video_request() -> DownloadRequest {
    DownloadRequest {
        url: "https://x.test/v".to_string(),
        mode: DownloadMode::Video,
        include_playlist: false,
        resolution: None,
    }
}

#[test]
fn completed_download_is_recorded_then_deletable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = DataPaths::new(dir.path().join("data"));

    // Creates the file relative to its cwd (the downloads dir), prints a
    // progress marker plus the post-move path, and exits cleanly.
    let stub = write_stub(
        dir.path(),
        "yt-dlp-ok.sh",
        "#!/bin/sh\n\
         mkdir -p \"creator/2026-01-01\"\n\
         printf 'media' > \"creator/2026-01-01/title [id].mp4\"\n\
         echo \"[download] 100% of 5.00B\"\n\
         echo \"creator/2026-01-01/title [id].mp4\"\n\
         exit 0\n",
    );
    let _bin = StubBin::set(&stub);

    let outcome = jobs::run_download(&paths, &video_request()).expect("run");
    assert!(outcome.succeeded);
    assert_eq!(outcome.record.status, DownloadStatus::Completed);
    assert_eq!(outcome.record.files, vec![REPORTED_FILE.to_string()]);
    assert!(outcome.record.log_tail.contains("[download]"));

    let on_disk = paths.downloads_dir().join(REPORTED_FILE);
    assert!(on_disk.is_file());
    assert_eq!(store::get_storage_usage(&paths).expect("usage"), 5);

    let records = store::read_history(&paths).expect("read");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, outcome.record.id);

    let served = store::resolve_download_file(&paths, REPORTED_FILE).expect("serve");
    assert_eq!(served.len, 5);

    assert!(store::delete_record(&paths, &outcome.record.id).expect("delete"));
    assert!(!on_disk.exists());
    assert!(store::read_history(&paths).expect("read").is_empty());
}

#[test]
fn failing_download_still_appends_a_failed_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = DataPaths::new(dir.path().join("data"));

    // Emits only diagnostics the output parser filters (progress-marker and
    // WARNING: lines), like yt-dlp does when extraction fails before any
    // file is moved into place.
    let stub = write_stub(
        dir.path(),
        "yt-dlp-fail.sh",
        "#!/bin/sh\n\
         echo \"[generic] https://x.test/v: extraction failed\" >&2\n\
         echo \"WARNING: no formats found\" >&2\n\
         exit 1\n",
    );
    let _bin = StubBin::set(&stub);

    let outcome = jobs::run_download(&paths, &video_request()).expect("run");
    assert!(!outcome.succeeded);
    assert_eq!(outcome.record.status, DownloadStatus::Failed);
    assert!(outcome.record.files.is_empty());
    assert!(outcome.record.log_tail.contains("extraction failed"));

    let records = store::read_history(&paths).expect("read");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DownloadStatus::Failed);
}

#[test]
fn unstartable_downloader_is_recorded_as_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = DataPaths::new(dir.path().join("data"));

    let missing = dir.path().join("does-not-exist").to_string_lossy().into_owned();
    let _bin = StubBin::set(&missing);

    let outcome = jobs::run_download(&paths, &video_request()).expect("run");
    assert!(!outcome.succeeded);
    assert_eq!(outcome.record.status, DownloadStatus::Failed);
    assert!(outcome.record.files.is_empty());
    assert!(outcome.record.log_tail.contains("failed to start"));

    assert_eq!(store::read_history(&paths).expect("read").len(), 1);
}

#[test]
fn reported_paths_outside_downloads_dir_are_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = DataPaths::new(dir.path().join("data"));

    let stub = write_stub(
        dir.path(),
        "yt-dlp-escape.sh",
        "#!/bin/sh\n\
         printf 'ok' > \"inside.mp4\"\n\
         echo \"inside.mp4\"\n\
         echo \"../history.json\"\n\
         echo \"/etc/passwd\"\n\
         exit 0\n",
    );
    let _bin = StubBin::set(&stub);

    let outcome = jobs::run_download(&paths, &video_request()).expect("run");
    assert!(outcome.succeeded);
    assert_eq!(outcome.record.files, vec!["inside.mp4".to_string()]);
}

#[test]
fn failure_output_that_looks_like_a_path_is_still_recorded_in_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = DataPaths::new(dir.path().join("data"));

    // Files reported before the tool bails out are parsed and recorded
    // even on a non-zero exit.
    let stub = write_stub(
        dir.path(),
        "yt-dlp-partial.sh",
        "#!/bin/sh\n\
         printf 'part' > \"partial.mp4\"\n\
         echo \"partial.mp4\"\n\
         exit 1\n",
    );
    let _bin = StubBin::set(&stub);

    let outcome = jobs::run_download(&paths, &video_request()).expect("run");
    assert!(!outcome.succeeded);
    assert_eq!(outcome.record.status, DownloadStatus::Failed);
    assert_eq!(outcome.record.files, vec!["partial.mp4".to_string()]);
}
