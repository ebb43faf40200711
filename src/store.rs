use crate::paths::{relative_path_inside, DataPaths};
use crate::ytdlp::DownloadMode;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// Oldest records are dropped once history grows past this many entries.
pub const HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "completed" => Some(DownloadStatus::Completed),
            "failed" => Some(DownloadStatus::Failed),
            _ => None,
        }
    }
}

/// One persisted download attempt. Immutable after append; the only later
/// transition is wholesale deletion together with its files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: String,
    /// RFC 3339 timestamp; doubles as the newest-first sort key.
    pub created_at: String,
    pub url: String,
    pub mode: DownloadMode,
    pub include_playlist: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub status: DownloadStatus,
    /// Archive-relative forward-slash paths, each verified to resolve inside
    /// the downloads directory before being recorded.
    pub files: Vec<String>,
    pub log_tail: String,
}

/// Creates the archive root, downloads directory, dedup ledger and history
/// file as needed. Safe to call repeatedly; existing content is untouched.
pub fn ensure_storage(paths: &DataPaths) -> Result<()> {
    fs::create_dir_all(&paths.root)?;
    fs::create_dir_all(paths.downloads_dir())?;

    let archive_file = paths.archive_file();
    if !archive_file.exists() {
        fs::write(&archive_file, "")?;
    }

    let history_file = paths.history_file();
    if !history_file.exists() {
        fs::write(&history_file, "[]\n")?;
    }

    Ok(())
}

/// Reads history sorted newest-first. A corrupt or non-array history file
/// yields an empty list so the store stays writable after data loss;
/// individual malformed records are skipped rather than poisoning the rest.
pub fn read_history(paths: &DataPaths) -> Result<Vec<DownloadRecord>> {
    ensure_storage(paths)?;
    let raw = fs::read_to_string(paths.history_file())?;

    let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(values) => values,
        Err(err) => {
            log::warn!("history file unreadable, treating as empty: {err}");
            return Ok(Vec::new());
        }
    };

    let mut records: Vec<DownloadRecord> = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value(value) {
            Ok(record) => records.push(record),
            Err(err) => log::warn!("skipping malformed history record: {err}"),
        }
    }

    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(records)
}

fn write_history(paths: &DataPaths, records: &[DownloadRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    let target = paths.history_file();

    // Whole-file-then-rename so readers never observe a partial write.
    let tmp = target.with_extension("json.tmp");
    fs::write(&tmp, format!("{json}\n"))?;
    fs::rename(&tmp, &target)?;
    Ok(())
}

/// The sole mutation path for adding records: prepends and truncates to the
/// retention cap.
pub fn append_history(paths: &DataPaths, record: DownloadRecord) -> Result<()> {
    let mut records = read_history(paths)?;
    records.insert(0, record);
    records.truncate(HISTORY_LIMIT);
    write_history(paths, &records)
}

/// Resets history to an empty array. Downloaded files are left on disk;
/// reclaiming space is `delete_record`'s job.
pub fn clear_history(paths: &DataPaths) -> Result<()> {
    ensure_storage(paths)?;
    write_history(paths, &[])
}

/// Total bytes under the downloads directory. Unreadable directories and
/// entries that vanish mid-walk contribute zero; one bad entry never fails
/// the computation.
pub fn get_storage_usage(paths: &DataPaths) -> Result<u64> {
    ensure_storage(paths)?;

    let mut total = 0u64;
    let mut pending: VecDeque<PathBuf> = VecDeque::new();
    pending.push_back(paths.downloads_dir());

    while let Some(dir) = pending.pop_front() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => pending.push_back(entry.path()),
                Ok(file_type) if file_type.is_file() => {
                    if let Ok(metadata) = entry.metadata() {
                        total += metadata.len();
                    }
                }
                // Symlinks are stat'ed through to their target; dangling
                // links contribute zero like any other unreadable entry.
                Ok(file_type) if file_type.is_symlink() => {
                    if let Ok(metadata) = fs::metadata(entry.path()) {
                        if metadata.is_file() {
                            total += metadata.len();
                        }
                    }
                }
                _ => {}
            }
        }
    }

    Ok(total)
}

/// Deletes a record and its files. Unknown ids return `Ok(false)` with no
/// changes. Every file path is re-validated against the downloads directory
/// before unlinking; unsafe or already-missing files are skipped so a single
/// bad path can never block removal of the history entry.
pub fn delete_record(paths: &DataPaths, id: &str) -> Result<bool> {
    let mut records = read_history(paths)?;
    let index = match records.iter().position(|r| r.id == id) {
        Some(index) => index,
        None => return Ok(false),
    };

    let record = records.remove(index);
    let downloads_dir = paths.downloads_dir();

    for file in &record.files {
        let relative = match relative_path_inside(Path::new(file), &downloads_dir) {
            Some(relative) => relative,
            None => {
                log::warn!("refusing to delete path outside downloads dir: {file}");
                continue;
            }
        };

        let absolute = downloads_dir.join(relative);
        match fs::remove_file(&absolute) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("failed to delete {}: {err}", absolute.display()),
        }
    }

    write_history(paths, &records)?;
    Ok(true)
}

/// A download file resolved for serving, with the length an HTTP layer
/// should advertise as `Content-Length`.
#[derive(Debug, Clone)]
pub struct ResolvedDownload {
    pub path: PathBuf,
    pub len: u64,
}

/// Maps a caller-supplied relative path to an absolute file under the
/// downloads directory. `None` for traversal attempts, missing files and
/// anything that is not a regular file.
pub fn resolve_download_file(paths: &DataPaths, relative: &str) -> Option<ResolvedDownload> {
    let downloads_dir = paths.downloads_dir();
    let safe = relative_path_inside(Path::new(relative), &downloads_dir)?;
    let absolute = downloads_dir.join(safe);

    let metadata = fs::metadata(&absolute).ok()?;
    if !metadata.is_file() {
        return None;
    }

    Some(ResolvedDownload {
        path: absolute,
        len: metadata.len(),
    })
}
