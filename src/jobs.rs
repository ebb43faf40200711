use crate::paths::DataPaths;
use crate::store::{self, DownloadRecord, DownloadStatus};
use crate::ytdlp::{self, DownloadRequest};
use crate::Result;
use std::path::Path;
use std::process::Command;
use uuid::Uuid;

pub const YT_DLP_BIN_ENV: &str = "YT_DLP_BIN";
const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";

/// Diagnostics capture is bounded so a chatty download cannot bloat history.
const LOG_TAIL_MAX_BYTES: usize = 6000;

/// What one submission produced. The record is persisted in every case,
/// including failures, so history stays a complete audit trail; `succeeded`
/// tells the caller whether to report the job as failed.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub record: DownloadRecord,
    pub succeeded: bool,
}

fn yt_dlp_bin() -> String {
    match std::env::var(YT_DLP_BIN_ENV) {
        Ok(bin) if !bin.trim().is_empty() => bin,
        _ => DEFAULT_YT_DLP_BIN.to_string(),
    }
}

fn tool_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    configure_for_background(&mut cmd);
    cmd
}

#[cfg(windows)]
fn configure_for_background(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    // Prevent console windows from stealing focus on Windows while the tool runs.
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn configure_for_background(_cmd: &mut Command) {}

fn log_tail(output: &str) -> String {
    if output.len() <= LOG_TAIL_MAX_BYTES {
        return output.to_string();
    }
    let mut start = output.len() - LOG_TAIL_MAX_BYTES;
    while !output.is_char_boundary(start) {
        start += 1;
    }
    output[start..].to_string()
}

fn run_yt_dlp(args: &[String], cwd: &Path) -> std::io::Result<(Option<i32>, String)> {
    let output = tool_command(&yt_dlp_bin())
        .args(args)
        .current_dir(cwd)
        .output()?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok((output.status.code(), combined))
}

/// Runs one download end to end: builds the yt-dlp invocation, blocks until
/// the tool exits (or fails to start), parses the reported file paths and
/// appends the resulting record to history. Only storage failures surface as
/// errors; a failing download is data, not an error.
pub fn run_download(paths: &DataPaths, request: &DownloadRequest) -> Result<DownloadOutcome> {
    store::ensure_storage(paths)?;

    let args = ytdlp::build_args(request, paths);
    let downloads_dir = paths.downloads_dir();
    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();

    let record = match run_yt_dlp(&args, &downloads_dir) {
        Ok((code, output)) => DownloadRecord {
            id,
            created_at,
            url: request.url.clone(),
            mode: request.mode,
            include_playlist: request.include_playlist,
            resolution: request.resolution.clone(),
            status: if code == Some(0) {
                DownloadStatus::Completed
            } else {
                DownloadStatus::Failed
            },
            files: ytdlp::parse_files(&output, &downloads_dir),
            log_tail: log_tail(&output),
        },
        Err(err) => DownloadRecord {
            id,
            created_at,
            url: request.url.clone(),
            mode: request.mode,
            include_playlist: request.include_playlist,
            resolution: request.resolution.clone(),
            status: DownloadStatus::Failed,
            files: Vec::new(),
            log_tail: format!("failed to start {}: {err}", yt_dlp_bin()),
        },
    };

    store::append_history(paths, record.clone())?;

    let succeeded = record.status == DownloadStatus::Completed;
    Ok(DownloadOutcome { record, succeeded })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_tail_keeps_short_output_verbatim() {
        assert_eq!(log_tail("hello"), "hello");
        assert_eq!(log_tail(""), "");
    }

    #[test]
    fn log_tail_keeps_only_the_trailing_capture() {
        let long = "x".repeat(LOG_TAIL_MAX_BYTES + 100);
        let tail = log_tail(&long);
        assert_eq!(tail.len(), LOG_TAIL_MAX_BYTES);
    }

    #[test]
    fn log_tail_respects_char_boundaries() {
        let long = "é".repeat(LOG_TAIL_MAX_BYTES);
        let tail = log_tail(&long);
        assert!(tail.len() <= LOG_TAIL_MAX_BYTES);
        assert!(tail.chars().all(|c| c == 'é'));
    }
}
