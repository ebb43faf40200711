use crate::paths::{relative_path_inside, DataPaths};
use crate::{ArchiverError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use url::Url;

/// Groups produced files by uploader and upload date, with the title capped
/// so long titles cannot blow past filesystem name limits.
const OUTPUT_TEMPLATE: &str =
    "%(uploader|unknown_uploader)s/%(upload_date>%Y-%m-%d,unknown_date)s/%(title).160B [%(id)s].%(ext)s";

const BEST_FORMAT_SELECTOR: &str = "bv*+ba/b";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    Video,
    Audio,
}

impl DownloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadMode::Video => "video",
            DownloadMode::Audio => "audio",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "video" => Some(DownloadMode::Video),
            "audio" => Some(DownloadMode::Audio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub mode: DownloadMode,
    pub include_playlist: bool,
    /// Height cap such as "1080p"; `None` or "best" selects the best format.
    /// Only consulted in video mode.
    pub resolution: Option<String>,
}

pub fn validate_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim())
        .map_err(|_| ArchiverError::InvalidUrl("Enter a valid URL.".to_string()))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ArchiverError::InvalidUrl(
            "Only http/https URLs are supported.".to_string(),
        ));
    }

    Ok(parsed.to_string())
}

fn resolution_height(resolution: &str) -> Option<u32> {
    let value = resolution.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("best") {
        return None;
    }
    value.trim_end_matches(['p', 'P']).parse().ok()
}

/// Builds the complete yt-dlp argument list for one request. Pure and
/// deterministic; invalid requests must be rejected before this point.
pub fn build_args(request: &DownloadRequest, paths: &DataPaths) -> Vec<String> {
    let mut args = vec![
        "--newline".to_string(),
        "--no-warnings".to_string(),
        "--download-archive".to_string(),
        paths.archive_file().to_string_lossy().to_string(),
        "--paths".to_string(),
        paths.downloads_dir().to_string_lossy().to_string(),
        "--output".to_string(),
        OUTPUT_TEMPLATE.to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "--write-info-json".to_string(),
        "--write-description".to_string(),
        "--write-thumbnail".to_string(),
    ];

    if request.include_playlist {
        args.push("--yes-playlist".to_string());
    } else {
        args.push("--no-playlist".to_string());
    }

    match request.mode {
        DownloadMode::Audio => {
            args.push("--extract-audio".to_string());
            args.push("--audio-format".to_string());
            args.push("mp3".to_string());
            args.push("--audio-quality".to_string());
            args.push("0".to_string());
        }
        DownloadMode::Video => {
            args.push("--format".to_string());
            match request.resolution.as_deref().and_then(resolution_height) {
                Some(height) => args.push(format!(
                    "bestvideo[height<={height}]+bestaudio/best[height<={height}]"
                )),
                None => args.push(BEST_FORMAT_SELECTOR.to_string()),
            }
        }
    }

    args.push(request.url.clone());
    args
}

/// Turns one line of yt-dlp output into an archive-relative path, or `None`
/// for progress markers, warnings, blanks and anything that escapes the
/// downloads directory.
pub fn normalize_output_path(raw: &str, downloads_dir: &Path) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('[') || trimmed.starts_with("WARNING:") {
        return None;
    }

    let relative = relative_path_inside(Path::new(trimmed), downloads_dir)?;
    let segments: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(segments.join("/"))
}

/// Extracts the de-duplicated, lexicographically sorted list of produced
/// files from combined yt-dlp output. The result is independent of input
/// line order so records stay reproducible.
pub fn parse_files(output: &str, downloads_dir: &Path) -> Vec<String> {
    let mut files: BTreeSet<String> = BTreeSet::new();
    for line in output.lines() {
        if let Some(normalized) = normalize_output_path(line, downloads_dir) {
            files.insert(normalized);
        }
    }
    files.into_iter().collect()
}
