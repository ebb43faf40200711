use std::path::{Component, Path, PathBuf};

pub const DATA_DIR_ENV: &str = "DATA_DIR";
const CONTAINER_DATA_DIR: &str = "/data";
const LOCAL_DATA_DIR: &str = ".data";

/// Resolved storage layout for one archive root. Constructed explicitly and
/// handed to every operation; there is no process-wide default instance.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    /// Dedup ledger consumed by yt-dlp; never read by this crate.
    pub fn archive_file(&self) -> PathBuf {
        self.root.join("download-archive.txt")
    }

    pub fn history_file(&self) -> PathBuf {
        self.root.join("history.json")
    }
}

/// Picks the storage root: `DATA_DIR` override, else the container data
/// volume when present, else a local fallback next to the working directory.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    let container = PathBuf::from(CONTAINER_DATA_DIR);
    if container.is_dir() {
        return container;
    }

    PathBuf::from(LOCAL_DATA_DIR)
}

/// Resolves `.` and `..` segments without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` stays `/`; a prefix cannot be climbed out of either.
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(Component::ParentDir),
            },
            other => out.push(other),
        }
    }
    out
}

/// The single path-safety gate shared by output parsing, record deletion and
/// download-file resolution. Returns the path of `candidate` relative to
/// `root` iff the candidate resolves to a proper descendant of `root`:
/// never the root itself, never a sibling reached through `..`, never an
/// absolute path outside the tree. Relative candidates are taken as
/// relative to `root`. Purely lexical, so symlinks are not chased.
pub fn relative_path_inside(candidate: &Path, root: &Path) -> Option<PathBuf> {
    let resolved = if candidate.is_absolute() {
        lexical_normalize(candidate)
    } else {
        lexical_normalize(&root.join(candidate))
    };

    let relative = resolved.strip_prefix(&lexical_normalize(root)).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }

    Some(relative.to_path_buf())
}
