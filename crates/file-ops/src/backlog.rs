//! Backlog handling: files already sitting in the watched directory at startup.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::FileOpsError;

/// Returns `true` if `path` ends in one of `extensions` (case-insensitive,
/// given without the leading dot).
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

/// Lists regular files directly inside `dir` with a matching extension,
/// sorted by path.
pub fn list_videos(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, FileOpsError> {
    let entries = std::fs::read_dir(dir).map_err(|e| FileOpsError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| FileOpsError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| FileOpsError::io(&path, e))?;
        if file_type.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Outcome of moving backlog files aside.
#[derive(Debug, Default)]
pub struct RelocationReport {
    /// `(from, to)` pairs.
    pub moved: Vec<(PathBuf, PathBuf)>,
    /// `(from, error)` pairs.
    pub failed: Vec<(PathBuf, String)>,
}

/// Moves every file in `files` into `side_dir`, creating it if needed.
///
/// Name clashes get a ` (n)` suffix. Per-file failures are collected in the
/// report; only failing to create `side_dir` is an error.
pub fn relocate_all(files: &[PathBuf], side_dir: &Path) -> Result<RelocationReport, FileOpsError> {
    std::fs::create_dir_all(side_dir).map_err(|e| FileOpsError::io(side_dir, e))?;

    let mut report = RelocationReport::default();
    for from in files {
        let Some(name) = from.file_name() else {
            report.failed.push((from.clone(), "no file name".into()));
            continue;
        };
        let to = unique_destination(side_dir, Path::new(name));

        match move_file(from, &to) {
            Ok(()) => {
                info!(from = %from.display(), to = %to.display(), "relocated backlog file");
                report.moved.push((from.clone(), to));
            }
            Err(e) => {
                warn!(from = %from.display(), error = %e, "failed to relocate backlog file");
                report.failed.push((from.clone(), e.to_string()));
            }
        }
    }

    Ok(report)
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
        other => other,
    }
}

fn unique_destination(dir: &Path, name: &Path) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = name.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy());
    (1u32..)
        .map(|n| match &ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn mp4() -> Vec<String> {
        vec!["mp4".to_string()]
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(has_extension(Path::new("/v/clip.MP4"), &mp4()));
        assert!(has_extension(Path::new("clip.mp4"), &mp4()));
        assert!(!has_extension(Path::new("clip.mp4.part"), &mp4()));
        assert!(!has_extension(Path::new("mp4"), &mp4()));
        assert!(has_extension(
            Path::new("clip.mov"),
            &["mp4".to_string(), "MOV".to_string()]
        ));
    }

    #[test]
    fn list_videos_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("b.mp4"), b"B").unwrap();
        fs::write(root.join("a.MP4"), b"A").unwrap();
        fs::write(root.join("notes.txt"), b"N").unwrap();
        fs::create_dir(root.join("nested.mp4")).unwrap();
        fs::write(root.join("nested.mp4").join("inner.mp4"), b"I").unwrap();

        let files = list_videos(root, &mp4()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.MP4", "b.mp4"]);
    }

    #[test]
    fn list_videos_missing_dir() {
        let result = list_videos(Path::new("/nonexistent/watch/dir"), &mp4());
        assert!(matches!(result, Err(FileOpsError::Io { .. })));
    }

    #[test]
    fn relocate_moves_files_into_side_dir() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("one.mp4"), b"1").unwrap();
        fs::write(root.join("two.mp4"), b"2").unwrap();
        let files = list_videos(root, &mp4()).unwrap();

        let side = root.join("skipped");
        let report = relocate_all(&files, &side).unwrap();

        assert_eq!(report.moved.len(), 2);
        assert!(report.failed.is_empty());
        assert!(!root.join("one.mp4").exists());
        assert_eq!(fs::read(side.join("one.mp4")).unwrap(), b"1");
        assert_eq!(fs::read(side.join("two.mp4")).unwrap(), b"2");
    }

    #[test]
    fn relocate_avoids_clobbering() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let side = root.join("skipped");
        fs::create_dir(&side).unwrap();
        fs::write(side.join("clip.mp4"), b"old").unwrap();
        fs::write(side.join("clip (1).mp4"), b"older").unwrap();
        fs::write(root.join("clip.mp4"), b"new").unwrap();

        let report = relocate_all(&[root.join("clip.mp4")], &side).unwrap();
        assert_eq!(report.moved[0].1, side.join("clip (2).mp4"));
        assert_eq!(fs::read(side.join("clip.mp4")).unwrap(), b"old");
        assert_eq!(fs::read(side.join("clip (2).mp4")).unwrap(), b"new");
    }

    #[test]
    fn relocate_reports_missing_source() {
        let dir = TempDir::new().unwrap();
        let side = dir.path().join("skipped");
        let report = relocate_all(&[dir.path().join("ghost.mp4")], &side).unwrap();
        assert!(report.moved.is_empty());
        assert_eq!(report.failed.len(), 1);
    }
}
