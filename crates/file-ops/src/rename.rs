use std::path::{Path, PathBuf};

use tracing::info;

use crate::FileOpsError;

/// Trims `input` and appends `.{extension}` unless it already ends with it
/// (case-insensitive). Returns `None` for blank input.
pub fn normalize_video_name(input: &str, extension: &str) -> Option<String> {
    let name = input.trim();
    if name.is_empty() {
        return None;
    }

    let suffix = format!(".{extension}");
    let has_suffix = name.len() > suffix.len()
        && name.is_char_boundary(name.len() - suffix.len())
        && name[name.len() - suffix.len()..].eq_ignore_ascii_case(&suffix);

    if has_suffix {
        Some(name.to_string())
    } else {
        Some(format!("{name}{suffix}"))
    }
}

/// Renames `path` to `new_name` within the same directory.
///
/// Returns the new path. Renaming to the current name is a no-op; an existing
/// different file is never overwritten.
pub fn rename_in_place(path: &Path, new_name: &str) -> Result<PathBuf, FileOpsError> {
    vidrelay_transfer::validate_object_name(new_name)?;

    let target = path.with_file_name(new_name);
    if target == path {
        return Ok(target);
    }
    if target.exists() {
        return Err(FileOpsError::AlreadyExists(target));
    }

    std::fs::rename(path, &target).map_err(|e| FileOpsError::io(path, e))?;
    info!(from = %path.display(), to = %target.display(), "renamed file");
    Ok(target)
}
