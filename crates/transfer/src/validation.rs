use std::path::{Component, Path};

use crate::TransferError;

/// Validates that `name` is a plain file name usable as a remote object name
/// or a rename target inside the watched directory.
///
/// Rejects:
/// - Empty or whitespace-only names
/// - Anything with more than one path component
/// - Absolute paths, `.` and `..`
pub fn validate_object_name(name: &str) -> Result<(), TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(TransferError::InvalidName(format!(
            "path separators not allowed: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TransferError::InvalidName(format!(
            "not a plain file name: {name}"
        ))),
    }
}
