//! Remote file-name rules.
//!
//! Uploads always land directly inside the configured inbox directory, so a
//! target name is a single path component. Anything that could address a
//! different directory is refused before a connection is opened.

/// Reason a target name was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetNameError {
    #[error("target file name is empty")]
    Empty,
    #[error("target file name '{0}' is a directory reference")]
    DirectoryReference(String),
    #[error("target file name '{0}' contains a path separator")]
    PathSeparator(String),
    #[error("target file name contains a NUL byte")]
    NulByte,
    #[error("parent directory traversal not allowed: {0}")]
    Traversal(String),
}

/// Pick the remote file name for an upload.
///
/// A blank `custom` name falls back to the base name of `original` (callers
/// typically pass the local file name there). The chosen name is then
/// checked with [`validate_target_name`].
pub fn resolve_target_name(custom: Option<&str>, original: &str) -> Result<String, TargetNameError> {
    let chosen = match custom.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => base_name(original).to_string(),
    };
    validate_target_name(&chosen)?;
    Ok(chosen)
}

/// Check that `name` is a single, non-traversing path component.
pub fn validate_target_name(name: &str) -> Result<(), TargetNameError> {
    if name.trim().is_empty() {
        return Err(TargetNameError::Empty);
    }
    if name.contains('\0') {
        return Err(TargetNameError::NulByte);
    }
    if name == "." || name == ".." {
        return Err(TargetNameError::DirectoryReference(name.to_string()));
    }
    if name.split(['/', '\\']).any(|part| part == "..") {
        return Err(TargetNameError::Traversal(name.to_string()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(TargetNameError::PathSeparator(name.to_string()));
    }
    Ok(())
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
