//! Host-side work directory helpers used for code injection.

use std::fs;
use std::path::Path;

use super::SandboxError;

/// Removes everything inside `dir`, keeping `dir` itself.
///
/// A missing directory is created instead.
pub fn wipe_dir_contents(dir: &Path) -> Result<(), SandboxError> {
    if !dir.exists() {
        return fs::create_dir_all(dir).map_err(|e| SandboxError::io(dir, e));
    }

    for entry in fs::read_dir(dir).map_err(|e| SandboxError::io(dir, e))? {
        let entry = entry.map_err(|e| SandboxError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| SandboxError::io(&path, e))?;

        let removed = if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| SandboxError::io(&path, e))?;
    }

    Ok(())
}

/// Copies every file under `src` into `dest`, preserving relative paths.
///
/// Returns the number of files copied. Symlinks are skipped so a payload can
/// never point the container at host files.
pub fn copy_dir_contents(src: &Path, dest: &Path) -> Result<usize, SandboxError> {
    let mut copied = 0;

    for entry in fs::read_dir(src).map_err(|e| SandboxError::io(src, e))? {
        let entry = entry.map_err(|e| SandboxError::io(src, e))?;
        let path = entry.path();
        let target = dest.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| SandboxError::io(&path, e))?;

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| SandboxError::io(&target, e))?;
            copied += copy_dir_contents(&path, &target)?;
        } else if file_type.is_file() {
            fs::copy(&path, &target).map_err(|e| SandboxError::io(&target, e))?;
            copied += 1;
        }
    }

    Ok(copied)
}
