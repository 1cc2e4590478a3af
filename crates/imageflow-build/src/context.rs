//! Build directory preparation

use crate::error::{BuildError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Ensure the build directory exists and copy every `copy` entry into it
///
/// Files and directories land under their base name.
pub fn prepare_build_directory(build_dir: &Path, copy: &[PathBuf]) -> Result<()> {
    tracing::info!("Ensuring build directory {} exists", build_dir.display());
    fs::create_dir_all(build_dir)?;

    for source in copy {
        let metadata =
            fs::metadata(source).map_err(|_| BuildError::CopySourceNotFound(source.clone()))?;
        let Some(name) = source.file_name() else {
            return Err(BuildError::UnsupportedCopySource(source.clone()));
        };
        let target = build_dir.join(name);

        if metadata.is_dir() {
            tracing::info!("Copying directory {} to {}", source.display(), build_dir.display());
            copy_dir(source, &target)?;
        } else if metadata.is_file() {
            tracing::info!("Copying file {} to {}", source.display(), build_dir.display());
            fs::copy(source, &target)?;
        } else {
            return Err(BuildError::UnsupportedCopySource(source.clone()));
        }
    }

    Ok(())
}

fn copy_dir(source: &Path, target: &Path) -> Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

/// Top level entries of the build directory, sorted, directories suffixed with `/`
pub fn list_directory(dir: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type().is_dir() {
            entries.push(format!("{}/", name));
        } else {
            entries.push(name);
        }
    }
    Ok(entries)
}
