//! File system utilities
//!
//! Source discovery, lossy text reading and the small set of writes the
//! analysis pipeline performs (report file, rewritten-code artifacts).

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Recursively find files whose extension matches `extension` (case-insensitive).
///
/// Entries are visited in file-name order so repeated scans of the same tree
/// yield the same sequence.
pub fn find_files_with_extension(root: &Path, extension: &str) -> crate::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(crate::UtilError::PathOperation(
            format!("Source directory does not exist or is not a directory: {}", root.display())
        ));
    }

    let wanted = crate::normalize_extension(extension);
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let matches = entry.path()
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.to_lowercase() == wanted);

        if matches {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Read a text file, replacing invalid UTF-8 sequences instead of failing
pub fn read_text_file(path: &Path) -> crate::Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            let bytes = fs::read(path)?;
            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
        Err(e) => Err(e.into()),
    }
}

/// Ensure directory exists (mkdir -p semantics)
pub fn ensure_dir(path: &Path) -> crate::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    } else if !path.is_dir() {
        return Err(crate::UtilError::PathOperation(
            format!("Path exists but is not a directory: {:?}", path)
        ));
    }
    Ok(())
}

/// Map a unit identifier onto a path under `output_dir`.
///
/// Root, prefix and `..` components are dropped so the result always stays
/// inside `output_dir`: `/src/a/B.java` becomes `<output_dir>/src/a/B.java`.
pub fn mirror_path(output_dir: &Path, unit_path: &Path) -> crate::Result<PathBuf> {
    let cleaned = path_clean::clean(unit_path);
    let relative: PathBuf = cleaned
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();

    if relative.as_os_str().is_empty() {
        return Err(crate::UtilError::PathOperation(
            format!("Cannot mirror path without a file component: {:?}", unit_path)
        ));
    }

    Ok(output_dir.join(relative))
}

/// Append text to a file, creating it and its parent directories as needed
pub fn append_text_file(path: &Path, text: &str) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

/// Write (truncate) a text file, creating parent directories as needed
pub fn write_text_file(path: &Path, text: &str) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}
