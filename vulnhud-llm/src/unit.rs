//! Source units and their discovery

use crate::LlmResult;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vulnhud_utils::{find_files_with_extension, read_text_file};

/// One discovered input file: identifier plus its text, immutable once read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    id: String,
    content: Arc<str>,
}

impl SourceUnit {
    pub fn new(id: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    /// Path-like identifier used as the report key
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.id)
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Produces the units of one run
pub trait UnitSource: Send + Sync {
    fn discover(&self) -> LlmResult<Vec<SourceUnit>>;
}

/// Discovers units by extension under one or more directories
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    roots: Vec<PathBuf>,
    extension: String,
}

impl FileSystemSource {
    pub fn new(roots: Vec<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            roots,
            extension: extension.into(),
        }
    }
}

impl UnitSource for FileSystemSource {
    /// Walks every root in order; a file reachable from two roots is read once
    fn discover(&self) -> LlmResult<Vec<SourceUnit>> {
        let mut seen = HashSet::new();
        let mut units = Vec::new();

        for root in &self.roots {
            for path in find_files_with_extension(root, &self.extension)? {
                let id = path.to_string_lossy().to_string();
                if !seen.insert(id.clone()) {
                    continue;
                }
                let content = read_text_file(&path)?;
                units.push(SourceUnit::new(id, content));
            }
        }

        Ok(units)
    }
}

/// Fixed, in-memory unit list
impl UnitSource for Vec<SourceUnit> {
    fn discover(&self) -> LlmResult<Vec<SourceUnit>> {
        Ok(self.clone())
    }
}
