//! vulnhud utilities
//!
//! Plumbing shared by the analysis engine and the command line:
//! source discovery and artifact writing, structural signature extraction,
//! configuration file loading and logging setup.

//#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod file;
pub mod string;
pub mod config;
pub mod logging;

/// Re-export commonly used utilities
pub use file::{
    find_files_with_extension, read_text_file, append_text_file,
    mirror_path, ensure_dir, write_text_file,
};
pub use string::{
    extract_type_names, extract_member_names, strip_code_fences,
};
pub use config::load_config;

/// Result type used throughout vulnhud utilities
pub type Result<T> = std::result::Result<T, UtilError>;

/// Error types for utility operations
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Path operation error
    #[error("Path operation error: {0}")]
    PathOperation(String),

    /// Directory walk error
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Extension analysed when none is configured (decompiled Java sources)
pub const DEFAULT_SOURCE_EXTENSION: &str = "java";

/// Normalize an extension filter: lowercase, no leading dot.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}
