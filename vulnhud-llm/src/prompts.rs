//! Instruction prompts for the two request kinds

use crate::{LlmError, LlmResult};
use std::path::{Path, PathBuf};
use vulnhud_utils::read_text_file;

/// File looked up for the per-unit prompt when none is configured
pub const UNIT_PROMPT_FILE: &str = "prompt.txt";
/// File looked up for the global prompt when none is configured
pub const GLOBAL_PROMPT_FILE: &str = "global_prompt.txt";

const DEFAULT_UNIT_PROMPT: &str = r#"You are a security auditor reviewing one decompiled source file of a larger project.
The project context above describes how the files relate to each other.

1. Rewrite the file with meaningful identifiers where names were obfuscated.
2. List every security vulnerability you can identify in this file.

Answer with a single JSON object and nothing else:
{"Code": "<rewritten source>", "Vulnerabilities": [{"type": "...", "location": "...", "severity": "...", "description": "..."}]}
Use an empty array when the file has no vulnerabilities."#;

const DEFAULT_GLOBAL_PROMPT: &str = r#"You are a security auditor preparing to review a decompiled project file by file.
Below is a JSON map listing, for each file, the classes and methods it declares.

Summarize the architecture: what the project does, how the files interact, which
components handle input, storage, networking or cryptography, and where untrusted data
enters. This summary will accompany every file-level review.

Answer with a single JSON object and nothing else:
{"GlobalContext": "<summary>"}"#;

/// The per-unit and global instruction prompts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// Sent with every unit, after the global context
    pub unit: String,
    /// Prefixed to the structural digest in the global request
    pub global: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            unit: DEFAULT_UNIT_PROMPT.to_string(),
            global: DEFAULT_GLOBAL_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    /// Load both prompts.
    ///
    /// An explicit path must be readable. Without one, the default file name
    /// is looked up in `base_dir` and the built-in prompt is used if it is not
    /// there.
    pub fn load(base_dir: &Path, unit: Option<&Path>, global: Option<&Path>) -> LlmResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            unit: resolve(base_dir, unit, UNIT_PROMPT_FILE, defaults.unit)?,
            global: resolve(base_dir, global, GLOBAL_PROMPT_FILE, defaults.global)?,
        })
    }
}

fn resolve(base_dir: &Path, explicit: Option<&Path>, file_name: &str, fallback: String) -> LlmResult<String> {
    if let Some(path) = explicit {
        return read_text_file(path).map_err(|e| {
            LlmError::Config(format!("Cannot read prompt file {}: {}", path.display(), e))
        });
    }

    let candidate: PathBuf = base_dir.join(file_name);
    if candidate.is_file() {
        tracing::debug!("Loading prompt from {}", candidate.display());
        return Ok(read_text_file(&candidate)?);
    }

    tracing::debug!("{} not found, using built-in prompt", file_name);
    Ok(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_prompts_when_no_files() -> LlmResult<()> {
        let temp_dir = tempdir()?;
        let prompts = PromptSet::load(temp_dir.path(), None, None)?;

        assert_eq!(prompts, PromptSet::default());
        assert!(prompts.unit.contains("\"Vulnerabilities\""));
        assert!(prompts.global.contains("\"GlobalContext\""));
        Ok(())
    }

    #[test]
    fn test_default_files_are_picked_up() -> LlmResult<()> {
        let temp_dir = tempdir()?;
        fs::write(temp_dir.path().join(UNIT_PROMPT_FILE), "unit prompt")?;
        fs::write(temp_dir.path().join(GLOBAL_PROMPT_FILE), "global prompt")?;

        let prompts = PromptSet::load(temp_dir.path(), None, None)?;
        assert_eq!(prompts.unit, "unit prompt");
        assert_eq!(prompts.global, "global prompt");
        Ok(())
    }

    #[test]
    fn test_explicit_file_overrides_default() -> LlmResult<()> {
        let temp_dir = tempdir()?;
        let custom = temp_dir.path().join("custom.txt");
        fs::write(&custom, "custom")?;
        fs::write(temp_dir.path().join(UNIT_PROMPT_FILE), "default file")?;

        let prompts = PromptSet::load(temp_dir.path(), Some(&custom), None)?;
        assert_eq!(prompts.unit, "custom");
        assert_eq!(prompts.global, PromptSet::default().global);
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_is_config_error() {
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("missing.txt");

        let error = PromptSet::load(temp_dir.path(), None, Some(&missing)).unwrap_err();
        assert!(matches!(error, LlmError::Config(_)));
    }
}
