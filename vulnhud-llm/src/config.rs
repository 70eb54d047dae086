//! Scan configuration
//!
//! [`ScanConfig`] is the loosely-typed layer that config files and command
//! line flags fill in. [`ScanConfig::validate`] turns it into [`RunSettings`],
//! where every required value is present.

use crate::gemini::GEMINI_API_BASE_URL;
use crate::retry::RetryPolicy;
use crate::scheduler::FatalPolicy;
use crate::{LlmError, LlmResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use vulnhud_utils::{normalize_extension, DEFAULT_SOURCE_EXTENSION};

/// Scan configuration as read from a file and overridden by flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Model identifier, e.g. `gemini-1.5-pro`
    pub model: Option<String>,
    /// Receives `vuln_report` and rewritten sources
    pub output_dir: Option<PathBuf>,
    pub source_dirs: Vec<PathBuf>,
    /// Write each unit's rewritten source under `output_dir`
    pub save_code: bool,
    /// Maximum concurrent per-unit calls
    pub concurrency: usize,
    pub extension: String,
    pub prompt_file: Option<PathBuf>,
    pub global_prompt_file: Option<PathBuf>,
    pub api_base_url: String,
    /// Total calls per unit or global request, first attempt included
    pub max_attempts: u32,
    pub retry_base_delay_secs: u64,
    pub fatal_policy: FatalPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            model: None,
            output_dir: None,
            source_dirs: Vec::new(),
            save_code: false,
            concurrency: 1,
            extension: DEFAULT_SOURCE_EXTENSION.to_string(),
            prompt_file: None,
            global_prompt_file: None,
            api_base_url: GEMINI_API_BASE_URL.to_string(),
            max_attempts: retry.max_attempts,
            retry_base_delay_secs: retry.base_delay.as_secs(),
            fatal_policy: FatalPolicy::default(),
        }
    }
}

/// Validated settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub model: String,
    pub output_dir: PathBuf,
    pub source_dirs: Vec<PathBuf>,
    pub save_code: bool,
    pub concurrency: usize,
    pub extension: String,
    pub prompt_file: Option<PathBuf>,
    pub global_prompt_file: Option<PathBuf>,
    pub api_base_url: String,
    pub retry: RetryPolicy,
    pub fatal_policy: FatalPolicy,
}

impl ScanConfig {
    /// Check required values; every problem is reported at once
    pub fn validate(&self) -> LlmResult<RunSettings> {
        let mut problems = Vec::new();

        let model = self.model.as_deref().map(str::trim).filter(|m| !m.is_empty());
        if model.is_none() {
            problems.push("model is required (--llm-model)");
        }
        if self.output_dir.is_none() {
            problems.push("output directory is required (--output-dir)");
        }
        if self.source_dirs.is_empty() {
            problems.push("at least one source directory is required (--source-dir)");
        }
        if self.concurrency == 0 {
            problems.push("concurrency must be at least 1 (--thread-size)");
        }
        if self.max_attempts == 0 {
            problems.push("max_attempts must be at least 1");
        }
        let extension = normalize_extension(&self.extension);
        if extension.is_empty() {
            problems.push("extension must not be empty");
        }

        if !problems.is_empty() {
            return Err(LlmError::Config(problems.join("; ")));
        }

        Ok(RunSettings {
            model: model.unwrap_or_default().to_string(),
            output_dir: self.output_dir.clone().unwrap_or_default(),
            source_dirs: self.source_dirs.clone(),
            save_code: self.save_code,
            concurrency: self.concurrency,
            extension,
            prompt_file: self.prompt_file.clone(),
            global_prompt_file: self.global_prompt_file.clone(),
            api_base_url: self.api_base_url.clone(),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_secs(self.retry_base_delay_secs),
            },
            fatal_policy: self.fatal_policy,
        })
    }
}
