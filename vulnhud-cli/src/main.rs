//! vulnhud - LLM-assisted vulnerability analysis of decompiled sources
//!
//! Sends a structural overview of the project to Gemini once, then every
//! source file with that shared context, and writes the reported
//! vulnerabilities to `<output-dir>/vuln_report`.
//!
//! Exit status: 0 when the run completed (with or without findings),
//! 1 on a configuration error, 2 when the run was aborted by the service.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use vulnhud_llm::{
    FatalPolicy, GeminiClient, LlmError, Orchestrator, PromptSet, RunOutcome, RunState, RunSummary,
    ScanConfig,
};
use vulnhud_utils::logging::{init_logging, LogLevel, LoggerConfig};

#[derive(Parser, Debug)]
#[command(name = "vulnhud")]
#[command(about = "vulnhud - LLM-assisted vulnerability analysis of decompiled sources")]
#[command(version)]
struct Cli {
    /// Gemini model to use (e.g. gemini-1.5-pro)
    #[arg(short = 'm', long = "llm-model", alias = "llm_model")]
    llm_model: Option<String>,

    /// Directory receiving the report and rewritten sources
    #[arg(short = 'o', long, alias = "output_dir")]
    output_dir: Option<PathBuf>,

    /// Source directories to analyse (repeatable, or space-separated)
    #[arg(short = 's', long = "source-dir", alias = "source_dir", num_args = 1.., value_delimiter = ' ')]
    source_dir: Vec<PathBuf>,

    /// Save the rewritten source of every file under the output directory
    #[arg(long, alias = "save_code")]
    save_code: bool,

    /// Maximum number of concurrent requests
    #[arg(short = 'j', long, alias = "thread_size", value_parser = clap::value_parser!(u32).range(1..))]
    thread_size: Option<u32>,

    /// Extension of the files to analyse
    #[arg(short = 'e', long)]
    extension: Option<String>,

    /// Per-file prompt (default: ./prompt.txt, else built-in)
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Global context prompt (default: ./global_prompt.txt, else built-in)
    #[arg(long)]
    global_prompt_file: Option<PathBuf>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini API endpoint prefix
    #[arg(long)]
    api_base_url: Option<String>,

    /// Total calls per request when the service keeps rate limiting
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: Option<u32>,

    /// Behaviour of in-flight requests after a fatal service error
    #[arg(long, value_enum)]
    on_fatal: Option<FatalPolicy>,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Enable debug logging, with source locations and thread ids
    #[arg(short = 'd', long)]
    debug: bool,

    /// Disable coloured log output
    #[arg(long)]
    no_color: bool,

    /// Log level (trace, debug, info, warning, error)
    #[arg(long)]
    log_level: Option<LogLevel>,
}

impl Cli {
    /// Command line values override the configuration file
    fn apply_to(&self, config: &mut ScanConfig) {
        if let Some(model) = &self.llm_model {
            config.model = Some(model.clone());
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = Some(output_dir.clone());
        }
        let source_dirs: Vec<PathBuf> = self.source_dir.iter()
            .filter(|dir| !dir.as_os_str().is_empty())
            .cloned()
            .collect();
        if !source_dirs.is_empty() {
            config.source_dirs = source_dirs;
        }
        if self.save_code {
            config.save_code = true;
        }
        if let Some(threads) = self.thread_size {
            config.concurrency = threads as usize;
        }
        if let Some(extension) = &self.extension {
            config.extension = extension.clone();
        }
        if let Some(prompt_file) = &self.prompt_file {
            config.prompt_file = Some(prompt_file.clone());
        }
        if let Some(global_prompt_file) = &self.global_prompt_file {
            config.global_prompt_file = Some(global_prompt_file.clone());
        }
        if let Some(api_base_url) = &self.api_base_url {
            config.api_base_url = api_base_url.clone();
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(policy) = self.on_fatal {
            config.fatal_policy = policy;
        }
    }

    fn log_level(&self) -> LogLevel {
        match (self.log_level, self.debug) {
            (Some(level), _) => level,
            (None, true) => LogLevel::Debug,
            (None, false) => LogLevel::Info,
        }
    }

    fn logger_config(&self) -> LoggerConfig {
        LoggerConfig::new(self.log_level())
            .verbose(self.debug)
            .colored(!self.no_color)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Usage errors are configuration errors (1); clap's own code 2 means "aborted" here
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(1) } else { ExitCode::SUCCESS };
        }
    };

    if let Err(e) = init_logging(cli.logger_config()) {
        eprintln!("Warning: {}", e);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {:#}", error);
            ExitCode::from(exit_status(&error))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => vulnhud_utils::load_config::<ScanConfig>(path)
            .map_err(LlmError::from)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ScanConfig::default(),
    };
    cli.apply_to(&mut config);

    let settings = config.validate()?;

    let api_key = cli.api_key.as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| LlmError::Config("GEMINI_API_KEY is not set (use --api-key or the environment)".to_string()))?
        .to_string();

    let working_dir = std::env::current_dir().context("Cannot determine the working directory")?;
    let prompts = PromptSet::load(
        &working_dir,
        settings.prompt_file.as_deref(),
        settings.global_prompt_file.as_deref(),
    )?;

    let client = GeminiClient::new(api_key, settings.model.clone())?
        .with_base_url(settings.api_base_url.clone());

    println!("vulnhud - analysing {} with {}", display_dirs(&settings.source_dirs), settings.model);
    println!("Concurrency: {}, extension: .{}", settings.concurrency, settings.extension);

    let mut orchestrator = Orchestrator::new(settings, prompts, Arc::new(client));
    let outcome = match orchestrator.run().await {
        Ok(outcome) => outcome,
        Err(error) if orchestrator.state() == RunState::Fatal => return Err(RunAborted(error).into()),
        Err(error) => return Err(error.into()),
    };

    match outcome {
        RunOutcome::NothingToDo => {
            println!("No source files found, nothing to analyse.");
        }
        RunOutcome::NoFindings(summary) => {
            print_summary(&summary);
            println!("No vulnerabilities reported; no report written.");
        }
        RunOutcome::ReportWritten(summary) => {
            print_summary(&summary);
            if let Some(path) = &summary.report_path {
                println!("Report written to {}", path.display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_summary(summary: &RunSummary) {
    println!("\nFiles discovered: {}", summary.units_discovered);
    println!("Files analysed:   {}", summary.units_analyzed);
    println!(
        "Findings:         {} in {} files",
        summary.findings, summary.units_with_findings
    );

    if !summary.skipped.is_empty() {
        println!("\nSkipped ({}):", summary.skipped.len());
        for skipped in &summary.skipped {
            println!("   - {}: {}", skipped.unit_id, skipped.reason);
        }
    }
}

fn display_dirs(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|dir| dir.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A run that got past discovery and then failed
#[derive(Debug)]
struct RunAborted(LlmError);

impl std::fmt::Display for RunAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Run aborted")
    }
}

impl std::error::Error for RunAborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

fn exit_status(error: &anyhow::Error) -> u8 {
    if error.downcast_ref::<RunAborted>().is_some() {
        return 2;
    }
    let llm_error = error.chain().find_map(|cause| cause.downcast_ref::<LlmError>());
    match llm_error {
        Some(e) if e.is_config() => 1,
        Some(_) => 2,
        None => 1,
    }
}
