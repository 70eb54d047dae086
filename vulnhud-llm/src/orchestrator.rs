//! Run orchestration
//!
//! One run walks a fixed state machine:
//!
//! ```text
//! INIT -> DISCOVERED -> CONTEXT_READY -> DISPATCHED -> AGGREGATED -> EMITTED
//!              |              |               |             |
//!              v              +------ FATAL --+-------------+
//!        NOTHING_TO_DO
//! ```
//!
//! The global context is built before any unit is dispatched, and the report
//! is only written after every dispatched task has finished. A fatal service
//! error ends the run without a report.

use crate::aggregator::{Report, ResultAggregator};
use crate::analysis::{build_unit_payload, parse_unit_response};
use crate::context::{ContextBuilder, GlobalContext, RegexSummarizer, StructuralSummarizer};
use crate::config::RunSettings;
use crate::prompts::PromptSet;
use crate::retry::{RetryObserver, RetryPolicy, RetryingClient};
use crate::scheduler::{BoundedScheduler, DispatchSummary, SkippedUnit};
use crate::service::AnalysisService;
use crate::unit::{FileSystemSource, SourceUnit, UnitSource};
use crate::{LlmError, LlmResult};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use vulnhud_utils::logging::{get_logger, Logger};
use vulnhud_utils::{append_text_file, ensure_dir, mirror_path, write_text_file};

/// Name of the report file written under the output directory
pub const REPORT_FILE_NAME: &str = "vuln_report";

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    Discovered,
    ContextReady,
    Dispatched,
    Aggregated,
    Emitted,
    NothingToDo,
    Fatal,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, Discovered)
                | (Discovered, ContextReady | NothingToDo)
                | (ContextReady, Dispatched)
                | (Dispatched, Aggregated)
                | (Aggregated, Emitted)
                | (Discovered | ContextReady | Dispatched | Aggregated, Fatal)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Emitted | RunState::NothingToDo | RunState::Fatal)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Init => "INIT",
            RunState::Discovered => "DISCOVERED",
            RunState::ContextReady => "CONTEXT_READY",
            RunState::Dispatched => "DISPATCHED",
            RunState::Aggregated => "AGGREGATED",
            RunState::Emitted => "EMITTED",
            RunState::NothingToDo => "NOTHING_TO_DO",
            RunState::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// What a completed run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub units_discovered: usize,
    /// Units whose response was parsed and merged
    pub units_analyzed: usize,
    pub skipped: Vec<SkippedUnit>,
    /// Units that contributed at least one finding
    pub units_with_findings: usize,
    pub findings: usize,
    pub report_path: Option<PathBuf>,
}

/// How a run ended, short of a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Discovery found no units
    NothingToDo,
    /// Every unit came back clean; no report file was written
    NoFindings(RunSummary),
    ReportWritten(RunSummary),
}

impl RunOutcome {
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::NothingToDo => None,
            RunOutcome::NoFindings(summary) | RunOutcome::ReportWritten(summary) => Some(summary),
        }
    }
}

/// Drives discovery, the global context call, bounded dispatch and the report
pub struct Orchestrator {
    settings: RunSettings,
    prompts: PromptSet,
    service: Arc<dyn AnalysisService>,
    source: Arc<dyn UnitSource>,
    summarizer: Arc<dyn StructuralSummarizer>,
    retry_policy: RetryPolicy,
    observers: Vec<Arc<dyn RetryObserver>>,
    state: RunState,
    history: Vec<RunState>,
    logger: Logger,
}

impl Orchestrator {
    /// Orchestrator discovering units from `settings.source_dirs`
    pub fn new(settings: RunSettings, prompts: PromptSet, service: Arc<dyn AnalysisService>) -> Self {
        let source = Arc::new(FileSystemSource::new(
            settings.source_dirs.clone(),
            settings.extension.clone(),
        ));
        let retry_policy = settings.retry;

        Self {
            settings,
            prompts,
            service,
            source,
            summarizer: Arc::new(RegexSummarizer),
            retry_policy,
            observers: Vec::new(),
            state: RunState::Init,
            history: vec![RunState::Init],
            logger: get_logger("vulnhud.orchestrator"),
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn UnitSource>) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Arc<dyn StructuralSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state visited so far, starting with `Init`
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn report_path(&self) -> PathBuf {
        self.settings.output_dir.join(REPORT_FILE_NAME)
    }

    fn transition(&mut self, next: RunState) -> LlmResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(LlmError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.logger.info(&format!("State: {} -> {}", self.state, next));
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    fn fail(&mut self, error: LlmError) -> LlmError {
        self.logger.exception("Run aborted", &error);
        if let Err(transition_error) = self.transition(RunState::Fatal) {
            self.logger.debug(&format!("{}", transition_error));
        }
        error
    }

    /// Execute the run. Can be called once per orchestrator.
    pub async fn run(&mut self) -> LlmResult<RunOutcome> {
        if self.state != RunState::Init {
            return Err(LlmError::InvalidTransition {
                from: self.state.to_string(),
                to: RunState::Discovered.to_string(),
            });
        }

        // Configuration problems surface before any work starts
        let scheduler = BoundedScheduler::new(self.settings.concurrency)?
            .with_policy(self.settings.fatal_policy);

        let units = self.source.discover()?;
        self.logger.info(&format!("Discovered {} source units", units.len()));
        self.transition(RunState::Discovered)?;

        if units.is_empty() {
            self.logger.warning("No source units found, nothing to analyse");
            self.transition(RunState::NothingToDo)?;
            return Ok(RunOutcome::NothingToDo);
        }
        let units_discovered = units.len();

        let client = self.observers.iter().fold(
            RetryingClient::new(self.service.clone(), self.retry_policy),
            |client, observer| client.with_observer(observer.clone()),
        );
        let client = Arc::new(client);

        let builder = ContextBuilder::new(client.clone(), self.summarizer.clone(), self.prompts.global.clone());
        let built = builder.build(&units).await;
        let context = match built {
            Ok(context) => context,
            Err(error) => return Err(self.fail(error)),
        };
        self.transition(RunState::ContextReady)?;

        let aggregator = Arc::new(ResultAggregator::new());
        self.transition(RunState::Dispatched)?;
        let dispatched = self.dispatch(&scheduler, units, client, context, aggregator.clone()).await;
        let dispatch = match dispatched {
            Ok(dispatch) => dispatch,
            Err(error) => return Err(self.fail(error)),
        };
        self.transition(RunState::Aggregated)?;

        let report = aggregator.snapshot();
        let mut summary = RunSummary {
            units_discovered,
            units_analyzed: dispatch.completed.len(),
            skipped: dispatch.skipped,
            units_with_findings: report.len(),
            findings: report.total_findings(),
            report_path: None,
        };

        if report.is_empty() {
            self.logger.info("No vulnerabilities reported, no report written");
            self.transition(RunState::Emitted)?;
            return Ok(RunOutcome::NoFindings(summary));
        }

        let path = self.report_path();
        if let Err(error) = self.write_report(&report, &path) {
            return Err(self.fail(error));
        }
        self.logger.info(&format!(
            "Wrote {} findings for {} units to {}",
            summary.findings,
            summary.units_with_findings,
            path.display()
        ));
        summary.report_path = Some(path);
        self.transition(RunState::Emitted)?;

        Ok(RunOutcome::ReportWritten(summary))
    }

    async fn dispatch(
        &self,
        scheduler: &BoundedScheduler,
        units: Vec<SourceUnit>,
        client: Arc<RetryingClient>,
        context: GlobalContext,
        aggregator: Arc<ResultAggregator>,
    ) -> LlmResult<DispatchSummary> {
        let prompt: Arc<str> = Arc::from(self.prompts.unit.as_str());
        let code_dir = self.settings.save_code.then(|| self.settings.output_dir.clone());

        scheduler
            .run(units, move |unit| {
                let client = client.clone();
                let context = context.clone();
                let prompt = prompt.clone();
                let aggregator = aggregator.clone();
                let code_dir = code_dir.clone();

                async move {
                    let payload = build_unit_payload(&context, &prompt, &unit);
                    let response = client.call(unit.id(), &payload).await?;
                    let result = parse_unit_response(unit.id(), &response)?;

                    if let Some(dir) = code_dir {
                        if let Some(code) = result.code_text()?.map(str::to_string) {
                            let target = mirror_path(&dir, unit.path())?;
                            tokio::task::spawn_blocking(move || append_text_file(&target, &code))
                                .await
                                .map_err(|e| LlmError::TaskFailed(e.to_string()))??;
                        }
                    }

                    tracing::info!(
                        unit = unit.id(),
                        findings = result.findings.len(),
                        "Unit analysed"
                    );
                    aggregator.merge(&result.unit_id, result.findings);
                    Ok(())
                }
            })
            .await
    }

    fn write_report(&self, report: &Report, path: &std::path::Path) -> LlmResult<()> {
        ensure_dir(&self.settings.output_dir)?;
        write_text_file(path, &report.to_json()?)?;
        Ok(())
    }
}
