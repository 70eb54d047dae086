//! Global context construction
//!
//! A structural digest of every unit is sent to the service once; the answer
//! becomes the [`GlobalContext`] that every per-unit request carries. The
//! response is parsed best-effort: anything that is not an object with a
//! string `GlobalContext` field is used verbatim.

use crate::retry::RetryingClient;
use crate::unit::SourceUnit;
use crate::LlmResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use vulnhud_utils::{extract_member_names, extract_type_names, strip_code_fences};

/// Declared names of one unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitDigest {
    pub classes: Vec<String>,
    pub methods: Vec<String>,
}

/// Digest of all units, keyed by unit id in sorted order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructuralDigest {
    pub files: BTreeMap<String, UnitDigest>,
}

impl StructuralDigest {
    pub fn to_json(&self) -> LlmResult<String> {
        crate::to_pretty_json(self)
    }
}

/// Produces the structural digest of a single unit
pub trait StructuralSummarizer: Send + Sync {
    fn summarize(&self, unit: &SourceUnit) -> UnitDigest;
}

/// Regex-based class/method name extraction
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexSummarizer;

impl StructuralSummarizer for RegexSummarizer {
    fn summarize(&self, unit: &SourceUnit) -> UnitDigest {
        UnitDigest {
            classes: extract_type_names(unit.content()),
            methods: extract_member_names(unit.content()),
        }
    }
}

/// Shared, read-only project context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalContext(Arc<str>);

impl GlobalContext {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GlobalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a best-effort parse: the structured value, or the raw text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
    Structured(T),
    Raw(String),
}

/// Extract the `GlobalContext` field, falling back to the raw response
pub fn parse_global_context(response: &str) -> Parsed<String> {
    let value: Option<serde_json::Value> = serde_json::from_str(&strip_code_fences(response)).ok();

    match value
        .as_ref()
        .and_then(|v| v.get("GlobalContext"))
        .and_then(serde_json::Value::as_str)
    {
        Some(context) => Parsed::Structured(context.to_string()),
        None => Parsed::Raw(response.to_string()),
    }
}

/// Builds the [`GlobalContext`] with exactly one service call
pub struct ContextBuilder {
    client: Arc<RetryingClient>,
    summarizer: Arc<dyn StructuralSummarizer>,
    preamble: String,
}

impl ContextBuilder {
    pub fn new(
        client: Arc<RetryingClient>,
        summarizer: Arc<dyn StructuralSummarizer>,
        preamble: impl Into<String>,
    ) -> Self {
        Self {
            client,
            summarizer,
            preamble: preamble.into(),
        }
    }

    pub fn digest(&self, units: &[SourceUnit]) -> StructuralDigest {
        let files = units
            .iter()
            .map(|unit| (unit.id().to_string(), self.summarizer.summarize(unit)))
            .collect();
        StructuralDigest { files }
    }

    /// Global payload: preamble, blank line, pretty-printed digest
    pub fn build_payload(&self, digest: &StructuralDigest) -> LlmResult<String> {
        Ok(format!("{}\n\n{}", self.preamble, digest.to_json()?))
    }

    pub async fn build(&self, units: &[SourceUnit]) -> LlmResult<GlobalContext> {
        let digest = self.digest(units);
        let payload = self.build_payload(&digest)?;

        info!(units = units.len(), payload_bytes = payload.len(), "Requesting global context");
        let response = self.client.call("global context", &payload).await?;

        let text = match parse_global_context(&response) {
            Parsed::Structured(text) => text,
            Parsed::Raw(text) => {
                warn!("Global context response is not a GlobalContext object; using raw text");
                text
            }
        };

        Ok(GlobalContext::new(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::service::{AnalysisService, ServiceError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Fixed {
        response: Result<String, ServiceError>,
        payloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AnalysisService for Fixed {
        async fn generate(&self, payload: &str) -> Result<String, ServiceError> {
            self.payloads.lock().unwrap().push(payload.to_string());
            self.response.clone()
        }
    }

    fn builder_with(response: Result<String, ServiceError>) -> (ContextBuilder, Arc<Fixed>) {
        let service = Arc::new(Fixed { response, payloads: Mutex::new(Vec::new()) });
        let client = Arc::new(RetryingClient::new(service.clone(), RetryPolicy::default()));
        (ContextBuilder::new(client, Arc::new(RegexSummarizer), "GLOBAL PROMPT"), service)
    }

    fn units() -> Vec<SourceUnit> {
        vec![
            SourceUnit::new("b/Second.java", "public class Second { public void run() {} }"),
            SourceUnit::new("a/First.java", "class First { private static int count(String s) { return 0; } }"),
        ]
    }

    #[test]
    fn test_parse_structured() {
        assert_eq!(parse_global_context("{\"GlobalContext\":\"ctx\"}"), Parsed::Structured("ctx".to_string()));
        assert_eq!(
            parse_global_context("```json\n{\"GlobalContext\":\"fenced\"}\n```"),
            Parsed::Structured("fenced".to_string())
        );
    }

    #[test]
    fn test_parse_falls_back_to_raw() {
        assert_eq!(parse_global_context("not json"), Parsed::Raw("not json".to_string()));
        assert_eq!(parse_global_context("{\"Other\":1}"), Parsed::Raw("{\"Other\":1}".to_string()));
        assert_eq!(parse_global_context("{\"GlobalContext\":42}"), Parsed::Raw("{\"GlobalContext\":42}".to_string()));
    }

    #[test]
    fn test_digest_is_sorted_and_stable() {
        let (builder, _) = builder_with(Ok(String::new()));
        let mut reversed = units();
        reversed.reverse();

        let first = builder.digest(&units()).to_json().unwrap();
        let second = builder.digest(&reversed).to_json().unwrap();

        assert_eq!(first, second);
        assert!(first.find("a/First.java").unwrap() < first.find("b/Second.java").unwrap());
        assert_eq!(builder.digest(&units()).files["a/First.java"].methods, vec!["count"]);
    }

    #[tokio::test]
    async fn test_build_makes_one_call() {
        let (builder, service) = builder_with(Ok("{\"GlobalContext\":\"ctx\"}".to_string()));

        let context = builder.build(&units()).await.unwrap();

        assert_eq!(context.as_str(), "ctx");
        let payloads = service.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].starts_with("GLOBAL PROMPT\n\n{"));
        assert!(payloads[0].contains("\"files\""));
    }

    #[tokio::test]
    async fn test_build_uses_raw_text_fallback() {
        let (builder, _) = builder_with(Ok("not json".to_string()));
        let context = builder.build(&units()).await.unwrap();
        assert_eq!(context.as_str(), "not json");
    }

    #[tokio::test]
    async fn test_build_propagates_fatal() {
        let (builder, _) = builder_with(Err(ServiceError::Fatal("denied".to_string())));
        let error = builder.build(&units()).await.unwrap_err();
        assert!(error.is_fatal());
    }
}
