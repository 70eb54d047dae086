//! Per-unit request payloads and response parsing

use crate::context::GlobalContext;
use crate::unit::SourceUnit;
use crate::{LlmError, LlmResult};
use serde::Deserialize;
use vulnhud_utils::strip_code_fences;

/// One reported issue; passed through exactly as the service returned it
pub type Finding = serde_json::Value;

/// Parsed answer for one unit
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub unit_id: String,
    pub findings: Vec<Finding>,
    /// Rewritten (deobfuscated) source as returned; only read when saving code
    pub code: Option<serde_json::Value>,
}

impl AnalysisResult {
    /// Rewritten source as text
    ///
    /// A missing or null `Code` is `None`. Any other non-string value is a
    /// [`LlmError::MalformedResponse`] for this unit.
    pub fn code_text(&self) -> LlmResult<Option<&str>> {
        match &self.code {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(text)) => Ok(Some(text)),
            Some(other) => Err(LlmError::MalformedResponse {
                unit: self.unit_id.clone(),
                reason: format!("Code is not a string: {}", other),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UnitResponse {
    #[serde(rename = "Code", default)]
    code: Option<serde_json::Value>,
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Vec<Finding>,
}

/// Per-unit payload: shared context, unit prompt, then the file itself
pub fn build_unit_payload(context: &GlobalContext, prompt: &str, unit: &SourceUnit) -> String {
    format!("{}\n\n{}\n\nFILE:\n{}\n\n", context, prompt, unit.content())
}

/// Parse a per-unit response (`{"Code": ..., "Vulnerabilities": [...]}`)
///
/// Markdown fences around the JSON are tolerated. Anything else that does not
/// fit the shape is a [`LlmError::MalformedResponse`] for this unit only.
pub fn parse_unit_response(unit_id: &str, response: &str) -> LlmResult<AnalysisResult> {
    let cleaned = strip_code_fences(response);
    let parsed: UnitResponse = serde_json::from_str(&cleaned)
        .map_err(|e| LlmError::MalformedResponse {
            unit: unit_id.to_string(),
            reason: e.to_string(),
        })?;

    Ok(AnalysisResult {
        unit_id: unit_id.to_string(),
        findings: parsed.vulnerabilities,
        code: parsed.code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_with_findings() {
        let result = parse_unit_response(
            "B",
            r#"{"Code":"class B {}","Vulnerabilities":[{"type":"SQLi","severity":"high"}]}"#,
        ).unwrap();

        assert_eq!(result.unit_id, "B");
        assert_eq!(result.code_text().unwrap(), Some("class B {}"));
        assert_eq!(result.findings, vec![json!({"type": "SQLi", "severity": "high"})]);
    }

    #[test]
    fn test_parse_fenced_without_findings() {
        let result = parse_unit_response("A", "```json\n{\"Code\":\"x\",\"Vulnerabilities\":[]}\n```").unwrap();
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_missing_fields_default() {
        let result = parse_unit_response("A", "{}").unwrap();
        assert!(result.findings.is_empty());
        assert!(result.code.is_none());
        assert_eq!(result.code_text().unwrap(), None);
    }

    #[test]
    fn test_non_string_code_keeps_findings() {
        let result = parse_unit_response(
            "A",
            r#"{"Code":["line1"],"Vulnerabilities":[{"type":"SQLi"}]}"#,
        ).unwrap();

        assert_eq!(result.findings, vec![json!({"type": "SQLi"})]);
        let error = result.code_text().unwrap_err();
        assert!(matches!(error, LlmError::MalformedResponse { ref unit, .. } if unit == "A"));
    }

    #[test]
    fn test_malformed_responses() {
        for bad in ["not json", "[1, 2]", r#"{"Vulnerabilities": "none"}"#] {
            let error = parse_unit_response("A", bad).unwrap_err();
            assert!(matches!(error, LlmError::MalformedResponse { ref unit, .. } if unit == "A"));
            assert!(!error.is_fatal());
        }
    }

    #[test]
    fn test_payload_layout() {
        let unit = SourceUnit::new("A.java", "class A {}");
        let payload = build_unit_payload(&GlobalContext::new("ctx"), "PROMPT", &unit);
        assert_eq!(payload, "ctx\n\nPROMPT\n\nFILE:\nclass A {}\n\n");
    }
}
