//! String processing utilities
//!
//! Heuristic, regex-based signature extraction for Java-like sources and
//! cleanup of model responses before JSON parsing.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TYPE_DECLARATION: Regex = Regex::new(r"class\s+(\w+)")
        .expect("type declaration pattern is valid");

    // modifier? static? return-type name(args)
    static ref MEMBER_DECLARATION: Regex = Regex::new(
        r"(public|private|protected)?\s+(static\s+)?(\w+|<\w+>)\s+(\w+)\(.*?\)"
    )
    .expect("member declaration pattern is valid");
}

/// Extract declared class names in source order (duplicates preserved)
pub fn extract_type_names(code: &str) -> Vec<String> {
    TYPE_DECLARATION
        .captures_iter(code)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Extract method-like member names in source order (duplicates preserved)
pub fn extract_member_names(code: &str) -> Vec<String> {
    MEMBER_DECLARATION
        .captures_iter(code)
        .filter_map(|cap| cap.get(4).map(|m| m.as_str().to_string()))
        .collect()
}

/// Remove Markdown code fences a model may wrap around JSON output
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}
