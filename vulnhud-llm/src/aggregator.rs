//! Thread-safe collection of per-unit findings

use crate::analysis::Finding;
use crate::LlmResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Final report: unit id to findings, only units with at least one finding
///
/// Keys are kept sorted so identical inputs serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Report(BTreeMap<String, Vec<Finding>>);

impl Report {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of units with findings
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, unit_id: &str) -> Option<&[Finding]> {
        self.0.get(unit_id).map(Vec::as_slice)
    }

    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn total_findings(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Pretty-printed JSON with 4-space indentation
    pub fn to_json(&self) -> LlmResult<String> {
        crate::to_pretty_json(self)
    }
}

/// Shared findings store, one lock section per merge
#[derive(Debug, Default)]
pub struct ResultAggregator {
    store: Mutex<BTreeMap<String, Vec<Finding>>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the findings of one successfully analysed unit.
    ///
    /// Units without findings leave no entry behind.
    pub fn merge(&self, unit_id: &str, findings: Vec<Finding>) {
        if findings.is_empty() {
            return;
        }
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.entry(unit_id.to_string()).or_default().extend(findings);
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Report {
        Report(self.store.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}
