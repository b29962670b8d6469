//! Rule-driven report identification.
//!
//! Spool files interleave pages from many reports, so the loader needs a
//! way to tell which report each page belongs to. Rules live in a YAML
//! file: under a `Reports` root every entry names a report, lists the
//! text patterns that identify its pages, and carries the descriptive
//! fields that end up in the report's metadata.
//!
//! ```yaml
//! Reports:
//!   L80010 - CLIENTES:
//!     match:
//!       L80010:
//!       LISTADO DE CLIENTES:
//!     system: Cobis
//!     application: Cuentas
//!     department: Legales
//! ```
//!
//! Rules are tried in file order and the first pattern found anywhere in
//! the page wins, so more specific rules belong earlier in the file.

use std::io;
use std::path::Path;

use serde_yaml::Value;
use thiserror::Error;

use crate::metadata::{Metadata, KEY_DATE};

/// Report name assigned to pages no rule claims.
pub const UNMATCHED_REPORT: &str = "Sin Identificar";

/// Errors raised while loading a rules file.
#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("invalid rules file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One pattern to look for and the report it identifies.
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub report: String,
    pub pattern: String,
    pub system: String,
    pub application: String,
    pub department: String,
    /// Fixed date for the report; pages get the load date when absent.
    pub date: Option<String>,
}

/// Ordered rule list applied page by page.
#[derive(Debug, Default)]
pub struct ReportMatcher {
    rules: Vec<MatchRule>,
}

impl ReportMatcher {
    /// Matcher with no rules: every page lands in [`UNMATCHED_REPORT`].
    pub fn empty() -> Self {
        ReportMatcher::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MatcherError> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// Parse rules from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, MatcherError> {
        // site configs habitually indent with tabs, which YAML rejects
        let text = text.replace('\t', " ");
        let root: Value = serde_yaml::from_str(&text)?;

        let mut rules = Vec::new();
        if let Some(reports) = root.get("Reports").and_then(Value::as_mapping) {
            for (name, body) in reports {
                let report = match scalar(name) {
                    Some(report) => report,
                    None => continue,
                };
                let system = field(body, "system");
                let application = field(body, "application");
                let department = field(body, "department");
                let date = body.get("date").and_then(scalar);

                if let Some(patterns) = body.get("match").and_then(Value::as_mapping) {
                    for (pattern, _) in patterns {
                        if let Some(pattern) = scalar(pattern) {
                            rules.push(MatchRule {
                                report: report.clone(),
                                pattern,
                                system: system.clone(),
                                application: application.clone(),
                                department: department.clone(),
                                date: date.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(ReportMatcher { rules })
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    /// Build the metadata for the report a page belongs to.
    pub fn identify(&self, page: &str) -> Metadata {
        for rule in &self.rules {
            if page.contains(&rule.pattern) {
                let mut metadata = Metadata::new(
                    &rule.report,
                    &rule.system,
                    &rule.application,
                    &rule.department,
                );
                if let Some(date) = &rule.date {
                    metadata.set(KEY_DATE, date);
                }
                return metadata;
            }
        }
        Metadata::new(UNMATCHED_REPORT, "n/a", "n/a", "n/a")
    }
}

/// Scalar YAML value as text; unquoted numeric codes are common in rules.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(scalar)
        .unwrap_or_else(|| "n/a".to_owned())
}
