//! Column naming stages: canonical renaming and pruning of unused columns.

use crate::audit::AuditReport;
use crate::data::DataProcessor;
use crate::error::{PipelineError, Result};
use crate::pipeline::Stage;
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

static LOWER_UPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\p{Ll}\p{N}])(\p{Lu})").expect("valid regex"));
static ACRONYM_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{Lu}+)(\p{Lu}\p{Ll})").expect("valid regex"));
static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid regex"));

/// Canonical lowercase, underscore-separated form of a column name.
///
/// `"FAFSA Received"` becomes `fafsa_received`, `"GPAScore"` becomes
/// `gpa_score`, `"% Complete"` becomes `percent_complete`.
pub fn canonical_name(raw: &str) -> String {
    let spelled = raw.replace('%', " percent ").replace('#', " number ");
    let split = ACRONYM_WORD.replace_all(&spelled, "${1}_${2}");
    let split = LOWER_UPPER.replace_all(&split, "${1}_${2}");
    let joined = SEPARATORS.replace_all(&split, "_");
    let name = joined.trim_matches('_').to_lowercase();

    match name.chars().next() {
        None => "x".to_string(),
        Some(first) if first.is_numeric() => format!("x{name}"),
        Some(_) => name,
    }
}

/// Map every name to its canonical form, failing on the first collision.
pub fn canonical_names(names: &[String]) -> Result<Vec<String>> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());

    for raw in names {
        let canonical = canonical_name(raw);
        if let Some(first) = seen.insert(canonical.clone(), raw.as_str()) {
            return Err(PipelineError::NameCollision {
                canonical,
                first: first.to_string(),
                second: raw.clone(),
            });
        }
        out.push(canonical);
    }
    Ok(out)
}

/// Renames every column to its canonical form. Values are untouched.
pub struct NameNormalizer;

impl Stage for NameNormalizer {
    fn name(&self) -> &'static str {
        "name_normalizer"
    }

    fn plan(&self, schema: Vec<String>) -> Result<Vec<String>> {
        canonical_names(&schema)
    }

    fn apply(&self, df: DataFrame, _report: &mut AuditReport) -> Result<DataFrame> {
        let original = DataProcessor::column_names(&df);
        let renamed = canonical_names(&original)?;

        let columns = df
            .get_columns()
            .iter()
            .zip(&renamed)
            .map(|(column, name)| {
                if column.name().as_str() != name {
                    debug!(from = %column.name(), to = %name, "Renamed column");
                }
                let mut column = column.clone();
                column.rename(name.as_str().into());
                column
            })
            .collect::<Vec<_>>();

        Ok(DataFrame::new(columns)?)
    }
}

/// Drops timestamp-like columns and explicitly named redundant columns.
///
/// Named columns that are already absent are skipped, so re-applying the
/// pruner to its own output is a no-op.
pub struct ColumnPruner {
    substring: String,
    named: Vec<String>,
}

impl ColumnPruner {
    pub fn new(substring: impl Into<String>, named: Vec<String>) -> Self {
        Self {
            substring: substring.into(),
            named,
        }
    }

    fn keeps(&self, name: &str) -> bool {
        let matches_substring = !self.substring.is_empty() && name.contains(&self.substring);
        !matches_substring && !self.named.iter().any(|n| n == name)
    }
}

impl Stage for ColumnPruner {
    fn name(&self) -> &'static str {
        "column_pruner"
    }

    fn plan(&self, schema: Vec<String>) -> Result<Vec<String>> {
        Ok(schema.into_iter().filter(|name| self.keeps(name)).collect())
    }

    fn apply(&self, df: DataFrame, _report: &mut AuditReport) -> Result<DataFrame> {
        for named in &self.named {
            if df.column(named).is_err() {
                debug!(column = %named, "Pruned column already absent");
            }
        }

        let (pruned, removed) = DataProcessor::retain_columns(&df, |name| self.keeps(name))?;
        debug!(removed = ?removed, "Pruned columns");
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_handles_mixed_styles() {
        assert_eq!(canonical_name("FAFSA Received"), "fafsa_received");
        assert_eq!(canonical_name("Decision History (All Decisions)"), "decision_history_all_decisions");
        assert_eq!(canonical_name("Events (comma-separated)"), "events_comma_separated");
        assert_eq!(canonical_name("firstName"), "first_name");
        assert_eq!(canonical_name("GPAScore"), "gpa_score");
        assert_eq!(canonical_name("  Postal Code  "), "postal_code");
        assert_eq!(canonical_name("% Complete"), "percent_complete");
        assert_eq!(canonical_name("Application #"), "application_number");
        assert_eq!(canonical_name("2nd Choice"), "x2nd_choice");
        assert_eq!(canonical_name("???"), "x");
        assert_eq!(canonical_name("round"), "round");
    }

    #[test]
    fn canonical_name_is_idempotent() {
        for raw in ["Ping Count", "Created Timestamp", "tags", "HSV Visits"] {
            let once = canonical_name(raw);
            assert_eq!(canonical_name(&once), once);
        }
    }

    #[test]
    fn collisions_are_reported_with_both_originals() {
        let names = vec!["Region".to_string(), "region".to_string()];
        match canonical_names(&names) {
            Err(PipelineError::NameCollision {
                canonical,
                first,
                second,
            }) => {
                assert_eq!(canonical, "region");
                assert_eq!(first, "Region");
                assert_eq!(second, "region");
            }
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn normalizer_renames_without_touching_values() {
        let df = DataFrame::new(vec![
            Column::new("Ping Count".into(), vec![Some(3i64), None]),
            Column::new("Tags".into(), vec!["UWC", "Recruit"]),
        ])
        .unwrap();
        let mut report = AuditReport::default();
        let out = NameNormalizer.apply(df.clone(), &mut report).unwrap();

        assert_eq!(DataProcessor::column_names(&out), vec!["ping_count", "tags"]);
        assert!(out
            .column("ping_count")
            .unwrap()
            .as_materialized_series()
            .equals_missing(df.column("Ping Count").unwrap().as_materialized_series()));
    }

    #[test]
    fn pruner_is_idempotent() {
        let df = DataFrame::new(vec![
            Column::new("id".into(), vec![1i64, 2]),
            Column::new("created_timestamp".into(), vec!["a", "b"]),
            Column::new("interaction_history".into(), vec!["x", "y"]),
            Column::new("gpa".into(), vec![3.1f64, 3.9]),
        ])
        .unwrap();
        let pruner = ColumnPruner::new("timestamp", vec!["interaction_history".to_string()]);
        let mut report = AuditReport::default();

        let once = pruner.apply(df, &mut report).unwrap();
        assert_eq!(DataProcessor::column_names(&once), vec!["id", "gpa"]);

        let twice = pruner.apply(once.clone(), &mut report).unwrap();
        assert_eq!(
            DataProcessor::column_names(&twice),
            DataProcessor::column_names(&once)
        );
        assert_eq!(twice.height(), 2);
    }
}
