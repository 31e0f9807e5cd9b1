//! Audit Report Module
//! Counts of imputed, coerced and defaulted values gathered during a run.

use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Per-column data-quality counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnAudit {
    /// Missing cells rewritten to zero.
    pub imputed: usize,
    /// Rows whose presence flag was set to 0.
    pub flagged_missing: usize,
    /// Non-empty text that failed numeric parsing and became missing.
    pub coercion_failures: usize,
    /// Postal codes that are not five digits (or ZIP+4).
    pub invalid_postal_codes: usize,
    /// Well-formed postal codes absent from the gazetteer.
    pub unknown_postal_codes: usize,
    /// Rows resolved to a documented default because the source was missing.
    pub defaulted: usize,
}

impl ColumnAudit {
    pub fn is_clean(&self) -> bool {
        *self == ColumnAudit::default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage: String,
    pub columns_in: usize,
    pub columns_out: usize,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub output_columns: Vec<String>,
    pub stages: Vec<StageSummary>,
    pub columns: BTreeMap<String, ColumnAudit>,
}

impl AuditReport {
    pub fn new(input_rows: usize) -> Self {
        Self {
            input_rows,
            ..Default::default()
        }
    }

    /// Counters for `column`, created on first use.
    pub fn column(&mut self, column: &str) -> &mut ColumnAudit {
        self.columns.entry(column.to_string()).or_default()
    }

    pub fn record_stage(&mut self, stage: &str, before: &[String], after: &[String]) {
        let added = after
            .iter()
            .filter(|name| !before.contains(name))
            .cloned()
            .collect();
        let removed = before
            .iter()
            .filter(|name| !after.contains(name))
            .cloned()
            .collect();

        self.stages.push(StageSummary {
            stage: stage.to_string(),
            columns_in: before.len(),
            columns_out: after.len(),
            added,
            removed,
        });
    }

    /// Columns that saw at least one row-level correction.
    pub fn touched_columns(&self) -> impl Iterator<Item = (&String, &ColumnAudit)> {
        self.columns.iter().filter(|(_, audit)| !audit.is_clean())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_stage_tracks_added_and_removed() {
        let mut report = AuditReport::new(3);
        let before = vec!["round".to_string(), "id".to_string()];
        let after = vec!["id".to_string(), "year".to_string(), "period".to_string()];
        report.record_stage("field_splitter", &before, &after);

        let stage = &report.stages[0];
        assert_eq!(stage.added, vec!["year", "period"]);
        assert_eq!(stage.removed, vec!["round"]);
        assert_eq!(stage.columns_out, 3);
    }

    #[test]
    fn touched_columns_skips_clean_entries() {
        let mut report = AuditReport::new(1);
        report.column("gpa");
        report.column("ping_count").imputed = 2;
        let touched: Vec<_> = report.touched_columns().map(|(name, _)| name.clone()).collect();
        assert_eq!(touched, vec!["ping_count"]);
    }
}
