//! Pipeline Configuration Module
//! Every constant the transformation depends on, overridable from JSON.

use crate::error::{PipelineError, Result};
use crate::transform::canonical_name;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Highest category code a student-group rule may assign.
pub const MAX_STUDENT_GROUP: i32 = 6;

/// One row of the student-group precedence table.
///
/// A tag string matches when it contains every pattern in `all_of`
/// (case-sensitive substring match).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRule {
    pub all_of: Vec<String>,
    pub code: i32,
}

impl GroupRule {
    pub fn new(all_of: &[&str], code: i32) -> Self {
        Self {
            all_of: all_of.iter().map(|s| s.to_string()).collect(),
            code,
        }
    }
}

/// Named, overridable parameters of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub institution_postal_code: String,
    pub in_state_region: String,
    pub domestic_country: String,
    pub event_markers: Vec<String>,
    /// Evaluated top-down; first match wins. Unmatched rows get `fallback_group`.
    pub student_group_rules: Vec<GroupRule>,
    pub fallback_group: i32,
    pub enrolled_label: String,

    pub pruned_substring: String,
    pub pruned_columns: Vec<String>,

    pub zero_fill_columns: Vec<String>,
    pub fafsa_column: String,
    pub round_column: String,
    pub year_column: String,
    pub period_column: String,
    pub events_column: String,
    pub postal_column: String,
    pub country_column: String,
    pub region_column: String,
    pub tags_column: String,
    pub decision_column: String,
    pub numeric_columns: Vec<String>,
    pub excluded_columns: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            institution_postal_code: "60045".to_string(),
            in_state_region: "IL".to_string(),
            domestic_country: "United States".to_string(),
            event_markers: strings(&[
                "High School Visit:",
                "College Fair:",
                "Virtual High School Visit",
                "Virtual College Fair",
                "Transfer Fair:",
                "HSV:",
            ]),
            student_group_rules: vec![
                GroupRule::new(&["Recruit", "Forester Scholars Weekend"], 6),
                GroupRule::new(&["UWC", "Forester Scholars Weekend"], 5),
                GroupRule::new(&["UWC", "Recruit"], 4),
                GroupRule::new(&["Forester Scholars Weekend"], 3),
                GroupRule::new(&["UWC"], 1),
                GroupRule::new(&["Recruit"], 2),
            ],
            fallback_group: 0,
            enrolled_label: "Deposit Paid (Enroll)".to_string(),

            pruned_substring: "timestamp".to_string(),
            pruned_columns: strings(&["interaction_history"]),

            zero_fill_columns: strings(&[
                "ping_count",
                "ping_duration_minutes",
                "email_opens",
                "events_attended",
            ]),
            fafsa_column: "fafsa_received".to_string(),
            round_column: "round".to_string(),
            year_column: "year".to_string(),
            period_column: "period".to_string(),
            events_column: "events_comma_separated".to_string(),
            postal_column: "postal_code".to_string(),
            country_column: "country".to_string(),
            region_column: "region".to_string(),
            tags_column: "tags".to_string(),
            decision_column: "decision_history_all_decisions".to_string(),
            numeric_columns: strings(&[
                "ping_count",
                "ping_duration_minutes",
                "gpa",
            ]),
            excluded_columns: strings(&[
                "events_comma_separated",
                "postal_code",
                "country",
                "region",
                "city",
                "tags",
                "decision_history_all_decisions",
            ]),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON override file; keys left out keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether a raw export header must be read as text rather than inferred.
    /// Postal codes stay text so malformed values reach the audit intact.
    pub fn reads_as_text(&self, raw_name: &str) -> bool {
        canonical_name(raw_name) == self.postal_column
    }

    /// Check internal consistency. Column existence is checked later
    /// against the input schema by the pipeline pre-flight.
    pub fn validate(&self) -> Result<()> {
        if self.institution_postal_code.trim().is_empty() {
            return Err(PipelineError::Config(
                "institution_postal_code must not be empty".to_string(),
            ));
        }
        if self.event_markers.is_empty() || self.event_markers.iter().any(|m| m.is_empty()) {
            return Err(PipelineError::Config(
                "event_markers must be a non-empty list of non-empty labels".to_string(),
            ));
        }
        if self.student_group_rules.is_empty() {
            return Err(PipelineError::Config(
                "student_group_rules must not be empty".to_string(),
            ));
        }

        let mut codes = HashSet::new();
        for rule in &self.student_group_rules {
            if rule.all_of.is_empty() || rule.all_of.iter().any(|p| p.is_empty()) {
                return Err(PipelineError::Config(format!(
                    "student group rule {} has an empty pattern set",
                    rule.code
                )));
            }
            if !(0..=MAX_STUDENT_GROUP).contains(&rule.code) {
                return Err(PipelineError::Config(format!(
                    "student group code {} is outside 0..={}",
                    rule.code, MAX_STUDENT_GROUP
                )));
            }
            if rule.code == self.fallback_group || !codes.insert(rule.code) {
                return Err(PipelineError::Config(format!(
                    "student group code {} is assigned more than once",
                    rule.code
                )));
            }
        }
        if !(0..=MAX_STUDENT_GROUP).contains(&self.fallback_group) {
            return Err(PipelineError::Config(format!(
                "fallback_group {} is outside 0..={}",
                self.fallback_group, MAX_STUDENT_GROUP
            )));
        }

        if self.enrolled_label.trim().is_empty() {
            return Err(PipelineError::Config(
                "enrolled_label must not be empty".to_string(),
            ));
        }
        if self.year_column == self.period_column {
            return Err(PipelineError::Config(
                "year_column and period_column must differ".to_string(),
            ));
        }
        Ok(())
    }
}
