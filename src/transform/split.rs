//! Splits the compound admission round ("2025 Early Decision") into year and period.

use crate::audit::AuditReport;
use crate::data::DataProcessor;
use crate::error::{PipelineError, Result};
use crate::pipeline::{require_planned, Stage};
use polars::prelude::*;
use tracing::info;

const STAGE: &str = "field_splitter";

/// Split on the first whitespace only; period labels are multi-word.
/// A value without whitespace yields a year and no period.
pub fn split_round(value: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(text) = value.map(str::trim).filter(|t| !t.is_empty()) else {
        return (None, None);
    };

    match text.split_once(char::is_whitespace) {
        Some((year, rest)) => {
            let period = rest.trim();
            let period = (!period.is_empty()).then(|| period.to_string());
            (Some(year.to_string()), period)
        }
        None => (Some(text.to_string()), None),
    }
}

pub struct FieldSplitter {
    source: String,
    year: String,
    period: String,
}

impl FieldSplitter {
    pub fn new(
        source: impl Into<String>,
        year: impl Into<String>,
        period: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            year: year.into(),
            period: period.into(),
        }
    }
}

impl Stage for FieldSplitter {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn plan(&self, schema: Vec<String>) -> Result<Vec<String>> {
        require_planned(&schema, STAGE, &self.source)?;
        for produced in [&self.year, &self.period] {
            if schema.contains(produced) {
                return Err(PipelineError::ColumnExists {
                    stage: STAGE.to_string(),
                    column: produced.clone(),
                });
            }
        }

        let mut planned = Vec::with_capacity(schema.len() + 1);
        for name in schema {
            if name == self.source {
                planned.push(self.year.clone());
                planned.push(self.period.clone());
            } else {
                planned.push(name);
            }
        }
        Ok(planned)
    }

    fn apply(&self, df: DataFrame, _report: &mut AuditReport) -> Result<DataFrame> {
        let values = DataProcessor::text_values(DataProcessor::require(&df, STAGE, &self.source)?)?;
        DataProcessor::ensure_absent(&df, STAGE, &self.year)?;
        DataProcessor::ensure_absent(&df, STAGE, &self.period)?;

        let (years, periods): (Vec<Option<String>>, Vec<Option<String>>) =
            values.iter().map(|v| split_round(v.as_deref())).unzip();
        let without_period = periods.iter().filter(|p| p.is_none()).count();

        let out = DataProcessor::replace_column(
            &df,
            &self.source,
            vec![
                Column::new(self.year.as_str().into(), years),
                Column::new(self.period.as_str().into(), periods),
            ],
        )?;

        info!(
            source = %self.source,
            without_period,
            "Split compound column"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_space_only() {
        assert_eq!(
            split_round(Some("2025 Early Decision II")),
            (Some("2025".to_string()), Some("Early Decision II".to_string()))
        );
    }

    #[test]
    fn value_without_space_has_no_period() {
        assert_eq!(split_round(Some("2026")), (Some("2026".to_string()), None));
        assert_eq!(split_round(Some("  2026  ")), (Some("2026".to_string()), None));
    }

    #[test]
    fn missing_round_yields_missing_parts() {
        assert_eq!(split_round(None), (None, None));
        assert_eq!(split_round(Some("")), (None, None));
    }

    #[test]
    fn stage_replaces_round_in_place() {
        let df = DataFrame::new(vec![
            Column::new("id".into(), vec![1i64, 2, 3]),
            Column::new(
                "round".into(),
                vec![Some("2025 Early Decision"), Some("2026"), None],
            ),
            Column::new("gpa".into(), vec![3.2f64, 3.5, 3.9]),
        ])
        .unwrap();
        let splitter = FieldSplitter::new("round", "year", "period");
        let out = splitter.apply(df, &mut AuditReport::default()).unwrap();

        assert_eq!(
            DataProcessor::column_names(&out),
            vec!["id", "year", "period", "gpa"]
        );
        let periods: Vec<Option<&str>> =
            out.column("period").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(periods, vec![Some("Early Decision"), None, None]);
    }

    #[test]
    fn existing_year_column_is_rejected() {
        let df = DataFrame::new(vec![
            Column::new("round".into(), vec!["2025 Regular"]),
            Column::new("year".into(), vec!["2024"]),
        ])
        .unwrap();
        let splitter = FieldSplitter::new("round", "year", "period");
        assert!(matches!(
            splitter.apply(df, &mut AuditReport::default()),
            Err(PipelineError::ColumnExists { .. })
        ));
    }
}
