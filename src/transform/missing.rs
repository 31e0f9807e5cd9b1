//! Missing-value rules: zero-fill for engagement counters, presence flag for FAFSA.

use crate::audit::AuditReport;
use crate::data::{is_blank, DataProcessor};
use crate::error::{PipelineError, Result};
use crate::pipeline::{require_planned, Stage};
use polars::prelude::*;
use tracing::{debug, info};

const STAGE: &str = "missing_value_resolver";

/// Zero-fills the enumerated engagement columns (missing means no recorded
/// interaction) and turns the FAFSA date into a 0/1 presence flag.
pub struct MissingValueResolver {
    zero_fill: Vec<String>,
    presence: String,
}

impl MissingValueResolver {
    pub fn new(zero_fill: Vec<String>, presence: impl Into<String>) -> Self {
        Self {
            zero_fill,
            presence: presence.into(),
        }
    }

    fn missing_zero_fill_column(name: &str) -> PipelineError {
        PipelineError::Config(format!(
            "{STAGE}: zero_fill_columns names '{name}', which is not in the input schema"
        ))
    }
}

/// Replace nulls with zero, keeping the column's type where possible.
/// Returns the filled series and how many cells were rewritten.
pub fn zero_fill(series: &Series) -> Result<(Series, usize)> {
    let dtype = series.dtype();

    if DataProcessor::is_numeric_dtype(dtype) {
        let nulls = series.null_count();
        return Ok((series.fill_null(FillNullStrategy::Zero)?, nulls));
    }

    match dtype {
        DataType::String => {
            let mut rewritten = 0;
            let values: Vec<String> = series
                .str()?
                .into_iter()
                .map(|value| match value {
                    Some(text) if !is_blank(Some(text)) => text.to_string(),
                    _ => {
                        rewritten += 1;
                        "0".to_string()
                    }
                })
                .collect();
            Ok((Series::new(series.name().clone(), values), rewritten))
        }
        DataType::Null => {
            let nulls = series.len();
            let filled = series
                .cast(&DataType::Float64)?
                .fill_null(FillNullStrategy::Zero)?;
            Ok((filled, nulls))
        }
        other => Err(PipelineError::UnsupportedFill {
            column: series.name().to_string(),
            dtype: other.to_string(),
        }),
    }
}

/// 1 where the value is present, 0 where it is missing or blank.
pub fn presence_flags(values: &[Option<String>]) -> Vec<i32> {
    values
        .iter()
        .map(|value| if is_blank(value.as_deref()) { 0 } else { 1 })
        .collect()
}

impl Stage for MissingValueResolver {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn plan(&self, schema: Vec<String>) -> Result<Vec<String>> {
        if let Some(missing) = self.zero_fill.iter().find(|c| !schema.contains(c)) {
            return Err(Self::missing_zero_fill_column(missing));
        }
        require_planned(&schema, STAGE, &self.presence)?;
        Ok(schema)
    }

    fn apply(&self, df: DataFrame, report: &mut AuditReport) -> Result<DataFrame> {
        let mut df = df;

        for name in &self.zero_fill {
            let column = df
                .column(name)
                .map_err(|_| Self::missing_zero_fill_column(name))?;
            let (filled, rewritten) = zero_fill(column.as_materialized_series())?;
            df.with_column(filled)?;

            report.column(name).imputed += rewritten;
            debug!(column = %name, rewritten, "Zero-filled column");
        }

        let values = DataProcessor::text_values(DataProcessor::require(&df, STAGE, &self.presence)?)?;
        let flags = presence_flags(&values);
        let missing = flags.iter().filter(|flag| **flag == 0).count();
        df.with_column(Series::new(self.presence.as_str().into(), flags))?;
        report.column(&self.presence).flagged_missing += missing;

        info!(
            zero_filled = self.zero_fill.len(),
            presence_column = %self.presence,
            missing,
            "Resolved missing values"
        );
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> MissingValueResolver {
        MissingValueResolver::new(
            vec!["ping_count".to_string(), "notes_count".to_string()],
            "fafsa_received",
        )
    }

    fn sample() -> DataFrame {
        DataFrame::new(vec![
            Column::new("ping_count".into(), vec![Some(4i64), None, Some(0)]),
            Column::new("notes_count".into(), vec![None, Some("12"), Some(" ")]),
            Column::new(
                "fafsa_received".into(),
                vec![Some("2024-11-02"), None, Some("")],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn zero_fill_keeps_present_values() {
        let mut report = AuditReport::default();
        let out = resolver().apply(sample(), &mut report).unwrap();

        let pings: Vec<Option<i64>> = out.column("ping_count").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(pings, vec![Some(4), Some(0), Some(0)]);

        let notes: Vec<Option<&str>> = out.column("notes_count").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(notes, vec![Some("0"), Some("12"), Some("0")]);

        assert_eq!(report.columns["ping_count"].imputed, 1);
        assert_eq!(report.columns["notes_count"].imputed, 2);
    }

    #[test]
    fn fafsa_becomes_presence_flag() {
        let mut report = AuditReport::default();
        let out = resolver().apply(sample(), &mut report).unwrap();

        let flags: Vec<Option<i32>> = out.column("fafsa_received").unwrap().i32().unwrap().into_iter().collect();
        assert_eq!(flags, vec![Some(1), Some(0), Some(0)]);
        assert_eq!(report.columns["fafsa_received"].flagged_missing, 2);
    }

    #[test]
    fn absent_zero_fill_column_is_a_config_error() {
        let df = sample().drop("notes_count").unwrap();
        let mut report = AuditReport::default();
        match resolver().apply(df, &mut report) {
            Err(PipelineError::Config(message)) => {
                assert!(message.starts_with("missing_value_resolver:"), "{message}");
                assert!(message.contains("'notes_count'"), "{message}");
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn boolean_columns_cannot_be_zero_filled() {
        let series = Series::new("opted_in".into(), vec![Some(true), None]);
        assert!(matches!(
            zero_fill(&series),
            Err(PipelineError::UnsupportedFill { .. })
        ));
    }

    #[test]
    fn all_null_column_becomes_float_zeros() {
        let series = Series::new_null("email_opens".into(), 3);
        let (filled, rewritten) = zero_fill(&series).unwrap();
        assert_eq!(rewritten, 3);
        assert_eq!(filled.dtype(), &DataType::Float64);
        assert_eq!(filled.null_count(), 0);
    }
}
