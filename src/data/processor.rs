//! Data Processor Module
//! Column-level helpers shared by the pipeline stages.

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::collections::HashSet;

/// Column access and projection helpers over a `DataFrame`.
pub struct DataProcessor;

impl DataProcessor {
    /// Column names in table order.
    pub fn column_names(df: &DataFrame) -> Vec<String> {
        df.get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// True for the integer and floating point dtypes.
    pub fn is_numeric_dtype(dtype: &DataType) -> bool {
        matches!(
            dtype,
            DataType::Float32
                | DataType::Float64
                | DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
        )
    }

    /// Look up a column a stage depends on, failing with a schema error.
    pub fn require<'a>(df: &'a DataFrame, stage: &str, name: &str) -> Result<&'a Column> {
        df.column(name)
            .map_err(|_| PipelineError::schema(stage, name))
    }

    /// Fail if a stage would create a column that already exists.
    pub fn ensure_absent(df: &DataFrame, stage: &str, name: &str) -> Result<()> {
        if df.column(name).is_ok() {
            return Err(PipelineError::ColumnExists {
                stage: stage.to_string(),
                column: name.to_string(),
            });
        }
        Ok(())
    }

    /// Read any column as optional text, one entry per row.
    pub fn text_values(column: &Column) -> Result<Vec<Option<String>>> {
        let as_text = column.cast(&DataType::String)?;
        let ca = as_text.str()?;
        Ok(ca.into_iter().map(|v| v.map(|s| s.to_string())).collect())
    }

    /// Keep only the columns whose name passes `keep`, preserving order.
    /// Returns the projected table and the names that were removed.
    pub fn retain_columns<F>(df: &DataFrame, keep: F) -> Result<(DataFrame, Vec<String>)>
    where
        F: Fn(&str) -> bool,
    {
        let mut kept = Vec::with_capacity(df.width());
        let mut removed = Vec::new();

        for column in df.get_columns() {
            if keep(column.name().as_str()) {
                kept.push(column.clone());
            } else {
                removed.push(column.name().to_string());
            }
        }

        Ok((DataFrame::new(kept)?, removed))
    }

    /// Drop every listed column that is present; absent names are ignored.
    pub fn drop_present(df: &DataFrame, names: &[String]) -> Result<(DataFrame, Vec<String>)> {
        let targets: HashSet<&str> = names.iter().map(|s| s.as_str()).collect();
        Self::retain_columns(df, |name| !targets.contains(name))
    }

    /// Replace the column `target` with `replacements`, at the same position.
    pub fn replace_column(
        df: &DataFrame,
        target: &str,
        replacements: Vec<Column>,
    ) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(df.width() + replacements.len());
        let mut pending = Some(replacements);

        for column in df.get_columns() {
            if column.name().as_str() == target {
                if let Some(new_columns) = pending.take() {
                    columns.extend(new_columns);
                }
            } else {
                columns.push(column.clone());
            }
        }

        if pending.is_some() {
            return Err(PipelineError::Polars(PolarsError::ColumnNotFound(
                target.to_string().into(),
            )));
        }

        Ok(DataFrame::new(columns)?)
    }
}

/// True for missing values and text that is empty after trimming.
pub fn is_blank(value: Option<&str>) -> bool {
    value.map(|s| s.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        DataFrame::new(vec![
            Column::new("a".into(), vec![1i64, 2]),
            Column::new("b".into(), vec!["x", "y"]),
            Column::new("c".into(), vec![Some(1.5f64), None]),
        ])
        .unwrap()
    }

    #[test]
    fn replace_column_keeps_position() {
        let df = sample();
        let out = DataProcessor::replace_column(
            &df,
            "b",
            vec![
                Column::new("b1".into(), vec!["x1", "y1"]),
                Column::new("b2".into(), vec!["x2", "y2"]),
            ],
        )
        .unwrap();
        assert_eq!(DataProcessor::column_names(&out), vec!["a", "b1", "b2", "c"]);
    }

    #[test]
    fn drop_present_ignores_absent_names() {
        let df = sample();
        let (out, removed) =
            DataProcessor::drop_present(&df, &["c".to_string(), "zzz".to_string()]).unwrap();
        assert_eq!(DataProcessor::column_names(&out), vec!["a", "b"]);
        assert_eq!(removed, vec!["c"]);
    }

    #[test]
    fn text_values_reads_numbers_and_nulls() {
        let df = sample();
        let values = DataProcessor::text_values(df.column("c").unwrap()).unwrap();
        assert_eq!(values, vec![Some("1.5".to_string()), None]);
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some("   ")));
        assert!(!is_blank(Some(" a ")));
    }
}
