//! Pipeline Runner Module
//! Applies the ordered stage list to an owned table, after checking the
//! whole plan against the input schema.

use crate::audit::AuditReport;
use crate::config::PipelineConfig;
use crate::data::DataProcessor;
use crate::error::{PipelineError, Result};
use crate::transform::{
    ColumnPruner, FeatureDeriver, FieldSplitter, FinalProjector, MissingValueResolver,
    NameNormalizer, ZipGazetteer,
};
use polars::prelude::*;
use tracing::{error, info};

/// One pure table-to-table step.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Column names after this stage, given the names before it.
    /// Fails with the same error `apply` would raise for a missing column.
    fn plan(&self, schema: Vec<String>) -> Result<Vec<String>>;

    fn apply(&self, df: DataFrame, report: &mut AuditReport) -> Result<DataFrame>;
}

/// Schema error unless `column` is in the planned schema.
pub(crate) fn require_planned(schema: &[String], stage: &str, column: &str) -> Result<()> {
    if schema.iter().any(|name| name == column) {
        Ok(())
    } else {
        Err(PipelineError::schema(stage, column))
    }
}

/// Final table plus the audit collected while producing it.
#[derive(Debug)]
pub struct PipelineOutput {
    pub table: DataFrame,
    pub report: AuditReport,
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Normalizer, Pruner, Resolver, Splitter, Deriver, Projector.
    pub fn new(config: &PipelineConfig, gazetteer: ZipGazetteer) -> Result<Self> {
        config.validate()?;

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(NameNormalizer),
            Box::new(ColumnPruner::new(
                config.pruned_substring.clone(),
                config.pruned_columns.clone(),
            )),
            Box::new(MissingValueResolver::new(
                config.zero_fill_columns.clone(),
                config.fafsa_column.clone(),
            )),
            Box::new(FieldSplitter::new(
                config.round_column.clone(),
                config.year_column.clone(),
                config.period_column.clone(),
            )),
            Box::new(FeatureDeriver::new(config, gazetteer)?),
            Box::new(FinalProjector::new(config.excluded_columns.clone())),
        ];
        Ok(Self::from_stages(stages))
    }

    pub fn from_stages(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Walk the plan over raw column names without touching any row.
    /// Returns the column names the run will produce.
    pub fn preflight(&self, columns: &[String]) -> Result<Vec<String>> {
        self.stages
            .iter()
            .try_fold(columns.to_vec(), |schema, stage| stage.plan(schema))
    }

    pub fn run(&self, df: DataFrame) -> Result<PipelineOutput> {
        let input_rows = df.height();
        let planned = self.preflight(&DataProcessor::column_names(&df))?;
        let mut report = AuditReport::new(input_rows);

        let mut table = df;
        for stage in &self.stages {
            let before = DataProcessor::column_names(&table);
            table = stage.apply(table, &mut report).map_err(|err| {
                error!(stage = stage.name(), error = %err, "Stage failed");
                err
            })?;

            if table.height() != input_rows {
                return Err(PipelineError::RowCountChanged {
                    stage: stage.name().to_string(),
                    before: input_rows,
                    after: table.height(),
                });
            }

            let after = DataProcessor::column_names(&table);
            info!(
                stage = stage.name(),
                rows = table.height(),
                columns = after.len(),
                "Stage complete"
            );
            report.record_stage(stage.name(), &before, &after);
        }

        report.output_rows = table.height();
        report.output_columns = DataProcessor::column_names(&table);
        debug_assert_eq!(report.output_columns, planned);

        for (column, audit) in report.touched_columns() {
            info!(
                column = %column,
                imputed = audit.imputed,
                flagged_missing = audit.flagged_missing,
                coercion_failures = audit.coercion_failures,
                invalid_postal_codes = audit.invalid_postal_codes,
                unknown_postal_codes = audit.unknown_postal_codes,
                defaulted = audit.defaulted,
                "Row-level corrections"
            );
        }

        Ok(PipelineOutput { table, report })
    }
}
