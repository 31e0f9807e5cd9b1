//! Final projection: drop columns superseded by derived features.

use crate::audit::AuditReport;
use crate::data::DataProcessor;
use crate::error::{PipelineError, Result};
use crate::pipeline::Stage;
use polars::prelude::*;
use tracing::{debug, info};

const STAGE: &str = "final_projector";

/// Drops the enumerated exclusion list. Must run after every derivation that
/// reads the excluded columns.
///
/// Applying the projector to its own output is a no-op; the requirement that
/// every excluded name exists is enforced by [`Stage::plan`] during pre-flight.
pub struct FinalProjector {
    excluded: Vec<String>,
}

impl FinalProjector {
    pub fn new(excluded: Vec<String>) -> Self {
        Self { excluded }
    }
}

impl Stage for FinalProjector {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn plan(&self, schema: Vec<String>) -> Result<Vec<String>> {
        if let Some(missing) = self.excluded.iter().find(|c| !schema.contains(c)) {
            return Err(PipelineError::Config(format!(
                "{STAGE}: excluded_columns names '{missing}', which is not in the input schema"
            )));
        }
        Ok(schema
            .into_iter()
            .filter(|name| !self.excluded.contains(name))
            .collect())
    }

    fn apply(&self, df: DataFrame, _report: &mut AuditReport) -> Result<DataFrame> {
        let (projected, removed) = DataProcessor::drop_present(&df, &self.excluded)?;
        if removed.len() < self.excluded.len() {
            debug!(
                requested = self.excluded.len(),
                removed = removed.len(),
                "Some excluded columns were already absent"
            );
        }
        info!(columns = projected.width(), "Projected model table");
        Ok(projected)
    }
}
