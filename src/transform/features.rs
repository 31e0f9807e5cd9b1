//! Feature Deriver Module
//! Row-wise derived columns: event participation, distance, location,
//! student group, numeric coercion and the enrollment outcome label.

use crate::audit::AuditReport;
use crate::config::PipelineConfig;
use crate::data::{is_blank, DataProcessor};
use crate::error::{PipelineError, Result};
use crate::pipeline::{require_planned, Stage};
use crate::transform::geo::{haversine_miles, parse_postal_code, Coordinates, PostalCode, ZipGazetteer};
use crate::transform::groups::StudentGroupRules;
use polars::prelude::*;
use rayon::prelude::*;
use tracing::{info, warn};

const STAGE: &str = "feature_deriver";

pub const OUR_VISITS: &str = "our_visits";
pub const DISTANCE: &str = "distance";
pub const LOCATION: &str = "location";
pub const STUDENT_GROUP: &str = "student_group";
pub const ENROLLING_STAGE: &str = "enrolling_stage";

/// Columns this stage adds, in the order they are appended.
pub const DERIVED_COLUMNS: [&str; 5] = [OUR_VISITS, DISTANCE, LOCATION, STUDENT_GROUP, ENROLLING_STAGE];

/// Three-way residence category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    International = 0,
    Domestic = 1,
    InState = 2,
}

impl Location {
    /// International is decided first, so a foreign applicant whose region
    /// happens to equal the in-state code stays international.
    /// A missing or blank country is not the domestic country, so it is international.
    pub fn classify(
        country: Option<&str>,
        region: Option<&str>,
        domestic_country: &str,
        in_state_region: &str,
    ) -> Self {
        if country.map(str::trim) != Some(domestic_country) {
            return Location::International;
        }
        match region.map(str::trim) {
            Some(r) if r == in_state_region => Location::InState,
            _ => Location::Domestic,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Location::International),
            1 => Some(Location::Domestic),
            2 => Some(Location::InState),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Location::International => "international",
            Location::Domestic => "domestic",
            Location::InState => "in-state",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "international" => Some(Location::International),
            "domestic" => Some(Location::Domestic),
            "in-state" => Some(Location::InState),
            _ => None,
        }
    }
}

/// Case-sensitive substring match against any marker. Missing text never matches.
pub fn has_event_marker(events: Option<&str>, markers: &[String]) -> bool {
    events.is_some_and(|text| markers.iter().any(|marker| text.contains(marker.as_str())))
}

/// Terminal entry of a comma-separated, oldest-first decision log.
/// An empty terminal entry (trailing comma) is no decision.
pub fn last_decision(log: Option<&str>) -> Option<&str> {
    log?.split(',').last().map(str::trim).filter(|entry| !entry.is_empty())
}

/// 1 when the terminal decision equals `label` exactly, else 0.
pub fn enrollment_flag(log: Option<&str>, label: &str) -> i32 {
    match last_decision(log) {
        Some(decision) if decision == label => 1,
        _ => 0,
    }
}

/// Parse a text-stored number; thousands separators are ignored.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coerce a column to Float64. Returns the new series and the number of
/// non-blank values that failed to parse.
pub fn coerce_numeric(series: &Series) -> Result<(Series, usize)> {
    if series.dtype() == &DataType::String {
        let mut failures = 0;
        let values: Vec<Option<f64>> = series
            .str()?
            .into_iter()
            .map(|value| match value {
                Some(text) if !is_blank(Some(text)) => {
                    let parsed = parse_number(text);
                    if parsed.is_none() {
                        failures += 1;
                    }
                    parsed
                }
                _ => None,
            })
            .collect();
        return Ok((Series::new(series.name().clone(), values), failures));
    }

    if DataProcessor::is_numeric_dtype(series.dtype()) || series.dtype() == &DataType::Null {
        return Ok((series.cast(&DataType::Float64)?, 0));
    }

    let text = series.cast(&DataType::String)?;
    coerce_numeric(&text)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DistanceOutcome {
    Known(f64),
    Unknown,
    Invalid,
    Missing,
}

pub struct FeatureDeriver {
    events_column: String,
    event_markers: Vec<String>,
    postal_column: String,
    institution: Coordinates,
    gazetteer: ZipGazetteer,
    country_column: String,
    region_column: String,
    domestic_country: String,
    in_state_region: String,
    tags_column: String,
    group_rules: StudentGroupRules,
    numeric_columns: Vec<String>,
    decision_column: String,
    enrolled_label: String,
}

impl FeatureDeriver {
    /// Fails when the institutional postal code has no gazetteer entry.
    pub fn new(config: &PipelineConfig, gazetteer: ZipGazetteer) -> Result<Self> {
        let institution = match parse_postal_code(Some(&config.institution_postal_code)) {
            PostalCode::Valid(code) => gazetteer.get(&code),
            _ => None,
        }
        .ok_or_else(|| {
            PipelineError::Config(format!(
                "institution_postal_code '{}' is not in the postal gazetteer",
                config.institution_postal_code
            ))
        })?;

        Ok(Self {
            events_column: config.events_column.clone(),
            event_markers: config.event_markers.clone(),
            postal_column: config.postal_column.clone(),
            institution,
            gazetteer,
            country_column: config.country_column.clone(),
            region_column: config.region_column.clone(),
            domestic_country: config.domestic_country.clone(),
            in_state_region: config.in_state_region.clone(),
            tags_column: config.tags_column.clone(),
            group_rules: StudentGroupRules::new(
                config.student_group_rules.clone(),
                config.fallback_group,
            ),
            numeric_columns: config.numeric_columns.clone(),
            decision_column: config.decision_column.clone(),
            enrolled_label: config.enrolled_label.clone(),
        })
    }

    fn source_columns(&self) -> [&str; 6] {
        [
            self.events_column.as_str(),
            self.postal_column.as_str(),
            self.country_column.as_str(),
            self.region_column.as_str(),
            self.tags_column.as_str(),
            self.decision_column.as_str(),
        ]
    }

    fn missing_numeric_column(name: &str) -> PipelineError {
        PipelineError::Config(format!(
            "{STAGE}: numeric_columns names '{name}', which is not in the input schema"
        ))
    }

    fn text(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
        DataProcessor::text_values(DataProcessor::require(df, STAGE, name)?)
    }

    fn our_visits(&self, df: &DataFrame, report: &mut AuditReport) -> Result<Series> {
        let events = Self::text(df, &self.events_column)?;
        let flags: Vec<i32> = events
            .iter()
            .map(|e| has_event_marker(e.as_deref(), &self.event_markers) as i32)
            .collect();

        report.column(&self.events_column).defaulted +=
            events.iter().filter(|e| is_blank(e.as_deref())).count();
        Ok(Series::new(OUR_VISITS.into(), flags))
    }

    fn distance(&self, df: &DataFrame, report: &mut AuditReport) -> Result<Series> {
        let codes = Self::text(df, &self.postal_column)?;

        let outcomes: Vec<DistanceOutcome> = codes
            .par_iter()
            .map(|raw| match parse_postal_code(raw.as_deref()) {
                PostalCode::Valid(code) => match self.gazetteer.get(&code) {
                    Some(point) => DistanceOutcome::Known(haversine_miles(point, self.institution)),
                    None => DistanceOutcome::Unknown,
                },
                PostalCode::Invalid => DistanceOutcome::Invalid,
                PostalCode::Missing => DistanceOutcome::Missing,
            })
            .collect();

        let audit = report.column(&self.postal_column);
        for outcome in &outcomes {
            match outcome {
                DistanceOutcome::Unknown => audit.unknown_postal_codes += 1,
                DistanceOutcome::Invalid => audit.invalid_postal_codes += 1,
                DistanceOutcome::Missing => audit.defaulted += 1,
                DistanceOutcome::Known(_) => {}
            }
        }

        let miles: Vec<Option<f64>> = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                DistanceOutcome::Known(value) => Some(value),
                _ => None,
            })
            .collect();
        Ok(Series::new(DISTANCE.into(), miles))
    }

    fn location(&self, df: &DataFrame, report: &mut AuditReport) -> Result<Series> {
        let countries = Self::text(df, &self.country_column)?;
        let regions = Self::text(df, &self.region_column)?;

        let codes: Vec<i32> = countries
            .iter()
            .zip(&regions)
            .map(|(country, region)| {
                Location::classify(
                    country.as_deref(),
                    region.as_deref(),
                    &self.domestic_country,
                    &self.in_state_region,
                )
                .code()
            })
            .collect();

        report.column(&self.country_column).defaulted +=
            countries.iter().filter(|c| is_blank(c.as_deref())).count();
        Ok(Series::new(LOCATION.into(), codes))
    }

    fn student_group(&self, df: &DataFrame, report: &mut AuditReport) -> Result<Series> {
        let tags = Self::text(df, &self.tags_column)?;
        let groups: Vec<i32> = tags
            .iter()
            .map(|t| self.group_rules.classify(t.as_deref()))
            .collect();

        report.column(&self.tags_column).defaulted +=
            tags.iter().filter(|t| is_blank(t.as_deref())).count();
        Ok(Series::new(STUDENT_GROUP.into(), groups))
    }

    fn enrolling_stage(&self, df: &DataFrame, report: &mut AuditReport) -> Result<Series> {
        let logs = Self::text(df, &self.decision_column)?;
        let flags: Vec<i32> = logs
            .iter()
            .map(|log| enrollment_flag(log.as_deref(), &self.enrolled_label))
            .collect();

        report.column(&self.decision_column).defaulted += logs
            .iter()
            .filter(|log| last_decision(log.as_deref()).is_none())
            .count();
        Ok(Series::new(ENROLLING_STAGE.into(), flags))
    }
}

impl Stage for FeatureDeriver {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn plan(&self, schema: Vec<String>) -> Result<Vec<String>> {
        for source in self.source_columns() {
            require_planned(&schema, STAGE, source)?;
        }
        if let Some(missing) = self.numeric_columns.iter().find(|c| !schema.contains(c)) {
            return Err(Self::missing_numeric_column(missing));
        }

        let mut planned = schema;
        for derived in DERIVED_COLUMNS {
            if planned.iter().any(|name| name == derived) {
                return Err(PipelineError::ColumnExists {
                    stage: STAGE.to_string(),
                    column: derived.to_string(),
                });
            }
            planned.push(derived.to_string());
        }
        Ok(planned)
    }

    fn apply(&self, df: DataFrame, report: &mut AuditReport) -> Result<DataFrame> {
        for derived in DERIVED_COLUMNS {
            DataProcessor::ensure_absent(&df, STAGE, derived)?;
        }

        let mut df = df;
        let our_visits = self.our_visits(&df, report)?;
        let distance = self.distance(&df, report)?;
        let location = self.location(&df, report)?;
        let student_group = self.student_group(&df, report)?;

        let mut coercion_failures = 0;
        for name in &self.numeric_columns {
            let column = df
                .column(name)
                .map_err(|_| Self::missing_numeric_column(name))?;
            let (coerced, failures) = coerce_numeric(column.as_materialized_series())?;
            df.with_column(coerced)?;
            report.column(name).coercion_failures += failures;
            coercion_failures += failures;
        }

        let enrolling_stage = self.enrolling_stage(&df, report)?;

        for series in [our_visits, distance, location, student_group, enrolling_stage] {
            df.with_column(series)?;
        }

        let postal = report.column(&self.postal_column).clone();
        if postal.invalid_postal_codes + postal.unknown_postal_codes > 0 {
            warn!(
                invalid = postal.invalid_postal_codes,
                unknown = postal.unknown_postal_codes,
                "Postal codes without a distance"
            );
        }
        if coercion_failures > 0 {
            warn!(coercion_failures, "Text values that did not parse as numbers");
        }
        info!(derived = ?DERIVED_COLUMNS, coerced = self.numeric_columns.len(), "Derived features");
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        PipelineConfig::default().event_markers
    }

    #[test]
    fn event_markers_match_substrings() {
        let markers = markers();
        assert!(has_event_marker(Some("Virtual College Fair, Info Session"), &markers));
        assert!(has_event_marker(Some("HSV: Lake Forest High School"), &markers));
        assert!(!has_event_marker(Some("Info Session"), &markers));
        assert!(!has_event_marker(Some("college fair:"), &markers));
        assert!(!has_event_marker(None, &markers));
    }

    #[test]
    fn enrollment_uses_terminal_decision() {
        let label = "Deposit Paid (Enroll)";
        assert_eq!(enrollment_flag(Some("Applied, Admitted, Deposit Paid (Enroll)"), label), 1);
        assert_eq!(enrollment_flag(Some("Applied, Admitted, Denied"), label), 0);
        assert_eq!(enrollment_flag(Some("Deposit Paid (Enroll), Withdrawn"), label), 0);
        assert_eq!(enrollment_flag(Some("Admitted, Deposit Paid (Enroll),"), label), 0);
        assert_eq!(enrollment_flag(Some("Admitted,  Deposit Paid (Enroll) "), label), 1);
        assert_eq!(last_decision(Some("Applied, Admitted, ")), None);
        assert_eq!(enrollment_flag(Some(""), label), 0);
        assert_eq!(enrollment_flag(None, label), 0);
    }

    #[test]
    fn international_wins_over_region_match() {
        let classify = |country, region| Location::classify(country, region, "United States", "IL");
        assert_eq!(classify(Some("Canada"), Some("IL")), Location::International);
        assert_eq!(classify(Some("United States"), Some("IL")), Location::InState);
        assert_eq!(classify(Some("United States"), Some("WI")), Location::Domestic);
        assert_eq!(classify(Some(" United States "), Some("IL")), Location::InState);
        assert_eq!(classify(None, None), Location::International);
    }

    #[test]
    fn missing_country_is_never_in_state() {
        let classify = |country, region| Location::classify(country, region, "United States", "IL");
        assert_eq!(classify(None, Some("IL")), Location::International);
        assert_eq!(classify(Some(""), Some("IL")), Location::International);
        assert_eq!(classify(Some("   "), Some("IL")), Location::International);
    }

    #[test]
    fn location_label_round_trip() {
        for code in 0..3 {
            let location = Location::from_code(code).unwrap();
            let back = Location::from_label(location.label()).unwrap();
            assert_eq!(back.code(), code);
        }
        assert_eq!(Location::from_code(3), None);
    }

    #[test]
    fn numbers_parse_with_separators() {
        assert_eq!(parse_number(" 1,250 "), Some(1250.0));
        assert_eq!(parse_number("3.75"), Some(3.75));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn coercion_counts_failures_only_for_text() {
        let series = Series::new("gpa".into(), vec![Some("3.4"), Some("abc"), None, Some(" ")]);
        let (coerced, failures) = coerce_numeric(&series).unwrap();
        let values: Vec<Option<f64>> = coerced.f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(3.4), None, None, None]);
        assert_eq!(failures, 1);

        let ints = Series::new("ping_count".into(), vec![1i64, 2]);
        let (coerced, failures) = coerce_numeric(&ints).unwrap();
        assert_eq!(coerced.dtype(), &DataType::Float64);
        assert_eq!(failures, 0);
    }

    #[test]
    fn missing_numeric_column_error_names_the_stage() {
        let gazetteer = ZipGazetteer::from_entries([("60045", 42.2386, -87.8631)]);
        let deriver = FeatureDeriver::new(&PipelineConfig::default(), gazetteer).unwrap();
        let schema: Vec<String> = deriver.source_columns().iter().map(|c| c.to_string()).collect();
        match deriver.plan(schema) {
            Err(PipelineError::Config(message)) => {
                assert!(message.starts_with("feature_deriver:"), "{message}");
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_institution_code_is_a_config_error() {
        let gazetteer = ZipGazetteer::from_entries([("02134", 42.35, -71.12)]);
        let result = FeatureDeriver::new(&PipelineConfig::default(), gazetteer);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
