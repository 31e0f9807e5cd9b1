//! Postal-code centroids and great-circle distance.

use crate::data::{DataLoader, DataProcessor};
use crate::error::{PipelineError, Result};
use crate::transform::names::canonical_name;
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Mean Earth radius in statute miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

const CODE_HEADERS: [&str; 5] = ["zip", "zipcode", "zip_code", "postal_code", "geoid"];
const LAT_HEADERS: [&str; 3] = ["lat", "latitude", "intptlat"];
const LON_HEADERS: [&str; 4] = ["lon", "lng", "longitude", "intptlong"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Haversine distance between two points, in miles.
pub fn haversine_miles(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().min(1.0).asin()
}

/// Outcome of reading one applicant postal code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostalCode {
    Valid(String),
    Invalid,
    Missing,
}

/// Five-digit code from raw text. ZIP+4 keeps its first five digits;
/// three- and four-digit values (leading zeros lost to numeric storage) are padded.
pub fn parse_postal_code(raw: Option<&str>) -> PostalCode {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return PostalCode::Missing;
    };

    let base = match text.split_once('-') {
        Some((head, tail)) if tail.len() == 4 && tail.bytes().all(|b| b.is_ascii_digit()) => head,
        Some(_) => return PostalCode::Invalid,
        None => text,
    };

    if !(3..=5).contains(&base.len()) || !base.bytes().all(|b| b.is_ascii_digit()) {
        return PostalCode::Invalid;
    }
    PostalCode::Valid(format!("{base:0>5}"))
}

fn find_column<'a>(
    headers: &[(String, &'a Column)],
    candidates: &[&str],
    role: &str,
) -> Result<&'a Column> {
    headers
        .iter()
        .find(|(name, _)| candidates.contains(&name.as_str()))
        .map(|(_, column)| *column)
        .ok_or_else(|| {
            PipelineError::Gazetteer(format!(
                "no {role} column (expected one of {})",
                candidates.join(", ")
            ))
        })
}

/// Lookup table from five-digit postal code to its representative point.
#[derive(Debug, Clone, Default)]
pub struct ZipGazetteer {
    points: HashMap<String, Coordinates>,
}

impl ZipGazetteer {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64, f64)>,
        S: Into<String>,
    {
        let points = entries
            .into_iter()
            .map(|(code, lat, lon)| (code.into(), Coordinates { lat, lon }))
            .collect();
        Self { points }
    }

    /// Load a centroid file such as the Census ZCTA gazetteer.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let table = DataLoader::load_text_table(path)?;
        let gazetteer = Self::from_table(&table)?;
        info!(path = %path.display(), codes = gazetteer.len(), "Loaded postal gazetteer");
        Ok(gazetteer)
    }

    /// Build from a text table. Header names are matched after canonical
    /// renaming; rows with unparseable codes or coordinates are skipped.
    pub fn from_table(table: &DataFrame) -> Result<Self> {
        let headers: Vec<(String, &Column)> = table
            .get_columns()
            .iter()
            .map(|c| (canonical_name(c.name().as_str()), c))
            .collect();

        let codes = DataProcessor::text_values(find_column(&headers, &CODE_HEADERS, "postal code")?)?;
        let lats = DataProcessor::text_values(find_column(&headers, &LAT_HEADERS, "latitude")?)?;
        let lons = DataProcessor::text_values(find_column(&headers, &LON_HEADERS, "longitude")?)?;

        let mut points = HashMap::with_capacity(codes.len());
        let mut skipped = 0usize;

        for ((code, lat), lon) in codes.iter().zip(&lats).zip(&lons) {
            let parsed = (
                parse_postal_code(code.as_deref()),
                lat.as_deref().and_then(|v| v.trim().parse::<f64>().ok()),
                lon.as_deref().and_then(|v| v.trim().parse::<f64>().ok()),
            );
            match parsed {
                (PostalCode::Valid(code), Some(lat), Some(lon))
                    if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) =>
                {
                    points.insert(code, Coordinates { lat, lon });
                }
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(skipped, "Skipped unusable gazetteer rows");
        }
        if points.is_empty() {
            return Err(PipelineError::Gazetteer(
                "gazetteer contains no usable rows".to_string(),
            ));
        }
        Ok(Self { points })
    }

    pub fn get(&self, code: &str) -> Option<Coordinates> {
        self.points.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
