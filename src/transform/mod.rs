//! Transform module - one file per pipeline stage

pub mod features;
pub mod geo;
pub mod groups;
pub mod missing;
pub mod names;
pub mod projector;
pub mod split;

pub use features::{FeatureDeriver, Location, DERIVED_COLUMNS};
pub use geo::{haversine_miles, Coordinates, ZipGazetteer};
pub use groups::StudentGroupRules;
pub use missing::MissingValueResolver;
pub use names::{canonical_name, ColumnPruner, NameNormalizer};
pub use projector::FinalProjector;
pub use split::FieldSplitter;
