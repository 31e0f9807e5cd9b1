//! Data module - CSV loading and column helpers

mod loader;
mod processor;

pub use loader::{DataLoader, LoaderError};
pub use processor::{is_blank, DataProcessor};
