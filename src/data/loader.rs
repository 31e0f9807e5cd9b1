//! CSV Data Loader Module
//! Reads the admissions export and the postal gazetteer, writes the model table.

use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to read or write CSV: {0}")]
    CsvError(#[from] PolarsError),
    #[error("Failed to open output file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("No data loaded")]
    NoData,
}

/// Loads the raw export once and hands it to the pipeline.
pub struct DataLoader {
    df: Option<DataFrame>,
    file_path: Option<PathBuf>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            df: None,
            file_path: None,
        }
    }

    /// Load a CSV export using Polars. Cells that fail type inference become null.
    pub fn load_csv(&mut self, file_path: impl AsRef<Path>) -> Result<&DataFrame, LoaderError> {
        self.load_csv_with_text_columns(file_path, |_| false)
    }

    /// Like [`DataLoader::load_csv`], but columns whose header satisfies
    /// `keep_as_text` are read as strings instead of inferred.
    pub fn load_csv_with_text_columns<F>(
        &mut self,
        file_path: impl AsRef<Path>,
        keep_as_text: F,
    ) -> Result<&DataFrame, LoaderError>
    where
        F: Fn(&str) -> bool,
    {
        let path = file_path.as_ref();
        self.file_path = Some(path.to_path_buf());

        let df = LazyCsvReader::new(path)
            .with_infer_schema_length(Some(10000))
            .with_ignore_errors(true)
            .with_schema_modify(|schema: Schema| {
                Ok(schema
                    .into_iter()
                    .map(|(name, dtype)| {
                        if keep_as_text(name.as_str()) {
                            (name, DataType::String)
                        } else {
                            (name, dtype)
                        }
                    })
                    .collect::<Schema>())
            })?
            .finish()?
            .collect()?;

        info!(
            path = %path.display(),
            rows = df.height(),
            columns = df.width(),
            "Loaded export"
        );

        self.df = Some(df);
        self.df.as_ref().ok_or(LoaderError::NoData)
    }

    /// Get list of column names from loaded DataFrame.
    pub fn get_columns(&self) -> Vec<String> {
        self.df
            .as_ref()
            .map(|df| {
                df.get_column_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get the number of rows in the DataFrame.
    pub fn get_row_count(&self) -> usize {
        self.df.as_ref().map(|df| df.height()).unwrap_or(0)
    }

    /// Get file path.
    pub fn get_file_path(&self) -> Option<&PathBuf> {
        self.file_path.as_ref()
    }

    /// Move the loaded DataFrame out of the loader.
    pub fn take_dataframe(&mut self) -> Result<DataFrame, LoaderError> {
        self.df.take().ok_or(LoaderError::NoData)
    }

    /// Read a delimited file with every cell kept as text.
    /// `.txt` and `.tsv` files are read as tab-separated.
    pub fn load_text_table(file_path: impl AsRef<Path>) -> Result<DataFrame, LoaderError> {
        let path = file_path.as_ref();
        let separator = match path.extension().and_then(|ext| ext.to_str()) {
            Some("txt") | Some("tsv") => b'\t',
            _ => b',',
        };

        let df = LazyCsvReader::new(path)
            .with_separator(separator)
            .with_infer_schema_length(Some(0))
            .finish()?
            .collect()?;
        Ok(df)
    }

    /// Write the final table as CSV with a header row.
    pub fn write_csv(df: &mut DataFrame, file_path: impl AsRef<Path>) -> Result<(), LoaderError> {
        let path = file_path.as_ref();
        let mut file = std::fs::File::create(path)?;
        CsvWriter::new(&mut file).include_header(true).finish(df)?;

        info!(
            path = %path.display(),
            rows = df.height(),
            columns = df.width(),
            "Wrote model table"
        );
        Ok(())
    }
}
