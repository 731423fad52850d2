//! Flat organization lists from CSV files

use std::path::Path;

/// Loads a file into one flat sequence of raw values
pub trait FlatListLoader: Send + Sync {
    /// Every cell of every row, row-major, unnormalized
    fn load_flat_list(&self, path: &Path) -> Result<Vec<String>, csv::Error>;
}

/// Reads CSV files with no header row and any number of columns per row
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFileLoader;

impl FlatListLoader for CsvFileLoader {
    fn load_flat_list(&self, path: &Path) -> Result<Vec<String>, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut values = Vec::new();
        for record in reader.records() {
            values.extend(record?.iter().map(str::to_string));
        }
        Ok(values)
    }
}
