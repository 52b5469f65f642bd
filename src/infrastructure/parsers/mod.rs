pub mod csv_products;
pub mod xlsx_products;

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::{
    error::SeedError,
    models::{ProductRecord, RowError},
    ports::ProductSource,
};

/// Product table reader dispatching on file extension: `.csv` to the CSV
/// parser, `.xlsx`/`.xls` to the spreadsheet parser.
pub struct ProductFileSource {
    path: PathBuf,
}

impl ProductFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn file_type(&self) -> String {
        let file_type = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if file_type.is_empty() {
            warn!("No file extension on {}", self.path.display());
        }
        file_type
    }
}

#[async_trait]
impl ProductSource for ProductFileSource {
    async fn rows(&self) -> Result<Vec<Result<ProductRecord, RowError>>, SeedError> {
        let file_type = self.file_type();
        debug!(
            "Reading product table {} as {}",
            self.path.display(),
            file_type
        );
        match file_type.as_str() {
            "csv" => csv_products::parse_products(&self.path),
            "xlsx" | "xls" => xlsx_products::parse_products(&self.path),
            other => Err(SeedError::Configuration(format!(
                "unsupported product table format '{}' for {}",
                other,
                self.path.display()
            ))),
        }
    }
}

/// Splits a pipe-separated asset cell into filenames, dropping empties.
pub(crate) fn split_asset_list(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
