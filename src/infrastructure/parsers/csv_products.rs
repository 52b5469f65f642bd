use std::collections::BTreeMap;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::{debug, info, warn};

use crate::domain::{
    error::SeedError,
    models::{ProductRecord, RowError},
};

use super::split_asset_list;

const ASSETS_COLUMN: &str = "assets";
const VARIANT_ASSETS_COLUMN: &str = "variantAssets";

/// Reads a product CSV into per-row records. An unreadable file or header is
/// fatal; a record that fails to parse becomes a per-row error and the rest
/// of the table is still processed. Row indices are 1-based, header excluded.
pub fn parse_products(path: &Path) -> Result<Vec<Result<ProductRecord, RowError>>, SeedError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| SeedError::Parse(format!("{}: {}", path.display(), e)))?;

    let headers = reader
        .headers()
        .map_err(|e| SeedError::Parse(format!("{}: bad header row: {}", path.display(), e)))?
        .clone();
    debug!("Product CSV headers: {:?}", headers);
    info!("Found {} columns in product CSV", headers.len());

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Malformed CSV record at row {}: {}", row, e);
                rows.push(Err(RowError {
                    row,
                    reason: format!("malformed record: {}", e),
                }));
                continue;
            }
        };

        let mut fields = BTreeMap::new();
        for (idx, field) in record.iter().enumerate() {
            if let Some(header) = headers.get(idx) {
                fields.insert(header.to_string(), field.to_string());
            }
        }

        let assets = fields
            .get(ASSETS_COLUMN)
            .map(|raw| split_asset_list(raw))
            .unwrap_or_default();
        let variant_assets = fields
            .get(VARIANT_ASSETS_COLUMN)
            .map(|raw| split_asset_list(raw))
            .unwrap_or_default();

        rows.push(Ok(ProductRecord {
            row,
            fields,
            assets,
            variant_assets,
        }));

        if row % 1000 == 0 {
            debug!("Parsed {} CSV rows", row);
        }
    }

    info!("Parsed {} rows from {}", rows.len(), path.display());
    Ok(rows)
}
