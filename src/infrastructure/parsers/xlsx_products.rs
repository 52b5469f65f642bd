use std::collections::BTreeMap;
use std::path::Path;

use calamine::{open_workbook_auto, DataType, Reader};
use tracing::{debug, info};

use crate::domain::{
    error::SeedError,
    models::{ProductRecord, RowError},
};

use super::split_asset_list;

/// Reads a product spreadsheet (first worksheet, first row as headers) into
/// per-row records. Cell typing means rows cannot individually fail here;
/// the per-row error slot exists for parity with the CSV parser.
pub fn parse_products(path: &Path) -> Result<Vec<Result<ProductRecord, RowError>>, SeedError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| SeedError::Parse(format!("{}: {}", path.display(), e)))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SeedError::Parse(format!("{}: workbook has no sheets", path.display())))?;
    debug!("Reading worksheet '{}'", sheet);

    let range = workbook
        .worksheet_range(&sheet)
        .ok_or_else(|| SeedError::Parse(format!("{}: worksheet '{}' missing", path.display(), sheet)))?
        .map_err(|e| SeedError::Parse(format!("{}: {}", path.display(), e)))?;

    let mut cells = range.rows();
    let headers: Vec<String> = match cells.next() {
        Some(header_row) => header_row.iter().map(cell_text).collect(),
        None => {
            info!("Worksheet '{}' is empty", sheet);
            return Ok(Vec::new());
        }
    };
    info!("Found {} columns in worksheet '{}'", headers.len(), sheet);

    let mut rows = Vec::new();
    for (i, row_cells) in cells.enumerate() {
        let row = i + 1;
        let mut fields = BTreeMap::new();
        for (idx, cell) in row_cells.iter().enumerate() {
            if let Some(header) = headers.get(idx) {
                fields.insert(header.clone(), cell_text(cell));
            }
        }

        let assets = fields
            .get("assets")
            .map(|raw| split_asset_list(raw))
            .unwrap_or_default();
        let variant_assets = fields
            .get("variantAssets")
            .map(|raw| split_asset_list(raw))
            .unwrap_or_default();

        rows.push(Ok(ProductRecord {
            row,
            fields,
            assets,
            variant_assets,
        }));
    }

    info!("Parsed {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Spreadsheet cells are typed; flatten them to the strings the importer
/// expects, without a trailing `.0` on whole numbers.
fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::Empty => String::new(),
        DataType::String(s) => s.trim().to_string(),
        DataType::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}
