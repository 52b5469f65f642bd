use std::path::Path;

use tracing::{debug, info};

use crate::domain::{error::SeedError, models::InitialData};

/// Loads the initial-data document, dispatching on file extension.
/// Supported: `.json`, `.yaml`, `.yml`.
pub fn load_initial_data(path: &Path) -> Result<InitialData, SeedError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    debug!(
        "Loading initial data from {} (format: {})",
        path.display(),
        extension
    );

    let raw = std::fs::read_to_string(path).map_err(|e| {
        SeedError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })?;

    let data: InitialData = match extension.as_str() {
        "json" => serde_json::from_str(&raw).map_err(|e| {
            SeedError::Configuration(format!("malformed {}: {}", path.display(), e))
        })?,
        "yaml" | "yml" => serde_yaml::from_str(&raw).map_err(|e| {
            SeedError::Configuration(format!("malformed {}: {}", path.display(), e))
        })?,
        other => {
            return Err(SeedError::Configuration(format!(
                "unsupported initial data format '{}' for {}",
                other,
                path.display()
            )));
        }
    };

    info!(
        "Initial data loaded: {} countries, {} tax rates, {} shipping methods, {} payment methods, {} collections",
        data.countries.len(),
        data.tax_rates.len(),
        data.shipping_methods.len(),
        data.payment_methods.len(),
        data.collections.len()
    );
    Ok(data)
}
