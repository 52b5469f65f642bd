use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::error::SeedError;

/// Languages the store accepts as a catalog default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    En,
    Es,
    De,
    Fr,
    It,
    Pt,
    Nl,
    Ja,
    Zh,
}

impl Default for LanguageCode {
    fn default() -> Self {
        LanguageCode::En
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    pub code: String,
    pub name: String,
    pub zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRate {
    pub name: String,
    pub percentage: f64,
}

/// Price is in minor units (e.g. cents).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMethod {
    pub name: String,
    pub price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub name: String,
    pub handler_code: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionFilter {
    pub code: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDef {
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub filters: Vec<CollectionFilter>,
}

/// Baseline reference data required before products can be imported.
///
/// Collections reference each other by `parentName`, forming a forest; the
/// document is rejected before bootstrap if a parent is missing or the
/// references form a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialData {
    #[serde(default)]
    pub default_language: LanguageCode,
    pub default_zone: String,
    #[serde(default)]
    pub countries: Vec<Country>,
    #[serde(default)]
    pub tax_rates: Vec<TaxRate>,
    #[serde(default)]
    pub shipping_methods: Vec<ShippingMethod>,
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
    #[serde(default)]
    pub collections: Vec<CollectionDef>,
}

impl InitialData {
    /// Distinct zone names in first-appearance order, default zone first.
    /// Zones are created before the countries that reference them.
    pub fn zone_names(&self) -> Vec<String> {
        let mut zones = vec![self.default_zone.clone()];
        for country in &self.countries {
            if !zones.contains(&country.zone) {
                zones.push(country.zone.clone());
            }
        }
        zones
    }

    /// Validates the whole document. Runs before any store instance is
    /// acquired; a violation here means zero creation calls are issued.
    pub fn validate(&self) -> Result<(), SeedError> {
        if self.default_zone.trim().is_empty() {
            return Err(SeedError::Configuration(
                "defaultZone must not be empty".to_string(),
            ));
        }

        let code_re = Regex::new(r"^[A-Z]{2}$")
            .map_err(|e| SeedError::Configuration(e.to_string()))?;
        let slug_re = Regex::new(r"^[a-z0-9][a-z0-9-]*$")
            .map_err(|e| SeedError::Configuration(e.to_string()))?;

        let mut codes = HashSet::new();
        for country in &self.countries {
            if !code_re.is_match(&country.code) {
                return Err(SeedError::Configuration(format!(
                    "country '{}' has invalid ISO code '{}'",
                    country.name, country.code
                )));
            }
            if country.zone.trim().is_empty() {
                return Err(SeedError::Configuration(format!(
                    "country '{}' has an empty zone",
                    country.code
                )));
            }
            if !codes.insert(country.code.as_str()) {
                return Err(SeedError::Configuration(format!(
                    "duplicate country code '{}'",
                    country.code
                )));
            }
        }

        for rate in &self.tax_rates {
            if !(0.0..=100.0).contains(&rate.percentage) {
                return Err(SeedError::Configuration(format!(
                    "tax rate '{}' has percentage {} outside 0..=100",
                    rate.name, rate.percentage
                )));
            }
        }

        for method in &self.shipping_methods {
            if method.price < 0 {
                return Err(SeedError::Configuration(format!(
                    "shipping method '{}' has negative price {}",
                    method.name, method.price
                )));
            }
        }

        let mut slugs = HashSet::new();
        for collection in &self.collections {
            if !slug_re.is_match(&collection.slug) {
                return Err(SeedError::Configuration(format!(
                    "collection '{}' has invalid slug '{}'",
                    collection.name, collection.slug
                )));
            }
            if !slugs.insert(collection.slug.as_str()) {
                return Err(SeedError::Configuration(format!(
                    "duplicate collection slug '{}'",
                    collection.slug
                )));
            }
        }

        self.collection_seed_order().map(|_| ())
    }

    /// A creation order for the collection forest in which every parent comes
    /// strictly before its children. Document order is preserved among
    /// collections whose parents are already placed. Fails on duplicate
    /// names, unknown parents and parent cycles.
    pub fn collection_seed_order(&self) -> Result<Vec<&CollectionDef>, SeedError> {
        let mut names = HashSet::new();
        for collection in &self.collections {
            if !names.insert(collection.name.as_str()) {
                return Err(SeedError::Configuration(format!(
                    "duplicate collection name '{}'",
                    collection.name
                )));
            }
        }

        let mut placed: HashSet<&str> = HashSet::new();
        let mut order: Vec<&CollectionDef> = Vec::with_capacity(self.collections.len());
        while order.len() < self.collections.len() {
            let before = order.len();
            for collection in &self.collections {
                if placed.contains(collection.name.as_str()) {
                    continue;
                }
                match collection.parent_name.as_deref() {
                    None => {
                        placed.insert(collection.name.as_str());
                        order.push(collection);
                    }
                    Some(parent) if !names.contains(parent) => {
                        return Err(SeedError::Configuration(format!(
                            "collection '{}' references unknown parent '{}'",
                            collection.name, parent
                        )));
                    }
                    Some(parent) if placed.contains(parent) => {
                        placed.insert(collection.name.as_str());
                        order.push(collection);
                    }
                    Some(_) => {}
                }
            }
            if order.len() == before {
                let stuck = self
                    .collections
                    .iter()
                    .find(|c| !placed.contains(c.name.as_str()))
                    .map(|c| c.name.as_str())
                    .unwrap_or("?");
                return Err(SeedError::Configuration(format!(
                    "collection parent references form a cycle involving '{}'",
                    stuck
                )));
            }
        }
        Ok(order)
    }
}

/// One product-table row, lifted into a shape the importer understands.
///
/// The row schema belongs to the store's catalog importer; the parsers only
/// pull out the asset columns (pipe-separated filenames) so the pipeline can
/// resolve them against the asset directory. `row` is the 1-based data row
/// index, header row excluded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub row: usize,
    pub fields: BTreeMap<String, String>,
    pub assets: Vec<String>,
    pub variant_assets: Vec<String>,
}

/// A recoverable failure scoped to a single product row.
#[derive(Debug, Clone, Error)]
#[error("row {row}: {reason}")]
pub struct RowError {
    pub row: usize,
    pub reason: String,
}

/// Whether a creation call actually created the entity or found it already
/// present under its natural key (country code, tax-rate name, slug, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Immutable configuration for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct SeedRunConfig {
    pub initial_data: InitialData,
    pub products_path: PathBuf,
    pub assets_dir: Option<PathBuf>,
    pub channel_token: Option<String>,
    pub import_concurrency: usize,
    pub shutdown_grace: Duration,
}

impl SeedRunConfig {
    pub fn new(initial_data: InitialData, products_path: impl Into<PathBuf>) -> Self {
        Self {
            initial_data,
            products_path: products_path.into(),
            assets_dir: None,
            channel_token: None,
            import_concurrency: 4,
            shutdown_grace: Duration::from_secs(10),
        }
    }

    pub fn effective_concurrency(&self) -> usize {
        self.import_concurrency.max(1)
    }
}

/// Recognized knobs for the external bootstrap, passed through to the
/// concrete adapter. None of these affect pipeline correctness.
#[derive(Debug, Clone, Default)]
pub struct BootstrapOptions {
    pub port: Option<u16>,
    pub logger_level: Option<String>,
    /// Plugin identifiers to omit during a seed run, so collection creation
    /// does not fan out background jobs on the store side.
    pub excluded_plugins: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateTally {
    pub created: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl CreateTally {
    pub fn apply(&mut self, outcome: CreateOutcome) {
        match outcome {
            CreateOutcome::Created => self.created += 1,
            CreateOutcome::AlreadyExists => self.skipped += 1,
        }
    }
}

impl std::fmt::Display for CreateTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} skipped, {} failed",
            self.created, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct CategoryCounts {
    pub zones: CreateTally,
    pub countries: CreateTally,
    pub tax_rates: CreateTally,
    pub shipping_methods: CreateTally,
    pub payment_methods: CreateTally,
    pub collections: CreateTally,
    pub products: CreateTally,
}

impl CategoryCounts {
    pub fn total_created(&self) -> u64 {
        self.zones.created
            + self.countries.created
            + self.tax_rates.created
            + self.shipping_methods.created
            + self.payment_methods.created
            + self.collections.created
            + self.products.created
    }
}

/// Where the run currently is. `Failed` is reachable from every phase after
/// `NotStarted`, and always via `ShuttingDown` once an instance was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPhase {
    NotStarted,
    Bootstrapping,
    SeedingReferenceData,
    ImportingProducts,
    ShuttingDown,
    Completed,
    Failed,
}

impl std::fmt::Display for SeedPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SeedPhase::NotStarted => "not-started",
            SeedPhase::Bootstrapping => "bootstrapping",
            SeedPhase::SeedingReferenceData => "seeding-reference-data",
            SeedPhase::ImportingProducts => "importing-products",
            SeedPhase::ShuttingDown => "shutting-down",
            SeedPhase::Completed => "completed",
            SeedPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a run that made it through shutdown without a fatal error.
/// `row_errors` non-empty means partial success; the caller owns the
/// tolerance policy.
#[derive(Debug, Clone)]
pub struct SeedReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: CategoryCounts,
    pub row_errors: Vec<RowError>,
    pub shutdown_warning: Option<String>,
}
