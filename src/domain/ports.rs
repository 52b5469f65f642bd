use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    error::SeedError,
    models::{
        CollectionDef, Country, CreateOutcome, PaymentMethod, ProductRecord, RowError,
        ShippingMethod, TaxRate,
    },
};

/// Acquires one running store instance. The pipeline calls this exactly once
/// per run and releases the returned handle exactly once, on every exit path.
#[async_trait]
pub trait StoreBootstrap: Send + Sync {
    async fn bootstrap(&self) -> Result<Arc<dyn StoreHandle>, SeedError>;
}

/// A running store instance.
///
/// Creation calls are idempotent under the entity's natural key: attempting
/// to create something that already exists returns
/// `CreateOutcome::AlreadyExists`, not an error. `create_collection` returns
/// `SeedError::ReferenceData` when the named parent cannot be resolved on the
/// store side; the pipeline treats that as structural and fatal, and any
/// other per-entity error as skippable.
#[async_trait]
pub trait StoreHandle: Send + Sync {
    async fn create_zone(&self, name: &str) -> Result<CreateOutcome, SeedError>;

    async fn create_country(&self, country: &Country) -> Result<CreateOutcome, SeedError>;

    async fn create_tax_rate(&self, rate: &TaxRate) -> Result<CreateOutcome, SeedError>;

    async fn create_shipping_method(
        &self,
        method: &ShippingMethod,
    ) -> Result<CreateOutcome, SeedError>;

    async fn create_payment_method(
        &self,
        method: &PaymentMethod,
    ) -> Result<CreateOutcome, SeedError>;

    async fn create_collection(
        &self,
        collection: &CollectionDef,
    ) -> Result<CreateOutcome, SeedError>;

    /// Creates or updates one product and its variants from a table row.
    async fn import_product(&self, product: &ProductRecord) -> Result<CreateOutcome, SeedError>;

    /// Associates every entity created through this handle during the run
    /// with the given channel. Returns the number of associations made.
    async fn assign_to_channel(&self, channel_token: &str) -> Result<u64, SeedError>;

    /// Releases the instance. Must be safe to call once per handle; the
    /// pipeline guarantees it is.
    async fn close(&self) -> Result<(), SeedError>;
}

/// Supplies product rows from the table file. The outer error means the
/// table itself is unreadable (fatal); an inner error is one malformed row
/// (recoverable, never aborts the batch).
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn rows(&self) -> Result<Vec<Result<ProductRecord, RowError>>, SeedError>;
}

/// Resolves asset filenames referenced by product rows against a local
/// directory. A missing file is a per-row error, surfaced as `Err` here.
pub trait AssetStore: Send + Sync {
    fn resolve(&self, filename: &str) -> Result<PathBuf, SeedError>;
}
