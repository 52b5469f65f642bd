use std::sync::Arc;

use chrono::Utc;
use futures_util::{stream, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{
    error::SeedError,
    models::{
        CategoryCounts, CreateOutcome, CreateTally, ProductRecord, RowError, SeedPhase,
        SeedReport, SeedRunConfig,
    },
    ports::{AssetStore, ProductSource, StoreBootstrap, StoreHandle},
};

enum RowOutcome {
    Imported(CreateOutcome),
    Failed(RowError),
}

/// Drives one store instance through reference-data seeding and bulk product
/// import, then releases it regardless of outcome.
///
/// Fatal errors come back as `Err` (the instance has already been shut down
/// by then); per-row failures are collected into the report and never abort
/// the batch.
pub struct SeedService {
    bootstrap: Arc<dyn StoreBootstrap>,
    products: Arc<dyn ProductSource>,
    assets: Option<Arc<dyn AssetStore>>,
}

impl SeedService {
    pub fn new(
        bootstrap: Arc<dyn StoreBootstrap>,
        products: Arc<dyn ProductSource>,
        assets: Option<Arc<dyn AssetStore>>,
    ) -> Self {
        Self {
            bootstrap,
            products,
            assets,
        }
    }

    pub async fn run(&self, config: &SeedRunConfig) -> Result<SeedReport, SeedError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut phase = SeedPhase::NotStarted;
        info!("Starting seed run {}", run_id);

        // Fail fast on a malformed document: no instance is acquired and no
        // creation calls are issued.
        debug!("Validating initial data document");
        config.initial_data.validate().map_err(|e| {
            error!("Initial data document rejected: {}", e);
            e
        })?;

        transition(&mut phase, SeedPhase::Bootstrapping);
        let handle = self.bootstrap.bootstrap().await.map_err(|e| {
            error!("Failed to bootstrap store instance: {}", e);
            e
        })?;
        info!("Store instance acquired");

        let mut counts = CategoryCounts::default();
        let mut row_errors = Vec::new();

        // From here on the handle is released exactly once, whatever happens.
        let verdict = tokio::select! {
            res = self.populate(handle.as_ref(), config, &mut phase, &mut counts, &mut row_errors) => res,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupt received, aborting seed run {}", run_id);
                Err(SeedError::Aborted)
            }
        };

        transition(&mut phase, SeedPhase::ShuttingDown);
        let shutdown_warning =
            match tokio::time::timeout(config.shutdown_grace, handle.close()).await {
                Ok(Ok(())) => {
                    info!("Store instance released");
                    None
                }
                Ok(Err(e)) => {
                    warn!("Store instance shutdown reported an error: {}", e);
                    Some(e.to_string())
                }
                Err(_) => {
                    warn!(
                        "Store instance shutdown did not finish within {:?}",
                        config.shutdown_grace
                    );
                    Some(format!(
                        "shutdown timed out after {:?}",
                        config.shutdown_grace
                    ))
                }
            };

        match verdict {
            Ok(()) => {
                transition(&mut phase, SeedPhase::Completed);
                let report = SeedReport {
                    run_id,
                    started_at,
                    finished_at: Utc::now(),
                    counts,
                    row_errors,
                    shutdown_warning,
                };
                if report.row_errors.is_empty() {
                    info!(
                        "✅ Seed run {} complete: {} entities created",
                        run_id,
                        report.counts.total_created()
                    );
                } else {
                    warn!(
                        "Seed run {} complete with {} failed rows ({} entities created)",
                        run_id,
                        report.row_errors.len(),
                        report.counts.total_created()
                    );
                }
                Ok(report)
            }
            Err(e) => {
                transition(&mut phase, SeedPhase::Failed);
                error!("Seed run {} failed: {}", run_id, e);
                Err(e)
            }
        }
    }

    async fn populate(
        &self,
        handle: &dyn StoreHandle,
        config: &SeedRunConfig,
        phase: &mut SeedPhase,
        counts: &mut CategoryCounts,
        row_errors: &mut Vec<RowError>,
    ) -> Result<(), SeedError> {
        transition(phase, SeedPhase::SeedingReferenceData);
        self.seed_reference_data(handle, config, counts).await?;

        transition(phase, SeedPhase::ImportingProducts);
        self.import_products(handle, config, counts, row_errors)
            .await?;

        if let Some(token) = &config.channel_token {
            debug!("Assigning seeded entities to channel '{}'", token);
            let assigned = handle.assign_to_channel(token).await.map_err(|e| {
                error!("Channel assignment for '{}' failed: {}", token, e);
                e
            })?;
            info!("Assigned {} entities to channel '{}'", assigned, token);
        }

        Ok(())
    }

    /// Seeds reference data in dependency order: zones, countries, tax
    /// rates, shipping methods, payment methods, then collections with
    /// parents strictly before children. Collection filters consume facet
    /// values from a prior catalog setup; facets are never created here.
    async fn seed_reference_data(
        &self,
        handle: &dyn StoreHandle,
        config: &SeedRunConfig,
        counts: &mut CategoryCounts,
    ) -> Result<(), SeedError> {
        let data = &config.initial_data;

        debug!("Step 1: Seeding zones");
        for zone in data.zone_names() {
            let result = handle.create_zone(&zone).await;
            apply_reference_outcome("zone", &zone, result, &mut counts.zones)?;
        }

        debug!("Step 2: Seeding {} countries", data.countries.len());
        for country in &data.countries {
            let result = handle.create_country(country).await;
            apply_reference_outcome("country", &country.code, result, &mut counts.countries)?;
        }

        debug!("Step 3: Seeding {} tax rates", data.tax_rates.len());
        for rate in &data.tax_rates {
            let result = handle.create_tax_rate(rate).await;
            apply_reference_outcome("tax rate", &rate.name, result, &mut counts.tax_rates)?;
        }

        debug!(
            "Step 4: Seeding {} shipping methods",
            data.shipping_methods.len()
        );
        for method in &data.shipping_methods {
            let result = handle.create_shipping_method(method).await;
            apply_reference_outcome(
                "shipping method",
                &method.name,
                result,
                &mut counts.shipping_methods,
            )?;
        }

        debug!(
            "Step 5: Seeding {} payment methods",
            data.payment_methods.len()
        );
        for method in &data.payment_methods {
            let result = handle.create_payment_method(method).await;
            apply_reference_outcome(
                "payment method",
                &method.name,
                result,
                &mut counts.payment_methods,
            )?;
        }

        let order = data.collection_seed_order()?;
        debug!("Step 6: Seeding {} collections in parent order", order.len());
        for collection in order {
            let result = handle.create_collection(collection).await;
            apply_reference_outcome(
                "collection",
                &collection.slug,
                result,
                &mut counts.collections,
            )?;
        }

        info!(
            "Reference data seeded: {} zones, {} countries, {} tax rates, {} shipping methods, {} payment methods, {} collections",
            counts.zones, counts.countries, counts.tax_rates,
            counts.shipping_methods, counts.payment_methods, counts.collections
        );
        Ok(())
    }

    /// Streams rows through the store with a bounded number in flight. Each
    /// worker returns its own outcome; counters and the error list are only
    /// touched here, on the coordinating task. One row's failure never
    /// cancels its siblings.
    async fn import_products(
        &self,
        handle: &dyn StoreHandle,
        config: &SeedRunConfig,
        counts: &mut CategoryCounts,
        row_errors: &mut Vec<RowError>,
    ) -> Result<(), SeedError> {
        let rows = self.products.rows().await.map_err(|e| {
            error!(
                "Failed to read product table {}: {}",
                config.products_path.display(),
                e
            );
            e
        })?;
        let total = rows.len();
        let concurrency = config.effective_concurrency();
        info!(
            "Importing {} product rows ({} in flight)",
            total, concurrency
        );

        let mut outcomes = stream::iter(rows.into_iter())
            .map(|row| self.import_row(handle, row))
            .buffer_unordered(concurrency);

        let mut processed = 0usize;
        while let Some(outcome) = outcomes.next().await {
            processed += 1;
            match outcome {
                RowOutcome::Imported(result) => counts.products.apply(result),
                RowOutcome::Failed(err) => {
                    counts.products.failed += 1;
                    row_errors.push(err);
                }
            }
            if processed % 50 == 0 {
                debug!("Processed {} of {} product rows", processed, total);
            }
        }

        // Completion order is arbitrary under buffer_unordered.
        row_errors.sort_by_key(|e| e.row);

        info!("Product import complete: {}", counts.products);
        Ok(())
    }

    async fn import_row(
        &self,
        handle: &dyn StoreHandle,
        row: Result<ProductRecord, RowError>,
    ) -> RowOutcome {
        let record = match row {
            Ok(record) => record,
            Err(err) => {
                warn!("Skipping malformed row {}: {}", err.row, err.reason);
                return RowOutcome::Failed(err);
            }
        };

        if let Some(assets) = &self.assets {
            for filename in record.assets.iter().chain(record.variant_assets.iter()) {
                if let Err(e) = assets.resolve(filename) {
                    warn!("Row {}: asset '{}' unresolvable: {}", record.row, filename, e);
                    return RowOutcome::Failed(RowError {
                        row: record.row,
                        reason: format!("asset '{}': {}", filename, e),
                    });
                }
            }
        }
        // Without an asset directory the references pass through untouched
        // and the store treats them as URLs.

        match handle.import_product(&record).await {
            Ok(outcome) => {
                debug!("Row {} imported ({:?})", record.row, outcome);
                RowOutcome::Imported(outcome)
            }
            Err(e) => {
                warn!("Row {} rejected by store: {}", record.row, e);
                RowOutcome::Failed(RowError {
                    row: record.row,
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn transition(phase: &mut SeedPhase, next: SeedPhase) {
    debug!("Run phase {} -> {}", phase, next);
    *phase = next;
}

/// Per-item policy for reference entities: created and already-exists both
/// count and continue; a structural failure aborts; anything else is logged,
/// counted as failed and skipped.
fn apply_reference_outcome(
    kind: &str,
    key: &str,
    result: Result<CreateOutcome, SeedError>,
    tally: &mut CreateTally,
) -> Result<(), SeedError> {
    match result {
        Ok(CreateOutcome::Created) => {
            debug!("Created {} '{}'", kind, key);
            tally.apply(CreateOutcome::Created);
            Ok(())
        }
        Ok(CreateOutcome::AlreadyExists) => {
            info!("{} '{}' already exists, skipping", kind, key);
            tally.apply(CreateOutcome::AlreadyExists);
            Ok(())
        }
        Err(e) if e.is_structural() => {
            error!("Structural failure creating {} '{}': {}", kind, key, e);
            Err(e)
        }
        Err(e) => {
            warn!("Failed to create {} '{}', continuing: {}", kind, key, e);
            tally.failed += 1;
            Ok(())
        }
    }
}
