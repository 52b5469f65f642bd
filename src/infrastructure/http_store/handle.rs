use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{
    error::SeedError,
    models::{
        CollectionDef, Country, CreateOutcome, PaymentMethod, ProductRecord, ShippingMethod,
        TaxRate,
    },
    ports::StoreHandle,
};

/// Admin-API client for one running store instance.
///
/// Creation endpoints answer 409 when the entity already exists under its
/// natural key; that maps to `CreateOutcome::AlreadyExists` so re-runs stay
/// idempotent. When the handle owns the server process, `close()` reaps it
/// after asking the instance to stop.
pub struct HttpStoreHandle {
    base_url: String,
    http: reqwest::Client,
    child: Mutex<Option<Child>>,
}

impl HttpStoreHandle {
    pub fn new(base_url: String, http: reqwest::Client, child: Option<Child>) -> Self {
        Self {
            base_url,
            http,
            child: Mutex::new(child),
        }
    }

    async fn post_create<B: Serialize + ?Sized>(
        &self,
        resource: &str,
        key: &str,
        body: &B,
    ) -> Result<CreateOutcome, SeedError> {
        let url = format!("{}/admin-api/{}", self.base_url, resource);
        debug!("POST {} ({})", url, key);
        let response = self.http.post(&url).json(body).send().await?;
        match response.status() {
            status if status.is_success() => Ok(CreateOutcome::Created),
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(SeedError::Store(format!(
                    "{} '{}' rejected ({}): {}",
                    resource, key, status, detail
                )))
            }
        }
    }
}

#[async_trait]
impl StoreHandle for HttpStoreHandle {
    async fn create_zone(&self, name: &str) -> Result<CreateOutcome, SeedError> {
        self.post_create("zones", name, &serde_json::json!({ "name": name }))
            .await
    }

    async fn create_country(&self, country: &Country) -> Result<CreateOutcome, SeedError> {
        self.post_create("countries", &country.code, country).await
    }

    async fn create_tax_rate(&self, rate: &TaxRate) -> Result<CreateOutcome, SeedError> {
        self.post_create("tax-rates", &rate.name, rate).await
    }

    async fn create_shipping_method(
        &self,
        method: &ShippingMethod,
    ) -> Result<CreateOutcome, SeedError> {
        self.post_create("shipping-methods", &method.name, method)
            .await
    }

    async fn create_payment_method(
        &self,
        method: &PaymentMethod,
    ) -> Result<CreateOutcome, SeedError> {
        self.post_create("payment-methods", &method.name, method)
            .await
    }

    async fn create_collection(
        &self,
        collection: &CollectionDef,
    ) -> Result<CreateOutcome, SeedError> {
        let url = format!("{}/admin-api/collections", self.base_url);
        debug!("POST {} ({})", url, collection.slug);
        let response = self.http.post(&url).json(collection).send().await?;
        match response.status() {
            status if status.is_success() => Ok(CreateOutcome::Created),
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            // The store answers 422 when it cannot resolve the named parent;
            // that is structural, not a per-item validation hiccup.
            StatusCode::UNPROCESSABLE_ENTITY => {
                let detail = response.text().await.unwrap_or_default();
                Err(SeedError::ReferenceData {
                    entity: collection.slug.clone(),
                    reason: detail,
                })
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(SeedError::Store(format!(
                    "collections '{}' rejected ({}): {}",
                    collection.slug, status, detail
                )))
            }
        }
    }

    async fn import_product(&self, product: &ProductRecord) -> Result<CreateOutcome, SeedError> {
        self.post_create("products", &format!("row {}", product.row), product)
            .await
    }

    async fn assign_to_channel(&self, channel_token: &str) -> Result<u64, SeedError> {
        let url = format!(
            "{}/admin-api/channels/{}/assign-all",
            self.base_url, channel_token
        );
        debug!("POST {}", url);
        let response = self.http.post(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(SeedError::Store(format!(
                "channel assignment rejected ({}): {}",
                status, detail
            )));
        }
        let body: serde_json::Value = response.json().await?;
        let assigned = body
            .get("assigned")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        Ok(assigned)
    }

    async fn close(&self) -> Result<(), SeedError> {
        debug!("Releasing store instance at {}", self.base_url);
        let shutdown_url = format!("{}/admin-api/shutdown", self.base_url);
        let endpoint_result = self.http.post(&shutdown_url).send().await;

        let mut guard = self.child.lock().await;
        match guard.take() {
            Some(mut child) => {
                if let Err(e) = &endpoint_result {
                    // We own the process, so a dead endpoint just means we
                    // stop it the hard way.
                    warn!("Shutdown endpoint unreachable: {}", e);
                }
                if let Err(e) = child.start_kill() {
                    debug!("Store process already stopped: {}", e);
                }
                let status = child.wait().await.map_err(|e| {
                    SeedError::Shutdown(format!("failed to reap store process: {}", e))
                })?;
                info!("Store process exited with {}", status);
                Ok(())
            }
            None => {
                // Attached instance: the endpoint is the only release path.
                let response = endpoint_result
                    .map_err(|e| SeedError::Shutdown(format!("shutdown endpoint failed: {}", e)))?;
                if !response.status().is_success() {
                    return Err(SeedError::Shutdown(format!(
                        "shutdown endpoint returned {}",
                        response.status()
                    )));
                }
                info!("Asked attached store instance to stop");
                Ok(())
            }
        }
    }
}
