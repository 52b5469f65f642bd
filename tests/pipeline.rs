use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use shop_seeder::application::seed_service::SeedService;
use shop_seeder::domain::error::SeedError;
use shop_seeder::domain::models::{
    CollectionDef, Country, CreateOutcome, InitialData, LanguageCode, PaymentMethod,
    ProductRecord, RowError, SeedRunConfig, ShippingMethod, TaxRate,
};
use shop_seeder::domain::ports::{ProductSource, StoreBootstrap, StoreHandle};
use shop_seeder::infrastructure::assets::AssetDirectory;
use shop_seeder::infrastructure::parsers::ProductFileSource;

/// In-memory store: records every creation in call order, answers
/// `AlreadyExists` for natural keys it has already seen, and can be told to
/// fail specific creations.
#[derive(Default)]
struct MockStore {
    created: Mutex<Vec<(String, String)>>,
    existing: Mutex<HashSet<(String, String)>>,
    fail_creates: Mutex<HashSet<(String, String)>>,
    structural_failures: Mutex<HashSet<String>>,
    channel_assignments: Mutex<Vec<String>>,
    close_calls: AtomicUsize,
    fail_close: bool,
}

impl MockStore {
    fn create(&self, kind: &str, key: &str) -> Result<CreateOutcome, SeedError> {
        let natural_key = (kind.to_string(), key.to_string());
        if self.fail_creates.lock().unwrap().contains(&natural_key) {
            return Err(SeedError::Store(format!(
                "induced failure for {} '{}'",
                kind, key
            )));
        }
        if !self.existing.lock().unwrap().insert(natural_key.clone()) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        self.created.lock().unwrap().push(natural_key);
        Ok(CreateOutcome::Created)
    }

    fn position(&self, kind: &str, key: &str) -> Option<usize> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .position(|(k, n)| k == kind && n == key)
    }

    fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl StoreHandle for MockStore {
    async fn create_zone(&self, name: &str) -> Result<CreateOutcome, SeedError> {
        self.create("zone", name)
    }

    async fn create_country(&self, country: &Country) -> Result<CreateOutcome, SeedError> {
        self.create("country", &country.code)
    }

    async fn create_tax_rate(&self, rate: &TaxRate) -> Result<CreateOutcome, SeedError> {
        self.create("tax-rate", &rate.name)
    }

    async fn create_shipping_method(
        &self,
        method: &ShippingMethod,
    ) -> Result<CreateOutcome, SeedError> {
        self.create("shipping-method", &method.name)
    }

    async fn create_payment_method(
        &self,
        method: &PaymentMethod,
    ) -> Result<CreateOutcome, SeedError> {
        self.create("payment-method", &method.name)
    }

    async fn create_collection(
        &self,
        collection: &CollectionDef,
    ) -> Result<CreateOutcome, SeedError> {
        if self
            .structural_failures
            .lock()
            .unwrap()
            .contains(&collection.slug)
        {
            return Err(SeedError::ReferenceData {
                entity: collection.slug.clone(),
                reason: "parent not resolvable".to_string(),
            });
        }
        self.create("collection", &collection.slug)
    }

    async fn import_product(&self, product: &ProductRecord) -> Result<CreateOutcome, SeedError> {
        self.create("product", &product.row.to_string())
    }

    async fn assign_to_channel(&self, channel_token: &str) -> Result<u64, SeedError> {
        self.channel_assignments
            .lock()
            .unwrap()
            .push(channel_token.to_string());
        Ok(self.created_count() as u64)
    }

    async fn close(&self) -> Result<(), SeedError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(SeedError::Shutdown("induced close failure".to_string()));
        }
        Ok(())
    }
}

struct MockBootstrap {
    store: Arc<MockStore>,
    bootstraps: AtomicUsize,
    fail: bool,
}

impl MockBootstrap {
    fn new(store: Arc<MockStore>) -> Self {
        Self {
            store,
            bootstraps: AtomicUsize::new(0),
            fail: false,
        }
    }
}

#[async_trait]
impl StoreBootstrap for MockBootstrap {
    async fn bootstrap(&self) -> Result<Arc<dyn StoreHandle>, SeedError> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SeedError::Bootstrap("induced bootstrap failure".to_string()));
        }
        Ok(self.store.clone())
    }
}

struct StaticRows(Vec<Result<ProductRecord, RowError>>);

#[async_trait]
impl ProductSource for StaticRows {
    async fn rows(&self) -> Result<Vec<Result<ProductRecord, RowError>>, SeedError> {
        Ok(self.0.clone())
    }
}

struct UnreadableTable;

#[async_trait]
impl ProductSource for UnreadableTable {
    async fn rows(&self) -> Result<Vec<Result<ProductRecord, RowError>>, SeedError> {
        Err(SeedError::Parse("induced unreadable table".to_string()))
    }
}

fn collection(name: &str, slug: &str, parent: Option<&str>) -> CollectionDef {
    CollectionDef {
        name: name.to_string(),
        slug: slug.to_string(),
        description: None,
        parent_name: parent.map(str::to_string),
        filters: Vec::new(),
    }
}

fn base_data() -> InitialData {
    InitialData {
        default_language: LanguageCode::En,
        default_zone: "North America".to_string(),
        countries: vec![
            Country {
                code: "US".to_string(),
                name: "United States".to_string(),
                zone: "North America".to_string(),
            },
            Country {
                code: "MX".to_string(),
                name: "Mexico".to_string(),
                zone: "North America".to_string(),
            },
        ],
        tax_rates: vec![
            TaxRate {
                name: "Texas".to_string(),
                percentage: 8.25,
            },
            TaxRate {
                name: "Standard".to_string(),
                percentage: 0.0,
            },
        ],
        shipping_methods: vec![ShippingMethod {
            name: "Standard Shipping".to_string(),
            price: 12_500,
        }],
        payment_methods: Vec::new(),
        collections: vec![
            collection("Guitars", "guitars", None),
            collection("Classical", "classical-guitars", Some("Guitars")),
            collection("Flamenco", "flamenco-guitars", Some("Guitars")),
        ],
    }
}

fn config(data: InitialData) -> SeedRunConfig {
    SeedRunConfig::new(data, "products.csv")
}

fn service_with(
    store: &Arc<MockStore>,
    rows: Vec<Result<ProductRecord, RowError>>,
) -> (SeedService, Arc<MockBootstrap>) {
    let bootstrap = Arc::new(MockBootstrap::new(store.clone()));
    let service = SeedService::new(bootstrap.clone(), Arc::new(StaticRows(rows)), None);
    (service, bootstrap)
}

#[tokio::test]
async fn happy_path_seeds_in_dependency_order_and_closes_once() {
    let store = Arc::new(MockStore::default());
    let (service, bootstrap) = service_with(&store, Vec::new());

    let report = service.run(&config(base_data())).await.expect("run succeeds");

    assert_eq!(bootstrap.bootstraps.load(Ordering::SeqCst), 1);
    assert_eq!(store.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.counts.zones.created, 1);
    assert_eq!(report.counts.countries.created, 2);
    assert_eq!(report.counts.tax_rates.created, 2);
    assert_eq!(report.counts.shipping_methods.created, 1);
    assert_eq!(report.counts.collections.created, 3);
    assert!(report.row_errors.is_empty());
    assert!(report.shutdown_warning.is_none());

    let pos = |kind: &str, key: &str| {
        store
            .position(kind, key)
            .unwrap_or_else(|| panic!("{kind} '{key}' never created"))
    };
    assert!(pos("zone", "North America") < pos("country", "US"));
    assert!(pos("country", "MX") < pos("tax-rate", "Texas"));
    assert!(pos("tax-rate", "Standard") < pos("shipping-method", "Standard Shipping"));
    assert!(pos("shipping-method", "Standard Shipping") < pos("collection", "guitars"));
    // Topological order: parent before both children.
    assert!(pos("collection", "guitars") < pos("collection", "classical-guitars"));
    assert!(pos("collection", "guitars") < pos("collection", "flamenco-guitars"));
}

#[tokio::test]
async fn dangling_parent_fails_before_any_creation_call() {
    let store = Arc::new(MockStore::default());
    let (service, bootstrap) = service_with(&store, Vec::new());

    let mut data = base_data();
    data.collections
        .push(collection("Ukuleles", "ukuleles", Some("Small Instruments")));

    let err = service.run(&config(data)).await.expect_err("must fail");
    assert!(matches!(err, SeedError::Configuration(_)), "got {err:?}");
    assert_eq!(bootstrap.bootstraps.load(Ordering::SeqCst), 0);
    assert_eq!(store.created_count(), 0);
    assert_eq!(store.close_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_run_skips_everything_and_still_succeeds() {
    let store = Arc::new(MockStore::default());
    let (service, _) = service_with(&store, Vec::new());

    let first = service.run(&config(base_data())).await.expect("first run");
    let created_after_first = store.created_count();
    assert!(created_after_first > 0);
    assert_eq!(first.counts.total_created() as usize, created_after_first);

    let second = service.run(&config(base_data())).await.expect("second run");
    assert_eq!(store.created_count(), created_after_first, "no duplicates");
    assert_eq!(second.counts.total_created(), 0);
    assert_eq!(second.counts.zones.skipped, 1);
    assert_eq!(second.counts.countries.skipped, 2);
    assert_eq!(second.counts.collections.skipped, 3);
    assert_eq!(store.close_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_assets_fail_exactly_those_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let csv_path = dir.path().join("products.csv");
    let assets_dir = dir.path().join("assets");
    std::fs::create_dir(&assets_dir).expect("mkdir");

    let mut doc = String::from("name,slug,assets\n");
    for i in 1..=100 {
        doc.push_str(&format!("Product {i},product-{i},img-{i}.jpg\n"));
        if i != 7 && i != 42 {
            std::fs::write(assets_dir.join(format!("img-{i}.jpg")), b"jpg").expect("write asset");
        }
    }
    std::fs::write(&csv_path, doc).expect("write csv");

    let store = Arc::new(MockStore::default());
    let bootstrap = Arc::new(MockBootstrap::new(store.clone()));
    let service = SeedService::new(
        bootstrap,
        Arc::new(ProductFileSource::new(&csv_path)),
        Some(Arc::new(AssetDirectory::open(&assets_dir).expect("open"))),
    );

    let mut config = SeedRunConfig::new(base_data(), &csv_path);
    config.import_concurrency = 8;

    let report = service.run(&config).await.expect("partial success");
    let failed_rows: Vec<usize> = report.row_errors.iter().map(|e| e.row).collect();
    assert_eq!(failed_rows, vec![7, 42]);
    assert_eq!(report.counts.products.created, 98);
    assert_eq!(report.counts.products.failed, 2);
    assert_eq!(store.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn channel_token_assigns_every_created_entity() {
    let store = Arc::new(MockStore::default());
    let (service, _) = service_with(&store, Vec::new());

    let mut config = config(base_data());
    config.channel_token = Some("my-channel-token".to_string());

    let report = service.run(&config).await.expect("run succeeds");
    let assignments = store.channel_assignments.lock().unwrap().clone();
    assert_eq!(assignments, vec!["my-channel-token"]);
    assert!(report.counts.total_created() > 0);
}

#[tokio::test]
async fn without_channel_token_no_assignment_happens() {
    let store = Arc::new(MockStore::default());
    let (service, _) = service_with(&store, Vec::new());

    service.run(&config(base_data())).await.expect("run succeeds");
    assert!(store.channel_assignments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_product_table_is_fatal_but_still_closes() {
    let store = Arc::new(MockStore::default());
    let bootstrap = Arc::new(MockBootstrap::new(store.clone()));
    let service = SeedService::new(bootstrap, Arc::new(UnreadableTable), None);

    let err = service
        .run(&config(base_data()))
        .await
        .expect_err("must fail");
    assert!(matches!(err, SeedError::Parse(_)), "got {err:?}");
    assert_eq!(store.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tolerated_reference_failure_does_not_abort() {
    let store = Arc::new(MockStore::default());
    store
        .fail_creates
        .lock()
        .unwrap()
        .insert(("tax-rate".to_string(), "Standard".to_string()));
    let (service, _) = service_with(&store, Vec::new());

    let report = service.run(&config(base_data())).await.expect("run succeeds");
    assert_eq!(report.counts.tax_rates.created, 1);
    assert_eq!(report.counts.tax_rates.failed, 1);
    // Later categories were still seeded.
    assert_eq!(report.counts.collections.created, 3);
    assert_eq!(store.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn structural_collection_failure_is_fatal_but_still_closes() {
    let store = Arc::new(MockStore::default());
    store
        .structural_failures
        .lock()
        .unwrap()
        .insert("classical-guitars".to_string());
    let (service, _) = service_with(&store, Vec::new());

    let err = service
        .run(&config(base_data()))
        .await
        .expect_err("must fail");
    assert!(matches!(err, SeedError::ReferenceData { .. }), "got {err:?}");
    assert_eq!(store.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bootstrap_failure_leaves_nothing_to_close() {
    let store = Arc::new(MockStore::default());
    let mut bootstrap = MockBootstrap::new(store.clone());
    bootstrap.fail = true;
    let service = SeedService::new(
        Arc::new(bootstrap),
        Arc::new(StaticRows(Vec::new())),
        None,
    );

    let err = service
        .run(&config(base_data()))
        .await
        .expect_err("must fail");
    assert!(matches!(err, SeedError::Bootstrap(_)), "got {err:?}");
    assert_eq!(store.close_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn close_failure_becomes_a_warning_not_a_verdict() {
    let store = Arc::new(MockStore {
        fail_close: true,
        ..MockStore::default()
    });
    let (service, _) = service_with(&store, Vec::new());

    let report = service.run(&config(base_data())).await.expect("still ok");
    assert!(report.shutdown_warning.is_some());
    assert_eq!(store.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_rows_surface_as_row_errors() {
    let store = Arc::new(MockStore::default());
    let rows = vec![
        Ok(ProductRecord {
            row: 1,
            fields: Default::default(),
            assets: Vec::new(),
            variant_assets: Vec::new(),
        }),
        Err(RowError {
            row: 2,
            reason: "malformed record".to_string(),
        }),
        Ok(ProductRecord {
            row: 3,
            fields: Default::default(),
            assets: Vec::new(),
            variant_assets: Vec::new(),
        }),
    ];
    let (service, _) = service_with(&store, rows);

    let report = service.run(&config(base_data())).await.expect("partial");
    assert_eq!(report.counts.products.created, 2);
    assert_eq!(report.row_errors.len(), 1);
    assert_eq!(report.row_errors[0].row, 2);
}
