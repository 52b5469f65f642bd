use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shop_seeder::application::seed_service::SeedService;
use shop_seeder::domain::models::{BootstrapOptions, SeedReport, SeedRunConfig};
use shop_seeder::domain::ports::AssetStore;
use shop_seeder::infrastructure::assets::AssetDirectory;
use shop_seeder::infrastructure::http_store::bootstrap::{ProcessBootstrap, StoreServerConfig};
use shop_seeder::infrastructure::initial_data::load_initial_data;
use shop_seeder::infrastructure::parsers::ProductFileSource;

#[derive(Parser)]
#[command(
    name = "shop-seeder",
    about = "Populate a store instance with reference data and products"
)]
struct SeedArgs {
    /// Initial data document (.json / .yaml)
    #[arg(long)]
    initial_data: PathBuf,

    /// Product table (.csv / .xlsx)
    #[arg(long)]
    products: PathBuf,

    /// Directory with asset files referenced from product rows; without it,
    /// asset references pass through as URLs
    #[arg(long)]
    assets_dir: Option<PathBuf>,

    /// Assign everything created in this run to the given channel
    #[arg(long)]
    channel_token: Option<String>,

    /// Bring the store schema up to date before bootstrapping
    #[arg(long)]
    run_migrations: bool,

    /// Override the store server's bind port
    #[arg(long)]
    port: Option<u16>,

    /// Logger level handed to the store server
    #[arg(long)]
    logger_level: Option<String>,

    /// Store plugin to disable during the run (repeatable)
    #[arg(long = "exclude-plugin")]
    excluded_plugins: Vec<String>,

    /// Product rows in flight at once
    #[arg(long, default_value = "4")]
    concurrency: usize,

    /// Exit non-zero when more than this many rows fail
    #[arg(long)]
    max_row_failures: Option<usize>,

    /// Grace period for store shutdown, in seconds
    #[arg(long, default_value = "10")]
    shutdown_grace_secs: u64,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = SeedArgs::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("shop_seeder={}", level).parse().unwrap())
                .add_directive("reqwest=warn".parse().unwrap())
                .add_directive("hyper=warn".parse().unwrap()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting shop seeder");

    let initial_data = match load_initial_data(&args.initial_data) {
        Ok(data) => data,
        Err(e) => {
            error!("Cannot load initial data: {}", e);
            process::exit(1);
        }
    };

    let assets: Option<Arc<dyn AssetStore>> = match &args.assets_dir {
        Some(dir) => match AssetDirectory::open(dir) {
            Ok(assets) => Some(Arc::new(assets)),
            Err(e) => {
                error!("Cannot open asset directory: {}", e);
                process::exit(1);
            }
        },
        None => {
            info!("No asset directory supplied, asset references pass through as URLs");
            None
        }
    };

    let mut config = SeedRunConfig::new(initial_data, args.products.clone());
    config.assets_dir = args.assets_dir.clone();
    config.channel_token = args.channel_token.clone();
    config.import_concurrency = args.concurrency;
    config.shutdown_grace = Duration::from_secs(args.shutdown_grace_secs);

    let server_config = StoreServerConfig::from_env(BootstrapOptions {
        port: args.port,
        logger_level: args.logger_level.clone(),
        excluded_plugins: args.excluded_plugins.clone(),
    });
    let bootstrap = Arc::new(ProcessBootstrap::new(server_config));

    if args.run_migrations {
        if let Err(e) = bootstrap.run_migrations().await {
            error!("Migrations failed: {}", e);
            process::exit(1);
        }
    }

    let products = Arc::new(ProductFileSource::new(args.products.clone()));
    let service = SeedService::new(bootstrap, products, assets);

    match service.run(&config).await {
        Ok(report) => {
            print_summary(&report);
            if let Some(tolerance) = args.max_row_failures {
                if report.row_errors.len() > tolerance {
                    error!(
                        "{} rows failed, exceeding the tolerance of {}",
                        report.row_errors.len(),
                        tolerance
                    );
                    process::exit(1);
                }
            }
            process::exit(0);
        }
        Err(e) => {
            error!("Seeding failed: {}", e);
            process::exit(1);
        }
    }
}

fn print_summary(report: &SeedReport) {
    let elapsed = report.finished_at - report.started_at;
    println!(
        "Seed run {} finished in {}.{:03}s",
        report.run_id,
        elapsed.num_seconds(),
        elapsed.num_milliseconds().rem_euclid(1000)
    );
    println!("  zones:            {}", report.counts.zones);
    println!("  countries:        {}", report.counts.countries);
    println!("  tax rates:        {}", report.counts.tax_rates);
    println!("  shipping methods: {}", report.counts.shipping_methods);
    println!("  payment methods:  {}", report.counts.payment_methods);
    println!("  collections:      {}", report.counts.collections);
    println!("  products:         {}", report.counts.products);
    if !report.row_errors.is_empty() {
        println!("  {} product rows failed:", report.row_errors.len());
        for err in &report.row_errors {
            println!("    row {}: {}", err.row, err.reason);
        }
    }
    if let Some(warning) = &report.shutdown_warning {
        warn!("Shutdown warning: {}", warning);
    }
}
