use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::domain::{
    error::SeedError,
    models::BootstrapOptions,
    ports::{StoreBootstrap, StoreHandle},
};

use super::handle::HttpStoreHandle;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How to reach (and possibly launch) the store server.
///
/// With a `command`, bootstrap spawns the server process and owns it for the
/// run; without one, it attaches to an instance already listening on
/// `admin_url` and release happens through the shutdown endpoint alone.
#[derive(Debug, Clone)]
pub struct StoreServerConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Argument appended to `command` to bring the schema up to date.
    pub migrate_arg: String,
    pub admin_url: String,
    pub startup_deadline: Duration,
    pub options: BootstrapOptions,
}

impl StoreServerConfig {
    /// Environment-driven defaults; CLI flags override `options`.
    pub fn from_env(options: BootstrapOptions) -> Self {
        let command = std::env::var("STORE_SERVER_COMMAND").ok();
        let args = std::env::var("STORE_SERVER_ARGS")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let admin_url = std::env::var("STORE_ADMIN_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
        let startup_secs = std::env::var("STORE_STARTUP_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(60);
        info!(
            "Store server: command={}, admin_url={}",
            command.as_deref().unwrap_or("<attach>"),
            admin_url
        );
        Self {
            command,
            args,
            migrate_arg: std::env::var("STORE_MIGRATE_ARG")
                .unwrap_or_else(|_| "migrate".to_string()),
            admin_url,
            startup_deadline: Duration::from_secs(startup_secs),
            options,
        }
    }

    fn admin_base(&self) -> String {
        self.admin_url.trim_end_matches('/').to_string()
    }
}

/// Launches the external store server and waits for its health endpoint, or
/// attaches to one that is already running.
pub struct ProcessBootstrap {
    config: StoreServerConfig,
    http: reqwest::Client,
}

impl ProcessBootstrap {
    pub fn new(config: StoreServerConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Idempotently brings the store schema up to date. A pre-step the
    /// caller runs before bootstrap, never the pipeline itself.
    pub async fn run_migrations(&self) -> Result<(), SeedError> {
        let command = self.config.command.as_deref().ok_or_else(|| {
            SeedError::Configuration(
                "migrations require STORE_SERVER_COMMAND to be set".to_string(),
            )
        })?;
        info!("Running migrations: {} {}", command, self.config.migrate_arg);

        let status = Command::new(command)
            .args(&self.config.args)
            .arg(&self.config.migrate_arg)
            .status()
            .await
            .map_err(|e| SeedError::Bootstrap(format!("failed to run migrations: {}", e)))?;
        if !status.success() {
            return Err(SeedError::Bootstrap(format!(
                "migration run exited with {}",
                status
            )));
        }
        info!("Migrations complete");
        Ok(())
    }

    async fn wait_until_healthy(&self) -> Result<(), SeedError> {
        let health_url = format!("{}/health", self.config.admin_base());
        let deadline = Instant::now() + self.config.startup_deadline;
        debug!("Polling {} for readiness", health_url);
        loop {
            match self.http.get(&health_url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Store instance is healthy");
                    return Ok(());
                }
                Ok(response) => {
                    debug!("Health endpoint returned {}", response.status());
                }
                Err(e) => {
                    debug!("Health endpoint not reachable yet: {}", e);
                }
            }
            if Instant::now() >= deadline {
                return Err(SeedError::Bootstrap(format!(
                    "store did not become healthy within {:?}",
                    self.config.startup_deadline
                )));
            }
            sleep(HEALTH_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl StoreBootstrap for ProcessBootstrap {
    async fn bootstrap(&self) -> Result<Arc<dyn StoreHandle>, SeedError> {
        let child = match self.config.command.as_deref() {
            Some(command) => {
                info!("Spawning store server: {}", command);
                let mut cmd = Command::new(command);
                cmd.args(&self.config.args);
                let options = &self.config.options;
                if let Some(port) = options.port {
                    debug!("Overriding store port: {}", port);
                    cmd.env("STORE_PORT", port.to_string());
                }
                if let Some(level) = &options.logger_level {
                    cmd.env("STORE_LOG_LEVEL", level);
                }
                if !options.excluded_plugins.is_empty() {
                    debug!("Excluding plugins: {:?}", options.excluded_plugins);
                    cmd.env("STORE_EXCLUDED_PLUGINS", options.excluded_plugins.join(","));
                }
                cmd.kill_on_drop(true);
                let child = cmd.spawn().map_err(|e| {
                    error!("Failed to spawn store server '{}': {}", command, e);
                    SeedError::Bootstrap(format!("failed to spawn '{}': {}", command, e))
                })?;
                Some(child)
            }
            None => {
                info!(
                    "No server command configured, attaching to {}",
                    self.config.admin_url
                );
                None
            }
        };

        if let Err(e) = self.wait_until_healthy().await {
            if let Some(mut child) = child {
                warn!("Stopping unhealthy store process");
                if let Err(kill_err) = child.start_kill() {
                    warn!("Could not stop store process: {}", kill_err);
                }
                let _ = child.wait().await;
            }
            return Err(e);
        }

        Ok(Arc::new(HttpStoreHandle::new(
            self.config.admin_base(),
            self.http.clone(),
            child,
        )))
    }
}
