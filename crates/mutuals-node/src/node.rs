//! Mutuals Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with shared RocksDB storage
//! - Recompute engine (worker, change watcher, report schedule)
//! - HTTP API for member clients
//! - Unix admin socket for local admin ops (mutuals-admin CLI)

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::error::{Error, Result};
use crate::storage::Storage;
use mutuals_engine::{AmbiguityPolicy, EngineConfig, EngineService, RecomputeHandle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for mutuals-admin CLI)
    pub admin_socket: PathBuf,

    /// Recompute engine settings
    pub engine: EngineConfig,
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}

/// Seconds, where 0 disables the schedule.
fn parse_period(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Option<Duration>,
) -> Result<Option<Duration>> {
    let default_secs = default.map(|d| d.as_secs()).unwrap_or(0);
    let secs: u64 = parse_var(lookup, key, default_secs)?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = PathBuf::from(
            lookup("MUTUALS_DATA_DIR").unwrap_or_else(|| "./mutuals-data".to_string()),
        );

        let api_addr = parse_var(&lookup, "MUTUALS_API_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        let admin_socket = lookup("MUTUALS_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let defaults = EngineConfig::default();
        let ambiguity: AmbiguityPolicy = parse_var(&lookup, "MUTUALS_AMBIGUITY", defaults.ambiguity)?;
        let batch_limit: usize = parse_var(&lookup, "MUTUALS_BATCH_LIMIT", defaults.batch_limit)?;
        if batch_limit == 0 {
            return Err(Error::Config("MUTUALS_BATCH_LIMIT must be at least 1".into()));
        }
        let debounce_ms: u64 = parse_var(
            &lookup,
            "MUTUALS_DEBOUNCE_MS",
            defaults.debounce.as_millis() as u64,
        )?;

        let engine = EngineConfig::default()
            .with_ambiguity(ambiguity)
            .with_batch_limit(batch_limit)
            .with_debounce(Duration::from_millis(debounce_ms))
            .with_recompute_interval(parse_period(
                &lookup,
                "MUTUALS_RECOMPUTE_INTERVAL_SECS",
                defaults.recompute_interval,
            )?)
            .with_report_interval(parse_period(
                &lookup,
                "MUTUALS_REPORT_INTERVAL_SECS",
                defaults.report_interval,
            )?);

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            engine,
        })
    }
}

/// Shared state for the node - single storage instance shared by all components.
pub struct NodeState {
    pub storage: Arc<Storage>,
    pub recompute: RecomputeHandle,
    pub ambiguity: AmbiguityPolicy,
}

/// A node instance.
pub struct MutualsNode {
    storage: Arc<Storage>,
    config: NodeConfig,
}

impl MutualsNode {
    /// Create a new node.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = Arc::new(Storage::open_with_batch_limit(
            &config.data_dir,
            config.engine.batch_limit,
        )?);

        Ok(Self { storage, config })
    }

    /// Get shared storage.
    pub fn storage(&self) -> Arc<Storage> {
        Arc::clone(&self.storage)
    }

    /// Run the node (starts engine, admin socket and HTTP server).
    pub async fn run(self) -> Result<()> {
        tracing::info!("Mutuals node starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Data: {:?}", self.config.data_dir);

        let engine = EngineService::start(self.storage(), &self.config.engine);

        let state = Arc::new(NodeState {
            storage: self.storage(),
            recompute: engine.recompute_handle(),
            ambiguity: self.config.engine.ambiguity,
        });

        // Admin socket in the background
        let admin_socket = AdminSocket::new(Arc::clone(&state), &self.config.admin_socket);
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        // Catch up on anything written while the node was down
        engine.recompute_handle().schedule(mutuals_engine::RecomputeTrigger::Manual)?;

        let app = api::build_router(state);
        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(listener, app).await?;

        engine.shutdown();
        Ok(())
    }
}
