use anyhow::{anyhow, Context, Result};
use cairn_files::{
    FileRegistry, MemoryRegistryStore, RegistryConfig, RegistryStore, RetentionPolicy,
    DEFAULT_MAX_FILE_SIZE_BYTES, DEFAULT_SIMILARITY_THRESHOLD,
};
use cairn_rpc::{start_server, AppState, DEFAULT_IDENTITY_HEADER};
use cairn_storage::SledRegistryStore;
use clap::{value_parser, Arg, ArgAction, Command};
use config::{Config, File as ConfigFile};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod version;

use version::{git_commit_hash, CAIRN_VERSION};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const DEFAULT_NODE_ID: &str = "cairn-node";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_FORMAT: &str = "pretty";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageBackend {
    Memory,
    Sled,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sled" => Ok(StorageBackend::Sled),
            other => Err(anyhow!(
                "Unknown STORAGE_BACKEND '{other}'; expected 'memory' or 'sled'"
            )),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Sled => "sled",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone)]
struct AppConfig {
    config_path: Option<PathBuf>,
    node_id: String,
    rpc_host: String,
    rpc_port: u16,
    rpc_allowed_origins: Vec<String>,
    identity_header: String,
    storage_backend: StorageBackend,
    data_dir: String,
    db_path: String,
    similarity_threshold: u8,
    retention_policy: RetentionPolicy,
    max_file_size_bytes: usize,
    prometheus_enabled: bool,
    log_level: String,
    log_format: String,
}

impl AppConfig {
    fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                Some(path)
            } else {
                None
            }
        };

        let mut builder = Config::builder();

        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }

        builder = builder.add_source(config::Environment::with_prefix("CAIRN"));

        let config = builder.build()?;

        let data_dir = get_string_value(&config, &["DATA_DIR", "storage.data_dir"])
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let db_path = get_string_value(&config, &["DB_PATH", "storage.db_path"])
            .unwrap_or_else(|| format!("{data_dir}/registry"));

        let rpc_allowed_origins: Vec<String> =
            get_string_value(&config, &["RPC_ALLOWED_ORIGINS", "rpc.allowed_origins"])
                .unwrap_or_default()
                .split(',')
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect();

        Ok(Self {
            config_path: resolved_path,
            node_id: get_string_value(&config, &["NODE_ID", "node.id"])
                .unwrap_or_else(|| DEFAULT_NODE_ID.to_string()),
            rpc_host: get_string_value(&config, &["RPC_HOST", "rpc.host", "rpc.bind"])
                .unwrap_or_else(|| DEFAULT_RPC_HOST.to_string()),
            rpc_port: get_string_value(&config, &["RPC_PORT", "rpc.port"])
                .unwrap_or_else(|| DEFAULT_RPC_PORT.to_string())
                .parse()
                .context("RPC_PORT must be a port number")?,
            rpc_allowed_origins,
            identity_header: get_string_value(
                &config,
                &["IDENTITY_HEADER", "rpc.identity_header"],
            )
            .unwrap_or_else(|| DEFAULT_IDENTITY_HEADER.to_string())
            .to_lowercase(),
            storage_backend: get_string_value(&config, &["STORAGE_BACKEND", "storage.backend"])
                .unwrap_or_else(|| "sled".to_string())
                .parse()?,
            data_dir,
            db_path,
            similarity_threshold: get_string_value(
                &config,
                &["SIMILARITY_THRESHOLD", "registry.similarity_threshold"],
            )
            .unwrap_or_else(|| DEFAULT_SIMILARITY_THRESHOLD.to_string())
            .parse()
            .context("SIMILARITY_THRESHOLD must be an integer between 0 and 100")?,
            retention_policy: get_string_value(
                &config,
                &["RETENTION_POLICY", "registry.retention_policy"],
            )
            .map(|value| value.parse::<RetentionPolicy>())
            .transpose()?
            .unwrap_or_default(),
            max_file_size_bytes: get_string_value(
                &config,
                &["MAX_FILE_SIZE_BYTES", "registry.max_file_size_bytes"],
            )
            .unwrap_or_else(|| DEFAULT_MAX_FILE_SIZE_BYTES.to_string())
            .parse()
            .context("MAX_FILE_SIZE_BYTES must be a byte count")?,
            prometheus_enabled: get_bool_value(
                &config,
                &["PROMETHEUS_ENABLED", "metrics.enabled"],
                true,
            ),
            log_level: get_string_value(&config, &["LOG_LEVEL", "log.level"])
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: get_string_value(&config, &["LOG_FORMAT", "log.format"])
                .unwrap_or_else(|| DEFAULT_LOG_FORMAT.to_string()),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            anyhow::bail!("NODE_ID must not be empty");
        }
        if self.rpc_port == 0 {
            anyhow::bail!("RPC_PORT must be greater than zero");
        }
        if self.identity_header.is_empty()
            || !self
                .identity_header
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!(
                "IDENTITY_HEADER '{}' is not a valid header name",
                self.identity_header
            );
        }
        if self.storage_backend == StorageBackend::Sled {
            if self.data_dir.trim().is_empty() {
                anyhow::bail!("DATA_DIR must not be empty");
            }
            if self.db_path.trim().is_empty() {
                anyhow::bail!("DB_PATH must not be empty");
            }
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            anyhow::bail!(
                "LOG_FORMAT '{}' is not supported; expected 'pretty' or 'json'",
                self.log_format
            );
        }
        self.registry_config()
            .validate()
            .map_err(|err| anyhow!("{err}"))?;
        Ok(())
    }

    fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            similarity_threshold: self.similarity_threshold,
            retention: self.retention_policy,
            max_file_size_bytes: self.max_file_size_bytes,
        }
    }

    fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_host, self.rpc_port)
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_bool_value(config: &Config, keys: &[&str], default: bool) -> bool {
    for key in keys {
        if let Ok(value) = config.get_bool(key) {
            return value;
        }
        if let Ok(raw) = config.get_string(key) {
            if let Ok(parsed) = raw.parse::<bool>() {
                return parsed;
            }
        }
    }
    default
}

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|value| value.as_str());
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config)?;
    config.validate()?;
    Ok(config)
}

fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) -> Result<()> {
    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        config.data_dir = data_dir.clone();
        config.db_path = format!("{data_dir}/registry");
    }

    if let Some(storage) = matches.get_one::<String>("storage") {
        config.storage_backend = storage.parse()?;
    }

    if let Some(policy) = matches.get_one::<String>("retention-policy") {
        config.retention_policy = policy.parse().map_err(|err| anyhow!("{err}"))?;
    }

    if let Some(threshold) = matches.get_one::<u8>("similarity-threshold") {
        config.similarity_threshold = *threshold;
    }

    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }

    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }

    if let Some(rpc_host) = matches.get_one::<String>("rpc-host") {
        config.rpc_host = rpc_host.clone();
    }

    if let Some(rpc_port) = matches.get_one::<u16>("rpc-port") {
        config.rpc_port = *rpc_port;
    }

    if matches.get_flag("disable-metrics") {
        config.prometheus_enabled = false;
    }

    Ok(())
}

async fn check_status(config: &AppConfig, health_path: &str) -> Result<()> {
    let mut path = health_path.to_string();
    if !path.starts_with('/') {
        path = format!("/{path}");
    }
    let host = if config.rpc_host == "0.0.0.0" {
        "127.0.0.1"
    } else {
        config.rpc_host.as_str()
    };
    let url = format!("http://{}:{}{}", host, config.rpc_port, path);
    let response = reqwest::Client::new().get(&url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    println!("GET {url} -> {status}");
    println!("{body}");
    if status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Health check failed with status {status}")
    }
}

fn build_cli() -> Command {
    Command::new("cairn-node")
        .version(CAIRN_VERSION)
        .about("Cairn content-addressed file registry node")
        .disable_version_flag(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .global(true),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory for the sled backend")
                .global(true),
        )
        .arg(
            Arg::new("storage")
                .long("storage")
                .value_name("BACKEND")
                .value_parser(["memory", "sled"])
                .help("Registry storage backend")
                .global(true),
        )
        .arg(
            Arg::new("retention-policy")
                .long("retention-policy")
                .value_name("POLICY")
                .value_parser(["permanent", "reclaim-orphans"])
                .help("What happens to a content claim once its owner deletes every copy")
                .global(true),
        )
        .arg(
            Arg::new("similarity-threshold")
                .long("similarity-threshold")
                .value_name("PERCENT")
                .value_parser(value_parser!(u8).range(0..=100))
                .help("Default minimum similarity for fingerprint searches")
                .global(true),
        )
        .arg(
            Arg::new("version_flag")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print detailed version information and exit")
                .global(true),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Run configuration and environment self-checks, then exit")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level")
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format")
                .global(true),
        )
        .arg(
            Arg::new("rpc-host")
                .long("rpc-host")
                .value_name("HOST")
                .help("Override RPC bind host (defaults to config value)")
                .global(true),
        )
        .arg(
            Arg::new("rpc-port")
                .long("rpc-port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override RPC port")
                .global(true),
        )
        .arg(
            Arg::new("disable-metrics")
                .long("disable-metrics")
                .action(ArgAction::SetTrue)
                .help("Disable the Prometheus metrics exporter")
                .global(true),
        )
        .subcommand(Command::new("start").about("Start the Cairn node using the provided configuration"))
        .subcommand(
            Command::new("status")
                .about("Check the /health endpoint for a running node")
                .arg(
                    Arg::new("health-path")
                        .long("health-path")
                        .value_name("PATH")
                        .default_value("/health")
                        .help("Health endpoint path to query"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    if let Some(status_matches) = matches.subcommand_matches("status") {
        let config = load_config_with_overrides(status_matches)?;
        let health_path = status_matches
            .get_one::<String>("health-path")
            .map(|value| value.as_str())
            .unwrap_or("/health");
        check_status(&config, health_path).await?;
        return Ok(());
    }

    let run_matches = matches.subcommand_matches("start").unwrap_or(&matches);
    let config = load_config_with_overrides(run_matches)?;

    if run_matches.get_flag("version_flag") {
        print_version_info(&config);
        return Ok(());
    }

    if run_matches.get_flag("check") {
        return run_self_check(&config);
    }

    init_logging(&config)?;
    cairn_time::init();
    let prometheus_handle = init_metrics(&config);

    info!(
        version = CAIRN_VERSION,
        commit = git_commit_hash(),
        node_id = %config.node_id,
        config = ?config.config_path,
        "Starting Cairn node"
    );

    let store = open_store(&config)?;
    let registry = Arc::new(
        FileRegistry::new(store, config.registry_config())
            .map_err(|err| anyhow!("failed to initialise registry: {err}"))?,
    );
    info!(
        backend = registry.backend_name(),
        retention = %config.retention_policy,
        similarity_threshold = config.similarity_threshold,
        max_file_size_bytes = config.max_file_size_bytes,
        "File registry ready"
    );

    let mut app_state = AppState::new(registry.clone(), config.node_id.clone());
    app_state.identity_header = config.identity_header.clone();
    app_state.allowed_origins = config.rpc_allowed_origins.clone();
    app_state.metrics = prometheus_handle;

    let rpc_addr = config.rpc_addr();
    let rpc_addr_clone = rpc_addr.clone();
    info!("Starting RPC server on {}", rpc_addr);

    let mut rpc_handle =
        tokio::spawn(async move { start_server(app_state, &rpc_addr_clone).await });

    info!("Cairn node is ready and running");
    info!("RPC API available at: http://{}", rpc_addr);
    info!(
        "Caller identity is read from the '{}' header",
        config.identity_header
    );

    let mut server_error = None;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Shutting down Cairn node");
            rpc_handle.abort();
        }
        joined = &mut rpc_handle => {
            match joined {
                Ok(Ok(())) => warn!("RPC server stopped"),
                Ok(Err(err)) => {
                    error!("RPC server error: {:#}", err);
                    server_error = Some(err);
                }
                Err(err) => {
                    error!("RPC server task failed: {}", err);
                    server_error = Some(anyhow!("RPC server task failed: {err}"));
                }
            }
        }
    }

    registry
        .flush()
        .map_err(|err| anyhow!("failed to flush registry storage: {err}"))?;

    match server_error {
        Some(err) => Err(err),
        None => {
            info!("Cairn node shutdown complete");
            Ok(())
        }
    }
}

fn open_store(config: &AppConfig) -> Result<Arc<dyn RegistryStore>> {
    match config.storage_backend {
        StorageBackend::Memory => {
            warn!("Using in-memory registry storage; state is lost on shutdown");
            Ok(Arc::new(MemoryRegistryStore::new()))
        }
        StorageBackend::Sled => {
            fs::create_dir_all(&config.data_dir)
                .with_context(|| format!("failed to create data directory {}", config.data_dir))?;
            let store = SledRegistryStore::new(&config.db_path)
                .with_context(|| format!("failed to open registry database {}", config.db_path))?;
            Ok(Arc::new(store))
        }
    }
}

fn init_metrics(config: &AppConfig) -> Option<PrometheusHandle> {
    if !config.prometheus_enabled {
        info!("Prometheus metrics exporter disabled via configuration");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics exporter registered");
            describe_counter!("cairn_uploads_total", "Uploads committed to a catalog");
            describe_counter!(
                "cairn_duplicate_rejections_total",
                "Uploads rejected because another identity owns the content"
            );
            describe_counter!("cairn_deletes_total", "Catalog entries deleted");
            describe_counter!(
                "cairn_similarity_queries_total",
                "Fingerprint similarity scans served"
            );
            describe_gauge!(
                "cairn_registry_entries",
                "Distinct content hashes in the global registry"
            );
            Some(handle)
        }
        Err(err) => {
            warn!("Failed to install Prometheus metrics exporter: {}", err);
            None
        }
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    Ok(())
}

fn print_version_info(config: &AppConfig) {
    println!(
        "Cairn {} (commit {}) [{} storage]",
        CAIRN_VERSION,
        git_commit_hash(),
        config.storage_backend
    );
}

fn run_self_check(config: &AppConfig) -> Result<()> {
    println!("Running Cairn node self-check...");
    let mut issues = Vec::new();

    if let Err(err) = config.validate() {
        issues.push(err.to_string());
    }

    if let Err(err) = ensure_port_available(&config.rpc_host, config.rpc_port, "RPC") {
        issues.push(err);
    }

    if config.storage_backend == StorageBackend::Sled {
        if let Err(err) = ensure_storage_directory(&config.data_dir) {
            issues.push(err);
        }
    }

    if issues.is_empty() {
        println!("OK");
        Ok(())
    } else {
        for issue in &issues {
            eprintln!("- {issue}");
        }
        anyhow::bail!("self-check failed")
    }
}

fn ensure_port_available(host: &str, port: u16, label: &str) -> Result<(), String> {
    let addr = format!("{host}:{port}");
    match TcpListener::bind(&addr) {
        Ok(listener) => drop(listener),
        Err(err) => {
            return Err(format!(
                "{label} port {addr} is not available for binding: {err}"
            ))
        }
    }
    Ok(())
}

fn ensure_storage_directory(path: &str) -> Result<(), String> {
    let dir = Path::new(path);
    if !dir.exists() {
        return Err(format!(
            "Storage directory {} does not exist; create it before starting the node",
            dir.display()
        ));
    }
    if !dir.is_dir() {
        return Err(format!("Storage path {} is not a directory", dir.display()));
    }

    let probe = dir.join(".cairn_write_test");
    match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&probe)
    {
        Ok(mut file) => {
            if let Err(err) = file.write_all(b"ok") {
                return Err(format!("Unable to write into {}: {}", dir.display(), err));
            }
        }
        Err(err) => {
            return Err(format!(
                "Unable to open {} for writing: {}",
                dir.display(),
                err
            ));
        }
    }
    let _ = fs::remove_file(&probe);
    Ok(())
}
