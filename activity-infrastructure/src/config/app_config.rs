use std::env;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::warn;

use activity_domain::{BackendConfig, ResourceWatch, RuntimeConfig, SeedMode, DEFAULT_SCHEMA};

use super::validation::{validate_identifier, validate_ws_url};

pub const CONFIG_ENV: &str = "ACTIVITY_CONFIG";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WatchEntry {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

impl WatchEntry {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.split_once('.') {
            Some((schema, table)) => Some(Self {
                schema: schema.trim().to_string(),
                table: table.trim().to_string(),
            }),
            None => Some(Self {
                schema: default_schema(),
                table: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_token: Option<String>,
    pub realtime_url: String,
    pub rest_url: String,
    pub api_key: Option<String>,
    pub watches: Vec<WatchEntry>,
    pub capacity: usize,
    pub seed_mode: String,
    pub seed_path: String,
    pub subscribe_timeout_seconds: u64,
    pub retry_initial_millis: u64,
    pub retry_max_millis: u64,
    pub retry_max_attempts: u32,
    pub heartbeat_seconds: u64,
    pub reconnect_delay_seconds: u64,
    pub max_body_bytes: u64,
    pub request_timeout_seconds: u64,
    pub log_dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3240".to_string(),
            api_token: None,
            realtime_url: "ws://127.0.0.1:54321/realtime/v1".to_string(),
            rest_url: "http://127.0.0.1:54321".to_string(),
            api_key: None,
            watches: vec![
                WatchEntry {
                    schema: default_schema(),
                    table: "orders".to_string(),
                },
                WatchEntry {
                    schema: default_schema(),
                    table: "loot_box_opens".to_string(),
                },
            ],
            capacity: 15,
            seed_mode: "none".to_string(),
            seed_path: "./seed.yaml".to_string(),
            subscribe_timeout_seconds: 10,
            retry_initial_millis: 1_000,
            retry_max_millis: 30_000,
            retry_max_attempts: 0,
            heartbeat_seconds: 30,
            reconnect_delay_seconds: 5,
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 15,
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub async fn load() -> Result<Self> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| "./config.toml".to_string());
        Self::load_from(Path::new(&path), |key| env::var(key).ok()).await
    }

    /// Reads `file_path` (defaults when missing), then applies overrides
    /// looked up through `lookup`.
    pub async fn load_from<F>(file_path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_dir = file_path.parent();
        let mut config = if file_path.exists() {
            let content = fs::read_to_string(file_path).await?;
            toml::from_str::<AppConfig>(&content)?
        } else {
            warn!("{} not found, using defaults", file_path.display());
            AppConfig::default()
        };
        config.apply_overrides(lookup);
        config.resolve_paths(base_dir);
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn normalize(&mut self) {
        if let Some(api_token) = &self.api_token {
            if api_token.trim().is_empty() {
                self.api_token = None;
            }
        }
        if let Some(api_key) = &self.api_key {
            if api_key.trim().is_empty() {
                self.api_key = None;
            }
        }
        if let Some(log_dir) = &self.log_dir {
            if log_dir.trim().is_empty() {
                self.log_dir = None;
            }
        }
        self.seed_mode = self.seed_mode.trim().to_lowercase();
        self.realtime_url = self.realtime_url.trim().to_string();
        self.rest_url = self.rest_url.trim().trim_end_matches('/').to_string();

        let mut watches: Vec<WatchEntry> = Vec::with_capacity(self.watches.len());
        for entry in std::mem::take(&mut self.watches) {
            let entry = WatchEntry {
                schema: entry.schema.trim().to_lowercase(),
                table: entry.table.trim().to_lowercase(),
            };
            if !watches.contains(&entry) {
                watches.push(entry);
            }
        }
        self.watches = watches;
    }

    fn resolve_paths(&mut self, base_dir: Option<&Path>) {
        let Some(base) = base_dir else {
            return;
        };
        self.seed_path = resolve_path(base, &self.seed_path);
        if let Some(log_dir) = &self.log_dir {
            self.log_dir = Some(resolve_path(base, log_dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|err| anyhow!("invalid bind_addr: {}", err))?;
        validate_ws_url(&self.realtime_url)?;
        if self.capacity == 0 {
            return Err(anyhow!("capacity must be greater than 0"));
        }
        if self.watches.is_empty() {
            return Err(anyhow!("at least one watch is required"));
        }
        for entry in &self.watches {
            validate_identifier(&entry.schema)
                .map_err(|err| anyhow!("invalid watch schema: {}", err))?;
            validate_identifier(&entry.table)
                .map_err(|err| anyhow!("invalid watch table: {}", err))?;
        }
        if !matches!(self.seed_mode.as_str(), "none" | "file" | "rest") {
            return Err(anyhow!(
                "seed_mode must be one of none, file, rest (got '{}')",
                self.seed_mode
            ));
        }
        if self.seed_mode == "rest" && self.rest_url.is_empty() {
            return Err(anyhow!("rest_url must not be empty when seed_mode is rest"));
        }
        if self.retry_max_millis < self.retry_initial_millis {
            return Err(anyhow!("retry_max_millis must be >= retry_initial_millis"));
        }
        if self.max_body_bytes == 0 {
            return Err(anyhow!("max_body_bytes must be greater than 0"));
        }
        Ok(())
    }

    pub fn resource_watches(&self) -> Vec<ResourceWatch> {
        self.watches
            .iter()
            .map(|entry| ResourceWatch::inserts_in(&entry.schema, &entry.table))
            .collect()
    }

    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: self.bind_addr.clone(),
            api_token: self.api_token.clone(),
            capacity: self.capacity,
            watches: self.resource_watches(),
            seed_mode: SeedMode::from(self.seed_mode.as_str()),
            seed_path: self.seed_path.clone(),
            subscribe_timeout_seconds: self.subscribe_timeout_seconds,
            retry_initial_millis: self.retry_initial_millis,
            retry_max_millis: self.retry_max_millis,
            retry_max_attempts: self.retry_max_attempts,
            max_body_bytes: self.max_body_bytes,
            request_timeout_seconds: self.request_timeout_seconds,
        }
    }

    pub fn to_backend_config(&self) -> BackendConfig {
        BackendConfig {
            realtime_url: self.realtime_url.clone(),
            rest_url: self.rest_url.clone(),
            api_key: self.api_key.clone(),
            heartbeat_seconds: self.heartbeat_seconds,
            reconnect_delay_seconds: self.reconnect_delay_seconds,
        }
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ACTIVITY_BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Some(value) = lookup("ACTIVITY_API_TOKEN") {
            self.api_token = Some(value);
        }
        if let Some(value) = lookup("ACTIVITY_REALTIME_URL") {
            self.realtime_url = value;
        }
        if let Some(value) = lookup("ACTIVITY_REST_URL") {
            self.rest_url = value;
        }
        if let Some(value) = lookup("ACTIVITY_API_KEY") {
            self.api_key = Some(value);
        }
        if let Some(value) = lookup("ACTIVITY_WATCHES") {
            self.watches = value.split(',').filter_map(WatchEntry::parse).collect();
        }
        if let Some(value) = lookup("ACTIVITY_CAPACITY") {
            self.capacity = value.parse().unwrap_or(self.capacity);
        }
        if let Some(value) = lookup("ACTIVITY_SEED_MODE") {
            self.seed_mode = value;
        }
        if let Some(value) = lookup("ACTIVITY_SEED_PATH") {
            self.seed_path = value;
        }
        if let Some(value) = lookup("ACTIVITY_SUBSCRIBE_TIMEOUT_SECONDS") {
            self.subscribe_timeout_seconds =
                value.parse().unwrap_or(self.subscribe_timeout_seconds);
        }
        if let Some(value) = lookup("ACTIVITY_RETRY_INITIAL_MILLIS") {
            self.retry_initial_millis = value.parse().unwrap_or(self.retry_initial_millis);
        }
        if let Some(value) = lookup("ACTIVITY_RETRY_MAX_MILLIS") {
            self.retry_max_millis = value.parse().unwrap_or(self.retry_max_millis);
        }
        if let Some(value) = lookup("ACTIVITY_RETRY_MAX_ATTEMPTS") {
            self.retry_max_attempts = value.parse().unwrap_or(self.retry_max_attempts);
        }
        if let Some(value) = lookup("ACTIVITY_HEARTBEAT_SECONDS") {
            self.heartbeat_seconds = value.parse().unwrap_or(self.heartbeat_seconds);
        }
        if let Some(value) = lookup("ACTIVITY_RECONNECT_DELAY_SECONDS") {
            self.reconnect_delay_seconds = value.parse().unwrap_or(self.reconnect_delay_seconds);
        }
        if let Some(value) = lookup("ACTIVITY_MAX_BODY_BYTES") {
            self.max_body_bytes = value.parse().unwrap_or(self.max_body_bytes);
        }
        if let Some(value) = lookup("ACTIVITY_REQUEST_TIMEOUT_SECONDS") {
            self.request_timeout_seconds = value.parse().unwrap_or(self.request_timeout_seconds);
        }
        if let Some(value) = lookup("ACTIVITY_LOG_DIR") {
            self.log_dir = Some(value);
        }
    }
}

fn resolve_path(base: &Path, value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return trimmed.to_string();
    }
    let path = Path::new(trimmed);
    if path.is_absolute() {
        trimmed.to_string()
    } else {
        base.join(path).to_string_lossy().to_string()
    }
}
