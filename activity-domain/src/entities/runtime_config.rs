// Runtime configuration entities
// Plain settings handed from the infrastructure config loader to the other layers

use crate::value_objects::ResourceWatch;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: String,
    pub api_token: Option<String>,
    pub capacity: usize,
    pub watches: Vec<ResourceWatch>,
    pub seed_mode: SeedMode,
    pub seed_path: String,
    pub subscribe_timeout_seconds: u64,
    pub retry_initial_millis: u64,
    pub retry_max_millis: u64,
    pub retry_max_attempts: u32,
    pub max_body_bytes: u64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub realtime_url: String,
    pub rest_url: String,
    pub api_key: Option<String>,
    pub heartbeat_seconds: u64,
    pub reconnect_delay_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedMode {
    #[default]
    None,
    File,
    Rest,
}

impl From<&str> for SeedMode {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "file" => SeedMode::File,
            "rest" | "remote" => SeedMode::Rest,
            _ => SeedMode::None,
        }
    }
}

impl SeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeedMode::None => "none",
            SeedMode::File => "file",
            SeedMode::Rest => "rest",
        }
    }
}
