use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub login: LoginConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: Option<u16>,
    pub unix_socket: Option<PathBuf>,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_grid_name")]
    pub grid_name: String,
    #[serde(default = "default_grid_nick")]
    pub grid_nick: String,
    #[serde(default = "default_sim_ip")]
    pub sim_ip: String,
    #[serde(default = "default_sim_port")]
    pub sim_port: u16,
    #[serde(default = "default_region_size")]
    pub region_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
    #[serde(default = "default_stale_after")]
    pub stale_after: i64,
    #[serde(default = "default_eviction_grace")]
    pub eviction_grace: i64,
    #[serde(default = "default_first_circuit_code")]
    pub first_circuit_code: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "default_verify_passwords")]
    pub verify_passwords: bool,
    #[serde(default)]
    pub require_tos: bool,
    #[serde(default = "default_tos_message")]
    pub tos_message: String,
    #[serde(default = "default_critical_message")]
    pub critical_message: String,
    /// Unix timestamp of the current critical notice; older acknowledgments are asked again
    #[serde(default)]
    pub critical_notice_updated: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            grid_name: default_grid_name(),
            grid_nick: default_grid_nick(),
            sim_ip: default_sim_ip(),
            sim_port: default_sim_port(),
            region_size: default_region_size(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
            stale_after: default_stale_after(),
            eviction_grace: default_eviction_grace(),
            first_circuit_code: default_first_circuit_code(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            verify_passwords: default_verify_passwords(),
            require_tos: false,
            tos_message: default_tos_message(),
            critical_message: default_critical_message(),
            critical_notice_updated: 0,
        }
    }
}

// Default value functions
fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_base_url() -> String {
    "http://localhost:7768".to_string()
}

fn default_grid_name() -> String {
    "Dark Space".to_string()
}

fn default_grid_nick() -> String {
    "space".to_string()
}

fn default_sim_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_sim_port() -> u16 {
    9000
}

fn default_region_size() -> u32 {
    256
}

fn default_sweep_interval() -> u64 {
    15
}

fn default_stale_after() -> i64 {
    15
}

fn default_eviction_grace() -> i64 {
    3
}

fn default_first_circuit_code() -> u32 {
    1
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_verify_passwords() -> bool {
    true
}

fn default_tos_message() -> String {
    "Please review and accept the Terms of Service.".to_string()
}

fn default_critical_message() -> String {
    "Please review the latest critical notice.".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_console() -> bool {
    false
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port.is_none() && self.server.unix_socket.is_none() {
            bail!("Either port or unix_socket must be specified in server config");
        }

        if let Some(port) = self.server.port {
            if port == 0 {
                bail!("Server port must be greater than 0");
            }
        }

        if self.server.num_threads == 0 {
            bail!("num_threads must be greater than 0");
        }

        if self.grid.base_url.is_empty() {
            bail!("base_url must not be empty");
        }

        if self.grid.region_size == 0 {
            bail!("region_size must be greater than 0");
        }

        if self.presence.sweep_interval == 0 {
            bail!("sweep_interval must be greater than 0");
        }

        if self.presence.stale_after <= 0 {
            bail!("stale_after must be greater than 0");
        }

        if self.presence.eviction_grace <= 0 {
            bail!("eviction_grace must be greater than 0");
        }

        if self.login.critical_notice_updated < 0 {
            bail!("critical_notice_updated must not be negative");
        }

        if self.admin.api_key.is_empty() {
            bail!("api_key must not be empty");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }

    /// Host part of `base_url`, reported to clients as the inventory host.
    pub fn inventory_host(&self) -> &str {
        match self.grid.base_url.find("://") {
            Some(idx) => &self.grid.base_url[idx + 3..],
            None => &self.grid.base_url,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config(data_dir: &std::path::Path) -> Config {
    let toml = format!(
        r#"
        [server]
        port = 7768
        num_threads = 2

        [storage]
        data_dir = "{}"

        [admin]
        api_key = "test-key"

        [logging]
        level = "debug"
        format = "console"
        "#,
        data_dir.display().to_string().replace('\\', "/")
    );

    Config::from_toml_str(&toml).expect("test config must parse")
}
