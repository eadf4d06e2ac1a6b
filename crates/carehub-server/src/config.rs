use carehub_auth::config::AuthConfig;
use carehub_auth::pin::validate_pin;
use carehub_auth::types::{Flavour, UserType};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Lockout, session and OAuth configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Demo data loaded into the memory backend at startup
    #[serde(default)]
    pub seed: SeedConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Storage validation
        if self.storage.backend == StorageBackend::Postgres {
            match &self.storage.postgres {
                Some(pg) if !pg.url.is_empty() => {}
                _ => return Err("storage.backend=postgres requires storage.postgres.url".into()),
            }
        }
        // Auth validation
        self.auth.validate().map_err(|e| e.to_string())?;
        // Seed validation
        for user in &self.seed.users {
            validate_pin(&user.pin)
                .map_err(|e| format!("seed user '{}': {e}", user.username))?;
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for the collaborator calls made while serving one request.
    pub request_timeout_ms: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub postgres: Option<PostgresStorageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresStorageConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

// =============================================================================
// Seed Data
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SeedConfig {
    pub users: Vec<SeedUser>,
    pub programs: Vec<SeedProgram>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    pub user_type: UserType,
    #[serde(default)]
    pub is_superuser: bool,
    /// Plaintext PIN, hashed when the seed is applied.
    pub pin: String,
    #[serde(default = "default_flavours")]
    pub flavours: Vec<Flavour>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn default_flavours() -> Vec<Flavour> {
    vec![Flavour::Pro]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedProgram {
    pub id: String,
    pub name: String,
    pub organisation_id: String,
    #[serde(default)]
    pub facilities: Vec<SeedFacility>,
    #[serde(default)]
    pub staff: Vec<SeedStaff>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedFacility {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedStaff {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub default_facility_id: Option<String>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("carehub.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }
        // Environment variable overrides, e.g., CAREHUB__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("CAREHUB")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
