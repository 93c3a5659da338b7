//! Tessera Server Configuration
//!
//! Binding, schema, roles and seed data for one server instance. Loaded
//! from TOML; every field has a default so partial files are accepted.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tessera_common::{ApiConfig, Result, TesseraError};
use tessera_resource::{ResourceDefinition, RoleDefinition};

// =============================================================================
// Server Configuration
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub body_limit_bytes: usize,
    pub api: ApiConfig,
    /// Exposed resource subtypes.
    pub resources: Vec<ResourceDefinition>,
    /// Roles for the role policy. Without roles every request is allowed.
    pub roles: Vec<RoleDefinition>,
    /// JSON array of content items seeding the in-memory store.
    pub data_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            enable_cors: true,
            body_limit_bytes: 2 * 1024 * 1024, // 2MB
            api: ApiConfig::default(),
            resources: Vec::new(),
            roles: Vec::new(),
            data_file: None,
        }
    }
}

impl ServerConfig {
    /// Create a new server config with the specified host and port.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| TesseraError::Configuration(e.to_string()))?;
        config.api.validate()?;
        Ok(config)
    }

    /// Get the socket address for binding.
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], self.port)))
    }

    pub fn with_resources(mut self, resources: Vec<ResourceDefinition>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_roles(mut self, roles: Vec<RoleDefinition>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_data_file(mut self, data_file: Option<String>) -> Self {
        if data_file.is_some() {
            self.data_file = data_file;
        }
        self
    }

    pub fn with_api(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
