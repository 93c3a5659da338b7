//! Tessera Config - API Configuration
//!
//! Settings consumed by the query compilers and the document assembler.
//! Loadable from TOML or constructed programmatically.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::cacheability::MaxAge;
use crate::error::{Result, TesseraError};
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// API Configuration
// =============================================================================

/// Configuration for the JSON:API surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Path prefix every resource route lives under.
    pub base_path: String,
    /// Absolute origin used when generating links, e.g. `http://localhost:3000`.
    pub base_url: String,
    /// Upper bound for `page[size]`; larger requests are clamped silently.
    pub max_page_size: usize,
    pub default_page_size: usize,
    /// Reject every write with 405 when set.
    pub read_only: bool,
    /// Max-age applied to every rendered document before node metadata is merged.
    pub default_max_age: MaxAge,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: "/jsonapi".to_string(),
            base_url: "http://localhost:3000".to_string(),
            max_page_size: 50,
            default_page_size: 50,
            read_only: false,
            default_max_age: MaxAge::Permanent,
        }
    }
}

impl ApiConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| TesseraError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make pagination meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 {
            return Err(TesseraError::Configuration(
                "max_page_size must be greater than zero".to_string(),
            ));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(TesseraError::Configuration(format!(
                "default_page_size must be between 1 and {}",
                self.max_page_size
            )));
        }
        if !self.base_path.starts_with('/') {
            return Err(TesseraError::Configuration(
                "base_path must start with '/'".to_string(),
            ));
        }
        Ok(())
    }

    /// Absolute URL prefix for resource links.
    pub fn link_prefix(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.base_path.trim_end_matches('/')
        )
    }

    pub fn with_max_page_size(mut self, max: usize) -> Self {
        self.max_page_size = max;
        self.default_page_size = self.default_page_size.min(max);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
