//! Tessera Server State
//!
//! Application state shared across request handlers: the descriptor
//! registry, the content store, the access policy and the link provider.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::config::ServerConfig;
use axum::http::HeaderMap;
use std::path::Path;
use std::sync::Arc;
use tessera_common::{Result, TesseraError};
use tessera_normalizer::{Denormalizer, DocumentBuilder, UrlLinkProvider};
use tessera_query::SparseFieldsets;
use tessera_resource::{
    AccessPolicy, Account, AllowAll, ContentItem, ContentStore, DescriptorRegistry, MemoryStore,
    ResourceDescriptor, RolePolicy,
};

/// Header carrying the authenticated account id.
pub const ACCOUNT_ID_HEADER: &str = "x-account-id";

/// Header carrying the account's comma-separated roles.
pub const ACCOUNT_ROLES_HEADER: &str = "x-account-roles";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<DescriptorRegistry>,
    pub store: Arc<dyn ContentStore>,
    pub policy: Arc<dyn AccessPolicy>,
    pub links: Arc<UrlLinkProvider>,
}

impl AppState {
    /// Create application state, seeding the store from `data_file` if set.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let items = match &config.data_file {
            Some(path) => load_seed(path)?,
            None => Vec::new(),
        };
        let store = MemoryStore::with_items(items)?;
        tracing::info!("Content store ready with {} items", store.count());
        Self::with_store(config, Arc::new(store))
    }

    /// Create application state around an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<dyn ContentStore>) -> Result<Self> {
        config.api.validate()?;
        let registry = DescriptorRegistry::new(config.resources.clone())?;
        tracing::info!("Registered {} resource types", registry.len());

        let policy: Arc<dyn AccessPolicy> = if config.roles.is_empty() {
            tracing::warn!("No roles configured, every request is allowed");
            Arc::new(AllowAll)
        } else {
            Arc::new(RolePolicy::new(config.roles.clone()))
        };

        Ok(Self {
            links: Arc::new(UrlLinkProvider::new(&config.api)),
            config: Arc::new(config),
            registry: Arc::new(registry),
            store,
            policy,
        })
    }

    /// Descriptor of a routable resource type.
    pub fn descriptor(&self, public_type: &str) -> Result<Arc<ResourceDescriptor>> {
        self.registry
            .by_public_type(public_type)
            .filter(|d| d.is_locatable())
            .ok_or_else(|| {
                TesseraError::NotFound(format!("The resource type `{}` does not exist.", public_type))
            })
    }

    /// Load an item of `descriptor`'s subtype.
    pub fn load_item(&self, descriptor: &ResourceDescriptor, id: &str) -> Result<ContentItem> {
        self.store
            .load(descriptor.entity_type(), id)?
            .filter(|item| item.subtype == descriptor.subtype())
            .ok_or_else(|| {
                TesseraError::NotFound(format!(
                    "The {} resource `{}` does not exist.",
                    descriptor.public_type(),
                    id
                ))
            })
    }

    pub fn builder<'a>(&'a self, account: &'a Account, fields: &'a SparseFieldsets) -> DocumentBuilder<'a> {
        DocumentBuilder::new(
            &self.registry,
            self.store.as_ref(),
            self.policy.as_ref(),
            self.links.as_ref(),
            account,
            fields,
        )
    }

    pub fn denormalizer<'a>(&'a self, account: &'a Account) -> Denormalizer<'a> {
        Denormalizer::new(&self.registry, self.store.as_ref(), self.policy.as_ref(), account)
    }
}

/// Resolve the requesting account from trusted upstream headers.
pub fn account_from_headers(headers: &HeaderMap) -> Account {
    let id = headers
        .get(ACCOUNT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let Some(id) = id else {
        return Account::anonymous();
    };
    let roles: Vec<String> = headers
        .get(ACCOUNT_ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Account::authenticated(id, roles)
}

fn load_seed(path: impl AsRef<Path>) -> Result<Vec<ContentItem>> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)?;
    let items: Vec<ContentItem> = serde_json::from_str(&data).map_err(|e| {
        TesseraError::Configuration(format!("invalid seed data in {}: {}", path.display(), e))
    })?;
    tracing::info!("Loaded {} content items from {}", items.len(), path.display());
    Ok(items)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use tessera_resource::{FieldDefinition, ResourceDefinition};

    #[test]
    fn test_account_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(account_from_headers(&headers).is_anonymous());

        headers.insert(ACCOUNT_ID_HEADER, HeaderValue::from_static("42"));
        headers.insert(ACCOUNT_ROLES_HEADER, HeaderValue::from_static("editor, reviewer,"));
        let account = account_from_headers(&headers);
        assert_eq!(account.id.as_deref(), Some("42"));
        assert!(account.roles.contains("editor"));
        assert!(account.roles.contains("reviewer"));
        assert_eq!(account.roles.len(), 2);
    }

    #[test]
    fn test_descriptor_lookup() {
        let config = ServerConfig::default().with_resources(vec![
            ResourceDefinition::new("node", "article").field(FieldDefinition::attribute("title")),
            ResourceDefinition::new("path", "alias").internal(),
        ]);
        let state = AppState::new(config).unwrap();
        assert!(state.descriptor("node--article").is_ok());
        assert_eq!(state.descriptor("path--alias").unwrap_err().status_code(), 404);
        assert_eq!(state.descriptor("nope").unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_load_item_checks_subtype() {
        let config = ServerConfig::default().with_resources(vec![
            ResourceDefinition::new("node", "article"),
            ResourceDefinition::new("node", "page"),
        ]);
        let store = MemoryStore::with_items(vec![ContentItem::new("node", "page", "p1")]).unwrap();
        let state = AppState::with_store(config, Arc::new(store)).unwrap();

        let page = state.descriptor("node--page").unwrap();
        let article = state.descriptor("node--article").unwrap();
        assert!(state.load_item(&page, "p1").is_ok());
        assert_eq!(state.load_item(&article, "p1").unwrap_err().status_code(), 404);
    }
}
