//! Tessera Content Store
//!
//! The storage collaborator consumed by the document core, plus a
//! thread-safe in-memory implementation used by the server and tests.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::item::{ContentItem, FieldItem};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tessera_common::{Result, TesseraError};

type ItemKey = (String, String);

// =============================================================================
// Content Store Trait
// =============================================================================

/// Storage collaborator. All calls are synchronous from the core's view.
pub trait ContentStore: Send + Sync {
    /// Load one item by `(entity_type, id)`.
    fn load(&self, entity_type: &str, id: &str) -> Result<Option<ContentItem>>;

    /// Every item of a subtype, in storage order.
    fn scan(&self, entity_type: &str, subtype: &str) -> Result<Vec<ContentItem>>;

    /// Persist a new item. Fails with `Conflict` if the identity is taken.
    fn create(&self, item: ContentItem) -> Result<()>;

    /// Replace an existing item. Fails with `NotFound` if it is missing.
    fn update(&self, item: ContentItem) -> Result<()>;

    /// Remove an item, returning it.
    fn delete(&self, entity_type: &str, id: &str) -> Result<ContentItem>;

    /// Load several items, preserving the order of `ids` and skipping
    /// identifiers that no longer resolve.
    fn load_multiple(&self, entity_type: &str, ids: &[String]) -> Result<Vec<ContentItem>> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.load(entity_type, id)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Field values of an item keyed by internal name.
    fn read_fields(&self, item: &ContentItem) -> BTreeMap<String, Vec<FieldItem>> {
        item.fields.clone()
    }
}

// =============================================================================
// Memory Store
// =============================================================================

#[derive(Default)]
struct StoreInner {
    items: HashMap<ItemKey, ContentItem>,
    sequence: Vec<ItemKey>,
}

/// In-memory content store keeping insertion order.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with items.
    pub fn with_items(items: Vec<ContentItem>) -> Result<Self> {
        let store = Self::new();
        for item in items {
            store.create(item)?;
        }
        Ok(store)
    }

    pub fn count(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

impl ContentStore for MemoryStore {
    fn load(&self, entity_type: &str, id: &str) -> Result<Option<ContentItem>> {
        let key = (entity_type.to_string(), id.to_string());
        Ok(self.inner.read().items.get(&key).cloned())
    }

    fn scan(&self, entity_type: &str, subtype: &str) -> Result<Vec<ContentItem>> {
        let inner = self.inner.read();
        Ok(inner
            .sequence
            .iter()
            .filter_map(|key| inner.items.get(key))
            .filter(|item| item.entity_type == entity_type && item.subtype == subtype)
            .cloned()
            .collect())
    }

    fn create(&self, item: ContentItem) -> Result<()> {
        let key = (item.entity_type.clone(), item.id.clone());
        let mut inner = self.inner.write();
        if inner.items.contains_key(&key) {
            return Err(TesseraError::Conflict(format!(
                "{} '{}' already exists",
                item.entity_type, item.id
            )));
        }
        inner.sequence.push(key.clone());
        inner.items.insert(key, item);
        Ok(())
    }

    fn update(&self, mut item: ContentItem) -> Result<()> {
        let key = (item.entity_type.clone(), item.id.clone());
        let mut inner = self.inner.write();
        match inner.items.get_mut(&key) {
            Some(existing) => {
                item.created = existing.created;
                item.changed = Utc::now();
                *existing = item;
                Ok(())
            }
            None => Err(TesseraError::NotFound(format!(
                "{} '{}' does not exist",
                item.entity_type, item.id
            ))),
        }
    }

    fn delete(&self, entity_type: &str, id: &str) -> Result<ContentItem> {
        let key = (entity_type.to_string(), id.to_string());
        let mut inner = self.inner.write();
        let item = inner.items.remove(&key).ok_or_else(|| {
            TesseraError::NotFound(format!("{} '{}' does not exist", entity_type, id))
        })?;
        inner.sequence.retain(|k| k != &key);
        Ok(item)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crud() {
        let store = MemoryStore::new();
        store
            .create(ContentItem::new("node", "article", "a1").with_value("title", "One"))
            .unwrap();
        assert_eq!(store.count(), 1);

        let loaded = store.load("node", "a1").unwrap().unwrap();
        assert_eq!(loaded.first_value("title").and_then(|v| v.as_str()), Some("One"));

        let updated = loaded.clone().with_value("body", "text");
        store.update(updated).unwrap();
        let loaded = store.load("node", "a1").unwrap().unwrap();
        assert!(loaded.first_value("body").is_some());

        store.delete("node", "a1").unwrap();
        assert!(store.load("node", "a1").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_conflict_on_duplicate_create() {
        let store = MemoryStore::new();
        store.create(ContentItem::new("node", "article", "a1")).unwrap();
        let err = store.create(ContentItem::new("node", "page", "a1")).unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_missing_items() {
        let store = MemoryStore::new();
        assert_eq!(
            store.update(ContentItem::new("node", "article", "x")).unwrap_err().status_code(),
            404
        );
        assert_eq!(store.delete("node", "x").unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_scan_preserves_insertion_order() {
        let store = MemoryStore::with_items(vec![
            ContentItem::new("node", "article", "b"),
            ContentItem::new("node", "page", "p"),
            ContentItem::new("node", "article", "a"),
        ])
        .unwrap();

        let ids: Vec<String> = store
            .scan("node", "article")
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_load_multiple_skips_missing() {
        let store = MemoryStore::with_items(vec![
            ContentItem::new("user", "user", "u1"),
            ContentItem::new("user", "user", "u2"),
        ])
        .unwrap();
        let ids = vec!["u2".to_string(), "gone".to_string(), "u1".to_string()];
        let items = store.load_multiple("user", &ids).unwrap();
        let loaded: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(loaded, vec!["u2", "u1"]);
    }
}
