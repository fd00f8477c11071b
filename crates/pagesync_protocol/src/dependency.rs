//! Cross-reference data shared by all entity types of a remote.

use crate::entity::RemoteEntity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named group of dependency data a transport can supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyAlias {
    /// Store views.
    Stores,
    /// Websites.
    Websites,
}

/// A store view of a remote website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    /// Store id.
    pub store_id: i64,
    /// Owning website id.
    pub website_id: i64,
    /// Store code.
    #[serde(default)]
    pub code: String,
    /// Store display name.
    #[serde(default)]
    pub name: String,
}

/// A remote website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteInfo {
    /// Website id.
    pub website_id: i64,
    /// Website code.
    #[serde(default)]
    pub code: String,
    /// Website display name.
    #[serde(default)]
    pub name: String,
}

/// Dependency data returned by a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Known stores.
    #[serde(default)]
    pub stores: Vec<StoreInfo>,
    /// Known websites.
    #[serde(default)]
    pub websites: Vec<WebsiteInfo>,
}

impl Dependencies {
    /// Keeps only the requested aliases. An empty list keeps everything.
    pub fn restrict_to(mut self, aliases: &[DependencyAlias]) -> Self {
        if aliases.is_empty() {
            return self;
        }
        if !aliases.contains(&DependencyAlias::Stores) {
            self.stores.clear();
        }
        if !aliases.contains(&DependencyAlias::Websites) {
            self.websites.clear();
        }
        self
    }

    /// Returns the ids of all stores that belong to `website_id`.
    pub fn stores_for_website(&self, website_id: i64) -> Vec<i64> {
        self.stores
            .iter()
            .filter(|s| s.website_id == website_id)
            .map(|s| s.store_id)
            .collect()
    }

    /// Looks up a store by id.
    pub fn store(&self, store_id: i64) -> Option<&StoreInfo> {
        self.stores.iter().find(|s| s.store_id == store_id)
    }

    /// Looks up a website by id.
    pub fn website(&self, website_id: i64) -> Option<&WebsiteInfo> {
        self.websites.iter().find(|w| w.website_id == website_id)
    }

    /// Merges store and website details into an entity that carries a `store_id`.
    ///
    /// Returns true if anything was added.
    pub fn enrich(&self, entity: &mut RemoteEntity) -> bool {
        let Some(store) = entity.get("store_id").and_then(as_i64).and_then(|id| self.store(id))
        else {
            return false;
        };

        entity.insert("store_code", store.code.clone());
        entity.insert("store_name", store.name.clone());
        if !entity.contains("website_id") {
            entity.insert("website_id", store.website_id);
        }
        if let Some(website) = self.website(store.website_id) {
            entity.insert("website_code", website.code.clone());
            entity.insert("website_name", website.name.clone());
        }
        true
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
