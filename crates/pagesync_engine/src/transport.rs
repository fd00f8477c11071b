//! Transport and entity-source abstractions.
//!
//! A cursor talks to the remote through two seams: a `RemoteTransport`
//! shared by every entity type (server clock, dependency data), and an
//! `EntitySource` that knows how to discover and fetch one entity type.

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use pagesync_protocol::{Dependencies, DependencyAlias, EntityId, FilterPayload, RemoteEntity};
use std::collections::HashMap;
use std::sync::Arc;

/// Remote-wide services used by the cursor.
///
/// Calls are synchronous and may block on the network; timeouts and
/// retries belong to the implementation, not the cursor.
pub trait RemoteTransport {
    /// Returns the remote's current clock.
    fn server_time(&self) -> SyncResult<DateTime<Utc>>;

    /// Returns dependency data for `aliases` (all of them when empty),
    /// bypassing any cache when `force_reload` is set.
    fn dependencies(
        &self,
        aliases: &[DependencyAlias],
        force_reload: bool,
    ) -> SyncResult<Dependencies>;
}

/// Which scope clause discovery queries for a source carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterScope {
    /// No website or store clause.
    #[default]
    Unscoped,
    /// `website_id in [website]`.
    Website,
    /// `store_id in [stores of website]`.
    Store,
}

/// Per-entity-type capabilities injected into a cursor.
pub trait EntitySource {
    /// Name of the field holding the entity id, e.g. `entity_id` or `order_id`.
    fn id_field(&self) -> &str;

    /// Lists ids matching `filter`, in remote order.
    fn list_ids(&self, filter: &FilterPayload) -> SyncResult<Vec<EntityId>>;

    /// Fetches one entity body. `Ok(None)` means it no longer exists upstream.
    fn fetch(&self, id: &EntityId) -> SyncResult<Option<RemoteEntity>>;

    /// Scope clause for discovery queries.
    fn scope(&self) -> FilterScope {
        FilterScope::Unscoped
    }

    /// Bulk-loads bodies for a fixed id list.
    ///
    /// `Ok(None)` means the source does not bulk load and entities are
    /// fetched one at a time instead.
    fn load_entities(
        &self,
        _ids: &[EntityId],
    ) -> SyncResult<Option<HashMap<EntityId, RemoteEntity>>> {
        Ok(None)
    }

    /// Whether fetched entities get store and website details merged in.
    fn attach_dependencies(&self) -> bool {
        false
    }
}

impl<T: RemoteTransport + ?Sized> RemoteTransport for Arc<T> {
    fn server_time(&self) -> SyncResult<DateTime<Utc>> {
        (**self).server_time()
    }

    fn dependencies(
        &self,
        aliases: &[DependencyAlias],
        force_reload: bool,
    ) -> SyncResult<Dependencies> {
        (**self).dependencies(aliases, force_reload)
    }
}

impl<S: EntitySource + ?Sized> EntitySource for Box<S> {
    fn id_field(&self) -> &str {
        (**self).id_field()
    }

    fn list_ids(&self, filter: &FilterPayload) -> SyncResult<Vec<EntityId>> {
        (**self).list_ids(filter)
    }

    fn fetch(&self, id: &EntityId) -> SyncResult<Option<RemoteEntity>> {
        (**self).fetch(id)
    }

    fn scope(&self) -> FilterScope {
        (**self).scope()
    }

    fn load_entities(
        &self,
        ids: &[EntityId],
    ) -> SyncResult<Option<HashMap<EntityId, RemoteEntity>>> {
        (**self).load_entities(ids)
    }

    fn attach_dependencies(&self) -> bool {
        (**self).attach_dependencies()
    }
}
