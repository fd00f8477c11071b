//! In-memory remote for tests and fixture replay.

use crate::error::{SyncError, SyncResult};
use crate::transport::{EntitySource, FilterScope, RemoteTransport};
use chrono::{DateTime, NaiveDateTime, Utc};
use pagesync_protocol::{
    DateBound, Dependencies, DependencyAlias, EntityId, FilterClause, FilterPayload, FilterValue,
    RemoteEntity, DEFAULT_DATE_FORMAT,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// Serialized contents of a `MemoryRemote`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFixture {
    /// Clock reported by the remote.
    pub server_time: DateTime<Utc>,
    /// Store and website data.
    #[serde(default)]
    pub dependencies: Dependencies,
    /// Records per entity kind.
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<RemoteEntity>>,
}

impl RemoteFixture {
    /// Parses a fixture from JSON.
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Fixture(e.to_string()))
    }
}

/// A call observed by a `MemoryRemote`.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// `server_time()`.
    ServerTime,
    /// `dependencies()`.
    Dependencies {
        /// Whether the cache was bypassed.
        force_reload: bool,
    },
    /// `list_ids()` on a source.
    ListIds {
        /// Entity kind.
        kind: String,
        /// Filter sent.
        filter: FilterPayload,
    },
    /// `fetch()` on a source.
    Fetch {
        /// Entity kind.
        kind: String,
        /// Requested id.
        id: EntityId,
    },
    /// `load_entities()` on a source.
    LoadEntities {
        /// Entity kind.
        kind: String,
        /// Requested ids.
        ids: Vec<EntityId>,
    },
}

#[derive(Debug)]
struct MemoryState {
    connected: bool,
    server_time: DateTime<Utc>,
    dependencies: Dependencies,
    collections: HashMap<String, Vec<RemoteEntity>>,
    scripted_ids: HashMap<String, VecDeque<Vec<EntityId>>>,
    calls: Vec<RemoteCall>,
}

/// A remote held entirely in memory.
///
/// Clones share state, so a test can keep a handle to inspect the call log
/// after moving the remote into a cursor.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemote {
    /// Creates an empty remote whose clock reads `server_time`.
    pub fn new(server_time: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                connected: true,
                server_time,
                dependencies: Dependencies::default(),
                collections: HashMap::new(),
                scripted_ids: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// Creates a remote from fixture data.
    pub fn from_fixture(fixture: RemoteFixture) -> Self {
        let remote = Self::new(fixture.server_time);
        {
            let mut state = remote.state.lock();
            state.dependencies = fixture.dependencies;
            state.collections = fixture.entities.into_iter().collect();
        }
        remote
    }

    /// Returns a source for entities of `kind` identified by `id_field`.
    pub fn source(&self, kind: impl Into<String>, id_field: impl Into<String>) -> MemorySource {
        MemorySource {
            remote: self.clone(),
            kind: kind.into(),
            id_field: id_field.into(),
            scope: FilterScope::Unscoped,
            bulk_load: false,
            attach_dependencies: false,
        }
    }

    /// Sets the remote clock.
    pub fn set_server_time(&self, time: DateTime<Utc>) {
        self.state.lock().server_time = time;
    }

    /// Sets the dependency data.
    pub fn set_dependencies(&self, dependencies: Dependencies) {
        self.state.lock().dependencies = dependencies;
    }

    /// Simulates losing or regaining the connection.
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Adds a record of `kind`.
    pub fn insert(&self, kind: &str, entity: RemoteEntity) {
        self.state
            .lock()
            .collections
            .entry(kind.to_owned())
            .or_default()
            .push(entity);
    }

    /// Removes records of `kind` whose `id_field` equals `id`.
    pub fn remove(&self, kind: &str, id_field: &str, id: &EntityId) {
        if let Some(records) = self.state.lock().collections.get_mut(kind) {
            records.retain(|e| e.key(id_field).as_ref() != Some(id));
        }
    }

    /// Scripts the id pages `list_ids` returns for `kind`, one per call,
    /// instead of evaluating filters. Once the script runs out, calls
    /// return no ids.
    pub fn script_ids(&self, kind: &str, pages: Vec<Vec<EntityId>>) {
        self.state
            .lock()
            .scripted_ids
            .insert(kind.to_owned(), pages.into());
    }

    /// Returns every call observed so far.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    /// Returns the filters of all discovery calls for `kind`.
    pub fn list_filters(&self, kind: &str) -> Vec<FilterPayload> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                RemoteCall::ListIds { kind: k, filter } if k == kind => Some(filter.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of observed calls matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&RemoteCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Clears the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn record(&self, call: RemoteCall) -> SyncResult<parking_lot::MutexGuard<'_, MemoryState>> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if !state.connected {
            return Err(SyncError::transport_retryable("not connected to remote"));
        }
        Ok(state)
    }
}

impl RemoteTransport for MemoryRemote {
    fn server_time(&self) -> SyncResult<DateTime<Utc>> {
        Ok(self.record(RemoteCall::ServerTime)?.server_time)
    }

    fn dependencies(
        &self,
        aliases: &[DependencyAlias],
        force_reload: bool,
    ) -> SyncResult<Dependencies> {
        let state = self.record(RemoteCall::Dependencies { force_reload })?;
        Ok(state.dependencies.clone().restrict_to(aliases))
    }
}

/// An `EntitySource` over one collection of a `MemoryRemote`.
#[derive(Debug, Clone)]
pub struct MemorySource {
    remote: MemoryRemote,
    kind: String,
    id_field: String,
    scope: FilterScope,
    bulk_load: bool,
    attach_dependencies: bool,
}

impl MemorySource {
    /// Sets the scope clause of discovery queries.
    pub fn with_scope(mut self, scope: FilterScope) -> Self {
        self.scope = scope;
        self
    }

    /// Enables bulk loading of fixed id lists.
    pub fn with_bulk_load(mut self) -> Self {
        self.bulk_load = true;
        self
    }

    /// Enables dependency enrichment of fetched entities.
    pub fn with_dependency_data(mut self) -> Self {
        self.attach_dependencies = true;
        self
    }

    fn find(records: Option<&Vec<RemoteEntity>>, id_field: &str, id: &EntityId) -> Option<RemoteEntity> {
        records?
            .iter()
            .find(|e| e.key(id_field).as_ref() == Some(id))
            .cloned()
    }
}

impl EntitySource for MemorySource {
    fn id_field(&self) -> &str {
        &self.id_field
    }

    fn list_ids(&self, filter: &FilterPayload) -> SyncResult<Vec<EntityId>> {
        let mut state = self.remote.record(RemoteCall::ListIds {
            kind: self.kind.clone(),
            filter: filter.clone(),
        })?;

        if let Some(script) = state.scripted_ids.get_mut(&self.kind) {
            return Ok(script.pop_front().unwrap_or_default());
        }

        Ok(state
            .collections
            .get(&self.kind)
            .map(|records| {
                records
                    .iter()
                    .filter(|e| filter.clauses().all(|c| clause_matches(e, c)))
                    .filter_map(|e| e.key(&self.id_field))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch(&self, id: &EntityId) -> SyncResult<Option<RemoteEntity>> {
        let state = self.remote.record(RemoteCall::Fetch {
            kind: self.kind.clone(),
            id: id.clone(),
        })?;
        Ok(Self::find(state.collections.get(&self.kind), &self.id_field, id))
    }

    fn scope(&self) -> FilterScope {
        self.scope
    }

    fn load_entities(
        &self,
        ids: &[EntityId],
    ) -> SyncResult<Option<HashMap<EntityId, RemoteEntity>>> {
        if !self.bulk_load {
            return Ok(None);
        }
        let state = self.remote.record(RemoteCall::LoadEntities {
            kind: self.kind.clone(),
            ids: ids.to_vec(),
        })?;
        let records = state.collections.get(&self.kind);
        Ok(Some(
            ids.iter()
                .filter_map(|id| {
                    Self::find(records, &self.id_field, id).map(|e| (id.clone(), e))
                })
                .collect(),
        ))
    }

    fn attach_dependencies(&self) -> bool {
        self.attach_dependencies
    }
}

fn clause_matches(entity: &RemoteEntity, clause: &FilterClause) -> bool {
    let Some(value) = entity.get(&clause.field) else {
        return false;
    };
    match &clause.value {
        FilterValue::Equals(expected) => scalar_text(value).as_deref() == Some(expected.as_str()),
        FilterValue::In(set) => scalar_text(value).is_some_and(|v| set.contains(&v)),
        FilterValue::Date { bound, at, .. } => match parse_remote_date(value) {
            Some(date) => match bound {
                DateBound::From => date >= *at,
                DateBound::To => date < *at,
            },
            None => false,
        },
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses a remote timestamp, either RFC 3339 or `Y-m-d H:i:s` in UTC.
pub fn parse_remote_date(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, DEFAULT_DATE_FORMAT)
                .ok()
                .map(|d| d.and_utc())
        })
}
