//! Pageable sync cursor.
//!
//! The cursor pulls one entity at a time from a remote. Entity ids are
//! discovered a window at a time and buffered; bodies are fetched per id.
//!
//! ```text
//! NotStarted --restart--> Ready --advance--> Ready ... --> Exhausted
//! ```
//!
//! ## Key Invariants
//!
//! - At most one discovery page is buffered at a time
//! - `current` is `None` before start and once exhausted
//! - Exhausted is terminal until the next `restart`
//! - Initial mode runs discovery at most once per `restart`
//! - Ids that vanished upstream are skipped, never reported as errors

use crate::config::{SyncMode, SyncRange, SyncSettings};
use crate::error::{SyncError, SyncResult};
use crate::transport::{EntitySource, FilterScope, RemoteTransport};
use crate::window::{SyncCheckpoint, SyncWindowPolicy};
use chrono::{DateTime, Utc};
use pagesync_protocol::{BatchFilter, Dependencies, EntityId, FilterPayload, RemoteEntity};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, dispatcher, info, trace, Dispatch};

/// Lifecycle state of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// `restart` has not been called yet.
    NotStarted,
    /// The cursor may hold a current entity.
    Ready,
    /// No more entities until the next `restart`.
    Exhausted,
}

/// Counters collected over the cursor's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorStats {
    /// Number of restarts.
    pub restarts: u64,
    /// Number of discovery queries issued.
    pub discovery_calls: u64,
    /// Number of entities yielded.
    pub entities_fetched: u64,
    /// Number of ids skipped because their entity was gone.
    pub entities_skipped: u64,
    /// Number of times the update window moved forward.
    pub windows_advanced: u64,
}

/// Outcome of a discovery query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Discovery {
    /// Ids were buffered, or later windows remain.
    More,
    /// Nothing left to discover.
    Exhausted,
}

/// A restartable, pull-based cursor over remote entities.
pub struct PageableSyncCursor<T: RemoteTransport, S: EntitySource> {
    transport: T,
    source: S,
    website_id: i64,
    website_scoped: bool,
    date_format: String,
    checkpoint: SyncCheckpoint,
    policy: SyncWindowPolicy,
    filter: BatchFilter,
    ids: VecDeque<EntityId>,
    fixed_ids: Option<Vec<EntityId>>,
    entity_buffer: HashMap<EntityId, RemoteEntity>,
    dependencies: Option<Dependencies>,
    current: Option<RemoteEntity>,
    state: CursorState,
    dependencies_loaded: bool,
    initial_data_loaded: bool,
    stats: CursorStats,
    logger: Dispatch,
}

impl<T: RemoteTransport, S: EntitySource> PageableSyncCursor<T, S> {
    /// Creates a cursor.
    ///
    /// Fails with [`SyncError::Configuration`] when `settings` has no start
    /// date, a window size that does not move forward, or a date format
    /// `chrono` cannot render. No transport call is made here.
    pub fn new(transport: T, source: S, settings: SyncSettings) -> SyncResult<Self> {
        let start = settings.validate()?;
        let checkpoint = SyncCheckpoint::new(start, settings.sync_range)
            .with_min_sync_date(settings.min_sync_date);

        Ok(Self {
            transport,
            source,
            website_id: settings.website_id,
            website_scoped: settings.is_website_scoped(),
            date_format: settings.date_format,
            checkpoint,
            policy: SyncWindowPolicy::new(settings.mode),
            filter: BatchFilter::new(),
            ids: VecDeque::new(),
            fixed_ids: None,
            entity_buffer: HashMap::new(),
            dependencies: None,
            current: None,
            state: CursorState::NotStarted,
            dependencies_loaded: false,
            initial_data_loaded: false,
            stats: CursorStats::default(),
            logger: Dispatch::none(),
        })
    }

    /// Routes the cursor's log events to `logger`. The default discards them.
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = logger;
        self
    }

    /// Rewinds the cursor and loads the first entity.
    ///
    /// The first restart outside initial mode force-reloads the remote's
    /// dependency data. Every restart clears the buffers, restores the
    /// checkpoint and resets the filter; fixed ids are replayed.
    pub fn restart(&mut self) -> SyncResult<()> {
        let logger = self.logger.clone();
        dispatcher::with_default(&logger, || self.rewind())
    }

    /// Moves to the next entity.
    ///
    /// Starts the cursor if needed. Does nothing once exhausted. On a
    /// transport error the cursor keeps its position, so calling `advance`
    /// again retries the failed request.
    pub fn advance(&mut self) -> SyncResult<()> {
        match self.state {
            CursorState::NotStarted => self.restart(),
            CursorState::Exhausted => Ok(()),
            CursorState::Ready => {
                let logger = self.logger.clone();
                dispatcher::with_default(&logger, || self.step())
            }
        }
    }

    /// Pulls the next entity, starting the cursor on first use.
    pub fn next_item(&mut self) -> SyncResult<Option<RemoteEntity>> {
        self.advance()?;
        Ok(self.current.clone())
    }

    /// Returns the current entity.
    pub fn current(&self) -> Option<&RemoteEntity> {
        if let Some(key) = self.key() {
            dispatcher::with_default(&self.logger, || {
                trace!(id = %key, "Loading entity by id: {}", key);
            });
        }
        self.current.as_ref()
    }

    /// Returns the id of the current entity.
    pub fn key(&self) -> Option<EntityId> {
        self.current.as_ref()?.key(self.source.id_field())
    }

    /// Returns true while the cursor holds an entity.
    pub fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Returns the counters.
    pub fn stats(&self) -> &CursorStats {
        &self.stats
    }

    /// Restricts the cursor to a fixed id list, skipping discovery for good.
    ///
    /// Duplicate ids are dropped. When the source bulk-loads, ids it has no
    /// body for are dropped too; otherwise bodies are fetched lazily.
    pub fn set_fixed_ids<I>(&mut self, ids: I) -> SyncResult<()>
    where
        I: IntoIterator<Item = EntityId>,
    {
        let mut ids = dedup(ids);
        let loaded = {
            let logger = self.logger.clone();
            dispatcher::with_default(&logger, || self.source.load_entities(&ids))?
        };

        match loaded {
            Some(buffer) => {
                ids.retain(|id| buffer.contains_key(id));
                self.entity_buffer = buffer;
            }
            None => self.entity_buffer.clear(),
        }
        self.ids = ids.iter().cloned().collect();
        self.fixed_ids = Some(ids);
        Ok(())
    }

    /// Returns the fixed id list, if any.
    pub fn fixed_ids(&self) -> Option<&[EntityId]> {
        self.fixed_ids.as_deref()
    }

    /// Returns the checkpoint.
    pub fn checkpoint(&self) -> &SyncCheckpoint {
        &self.checkpoint
    }

    /// Returns the date restored on every restart.
    pub fn start_date(&self) -> DateTime<Utc> {
        self.checkpoint.initial_checkpoint()
    }

    /// Moves the start date and the current position to `date`.
    pub fn set_start_date(&mut self, date: DateTime<Utc>) {
        self.checkpoint.reset_to(date);
    }

    /// Sets the floor for initial windows.
    pub fn set_min_sync_date(&mut self, date: DateTime<Utc>) {
        self.checkpoint.set_min_sync_date(Some(date));
    }

    /// Returns the import mode.
    pub fn mode(&self) -> SyncMode {
        self.policy.mode()
    }

    /// Sets the import mode.
    pub fn set_mode(&mut self, mode: SyncMode) {
        self.policy.set_mode(mode);
    }

    /// Sets the window size. Ranges that do not move forward are rejected.
    pub fn set_sync_range(&mut self, range: SyncRange) -> SyncResult<()> {
        range.validate()?;
        self.checkpoint.set_sync_range(range);
        Ok(())
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the entity source.
    pub fn source(&self) -> &S {
        &self.source
    }

    fn rewind(&mut self) -> SyncResult<()> {
        if !self.dependencies_loaded {
            if !self.policy.is_initial() {
                self.dependencies = Some(self.transport.dependencies(&[], true)?);
            }
            self.dependencies_loaded = true;
        }

        match &self.fixed_ids {
            Some(ids) => self.ids = ids.iter().cloned().collect(),
            None => self.ids.clear(),
        }
        self.current = None;
        self.checkpoint.rewind();
        self.filter.reset();
        self.initial_data_loaded = false;
        self.state = CursorState::Ready;
        self.stats.restarts += 1;

        self.step()
    }

    fn step(&mut self) -> SyncResult<()> {
        self.current = None;

        loop {
            if let Some(id) = self.ids.pop_front() {
                match self.fetch(&id) {
                    Ok(Some(entity)) => {
                        self.current = Some(entity);
                        return Ok(());
                    }
                    Ok(None) => {
                        debug!(id = %id, "entity no longer available, skipping");
                        self.stats.entities_skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        self.ids.push_front(id);
                        return Err(e);
                    }
                }
            }

            if self.fixed_ids.is_some() {
                break;
            }

            match self.discover()? {
                Discovery::More => continue,
                Discovery::Exhausted => break,
            }
        }

        self.state = CursorState::Exhausted;
        Ok(())
    }

    fn fetch(&mut self, id: &EntityId) -> SyncResult<Option<RemoteEntity>> {
        let entity = match self.entity_buffer.get(id) {
            Some(entity) => Some(entity.clone()),
            None => self.source.fetch(id)?,
        };
        let Some(mut entity) = entity else {
            return Ok(None);
        };

        if self.source.attach_dependencies() {
            self.cached_dependencies()?.enrich(&mut entity);
        }
        self.stats.entities_fetched += 1;
        Ok(Some(entity))
    }

    fn discover(&mut self) -> SyncResult<Discovery> {
        let initial = self.policy.is_initial();
        if initial && self.initial_data_loaded {
            self.initial_data_loaded = false;
            return Ok(Discovery::Exhausted);
        }

        let now = if initial {
            None
        } else {
            Some(self.transport.server_time()?)
        };

        info!("Looking for batch");
        let filter = self.batch_filter()?;
        let ids = self.source.list_ids(&filter)?;
        self.stats.discovery_calls += 1;
        self.ids = dedup(ids).into();
        info!(count = self.ids.len(), "found {} entities", self.ids.len());

        let Some(now) = now else {
            self.initial_data_loaded = true;
            return Ok(if self.ids.is_empty() {
                Discovery::Exhausted
            } else {
                Discovery::More
            });
        };

        self.policy.advance(&mut self.checkpoint)?;
        self.stats.windows_advanced += 1;

        if self.ids.is_empty() && self.policy.is_caught_up(&self.checkpoint, now) {
            return Ok(Discovery::Exhausted);
        }
        Ok(Discovery::More)
    }

    fn batch_filter(&mut self) -> SyncResult<FilterPayload> {
        let window = self.policy.next_window(&self.checkpoint)?;
        self.apply_scope()?;
        self.policy.apply(&window, &mut self.filter, &self.date_format);

        let payload = self.filter.render();
        for clause in payload.clauses() {
            debug!("Filter applied: {}", clause.describe());
        }
        Ok(payload)
    }

    fn apply_scope(&mut self) -> SyncResult<()> {
        if !self.website_scoped {
            return Ok(());
        }

        match self.source.scope() {
            FilterScope::Unscoped => {}
            FilterScope::Website => self.filter.add_website_filter(&[self.website_id]),
            FilterScope::Store => {
                let website_id = self.website_id;
                let stores = self.cached_dependencies()?.stores_for_website(website_id);
                if stores.is_empty() {
                    return Err(SyncError::DependencyResolution { website_id });
                }
                self.filter.add_store_filter(&stores);
            }
        }
        Ok(())
    }

    fn cached_dependencies(&mut self) -> SyncResult<&Dependencies> {
        let dependencies = match self.dependencies.take() {
            Some(dependencies) => dependencies,
            None => self.transport.dependencies(&[], false)?,
        };
        Ok(self.dependencies.insert(dependencies))
    }
}

impl<T: RemoteTransport, S: EntitySource> Iterator for PageableSyncCursor<T, S> {
    type Item = SyncResult<RemoteEntity>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item().transpose()
    }
}

fn dedup(ids: impl IntoIterator<Item = EntityId>) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
