//! Integration tests for the sync cursor against in-memory remotes.

use chrono::{DateTime, TimeZone, Utc};
use pagesync_engine::{
    EntitySource, MemoryRemote, PageableSyncCursor, RemoteCall, RemoteFixture, SyncError,
    SyncMode, SyncRange, SyncResult, SyncSettings, ALL_WEBSITES,
};
use pagesync_protocol::{EntityId, FilterPayload, RemoteEntity};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// An order source keyed by string increment ids, listing a fixed page.
struct StaticOrders {
    page: Vec<&'static str>,
    lists: Cell<usize>,
}

impl EntitySource for StaticOrders {
    fn id_field(&self) -> &str {
        "increment_id"
    }

    fn list_ids(&self, _filter: &FilterPayload) -> SyncResult<Vec<EntityId>> {
        self.lists.set(self.lists.get() + 1);
        Ok(self.page.iter().map(|&id| EntityId::from(id)).collect())
    }

    fn fetch(&self, id: &EntityId) -> SyncResult<Option<RemoteEntity>> {
        if id.as_str() == "100000002" {
            return Err(SyncError::Protocol("malformed order payload".into()));
        }
        Ok(Some(RemoteEntity::new().with("increment_id", id.as_str())))
    }
}

#[test]
fn update_run_yields_once_then_terminates() {
    let remote = MemoryRemote::new(date(2024, 3, 10));
    remote.insert("customers", RemoteEntity::new().with("entity_id", 101));
    remote.script_ids("customers", vec![vec![EntityId::from(101)], vec![]]);

    let settings = SyncSettings::new(ALL_WEBSITES, date(2024, 1, 1))
        .with_sync_range(SyncRange::months(1));
    let mut cursor =
        PageableSyncCursor::new(remote.clone(), remote.source("customers", "entity_id"), settings)
            .unwrap();

    let ids: Vec<_> = cursor
        .by_ref()
        .map(|e| e.unwrap().key("entity_id").unwrap())
        .collect();
    assert_eq!(ids, vec![EntityId::from(101)]);
    assert!(!cursor.is_valid());
    // Window 2 ends before the server clock, so one more empty window is
    // queried before the checkpoint passes it.
    assert_eq!(cursor.stats().discovery_calls, 3);
    assert_eq!(cursor.checkpoint().last_sync_date(), date(2024, 4, 1));

    cursor.advance().unwrap();
    assert!(!cursor.is_valid());
    assert_eq!(cursor.stats().discovery_calls, 3);
}

#[test]
fn empty_settings_fail_before_transport_use() {
    let remote = MemoryRemote::new(date(2024, 1, 1));
    let settings: SyncSettings = serde_json::from_str("{}").unwrap();

    let result = PageableSyncCursor::new(remote.clone(), remote.source("orders", "order_id"), settings);
    assert!(matches!(result, Err(SyncError::Configuration(_))));
    assert!(remote.calls().is_empty());
}

#[test]
fn fixed_ids_drop_unknown_entities() {
    let remote = MemoryRemote::new(date(2024, 1, 1));
    remote.insert("customers", RemoteEntity::new().with("entity_id", "A"));
    remote.insert("customers", RemoteEntity::new().with("entity_id", "C"));

    let source = remote.source("customers", "entity_id").with_bulk_load();
    let mut cursor = PageableSyncCursor::new(
        remote.clone(),
        source,
        SyncSettings::new(ALL_WEBSITES, date(2023, 1, 1)),
    )
    .unwrap();
    cursor
        .set_fixed_ids(["A", "B", "C"].map(EntityId::from))
        .unwrap();

    let ids: Vec<_> = cursor
        .by_ref()
        .collect::<SyncResult<Vec<_>>>()
        .unwrap()
        .iter()
        .map(|e| e.key("entity_id").unwrap())
        .collect();
    assert_eq!(ids, vec![EntityId::from("A"), EntityId::from("C")]);
    assert!(remote.list_filters("customers").is_empty());
}

#[test]
fn initial_run_respects_min_sync_date() {
    let remote = MemoryRemote::new(date(2024, 6, 1));
    for (id, created) in [(1, "2024-01-05 00:00:00"), (2, "2024-01-25 00:00:00"), (3, "2024-02-02 00:00:00")] {
        remote.insert(
            "customers",
            RemoteEntity::new().with("entity_id", id).with("created_at", created),
        );
    }

    let settings = SyncSettings::new(ALL_WEBSITES, date(2024, 2, 1))
        .with_mode(SyncMode::Initial)
        .with_min_sync_date(date(2024, 1, 20));
    let mut cursor =
        PageableSyncCursor::new(remote.clone(), remote.source("customers", "entity_id"), settings)
            .unwrap();

    let ids: Vec<_> = cursor
        .by_ref()
        .map(|e| e.unwrap().key("entity_id").unwrap())
        .collect();
    assert_eq!(ids, vec![EntityId::from(2)]);
    assert_eq!(
        remote.list_filters("customers")[0].describe(),
        vec![
            "created_at from 2024-01-20 00:00:00",
            "created_at to 2024-02-01 00:00:00",
        ]
    );
    assert_eq!(remote.count_calls(|c| *c == RemoteCall::ServerTime), 0);
}

#[test]
fn custom_source_errors_reach_the_caller() {
    let remote = MemoryRemote::new(date(2024, 1, 1));
    let orders = StaticOrders {
        page: vec!["100000001", "100000002"],
        lists: Cell::new(0),
    };
    let settings = SyncSettings::new(ALL_WEBSITES, date(2024, 1, 1)).with_mode(SyncMode::Initial);
    let mut cursor = PageableSyncCursor::new(remote, orders, settings).unwrap();

    let first = cursor.next_item().unwrap().unwrap();
    assert_eq!(first.key("increment_id"), Some(EntityId::from("100000001")));

    let err = cursor.next_item().unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)));
    assert!(!err.is_retryable());
    assert_eq!(cursor.source().lists.get(), 1);
}

#[test]
fn fixture_replay_walks_all_windows() {
    let fixture = RemoteFixture::from_json_str(
        r#"{
            "server_time": "2024-04-15T00:00:00Z",
            "entities": {
                "customers": [
                    {"entity_id": 1, "updated_at": "2024-01-10 00:00:00"},
                    {"entity_id": 2, "updated_at": "2024-03-20 00:00:00"}
                ]
            }
        }"#,
    )
    .unwrap();
    let remote = MemoryRemote::from_fixture(fixture);
    let settings = SyncSettings::new(ALL_WEBSITES, date(2024, 1, 1));
    let mut cursor =
        PageableSyncCursor::new(remote.clone(), remote.source("customers", "entity_id"), settings)
            .unwrap();

    let ids: Vec<_> = cursor
        .by_ref()
        .map(|e| e.unwrap().key("entity_id").unwrap())
        .collect();
    // Open-ended update windows re-list records updated after earlier windows.
    assert_eq!(
        ids,
        vec![
            EntityId::from(1),
            EntityId::from(2),
            EntityId::from(2),
            EntityId::from(2),
        ]
    );
    assert_eq!(cursor.checkpoint().last_sync_date(), date(2024, 5, 1));
}

struct CountingLayer(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for CountingLayer {
    fn on_event(&self, _event: &Event<'_>, _ctx: Context<'_, S>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn logger_receives_cursor_events() {
    let events = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(CountingLayer(Arc::clone(&events)));

    let remote = MemoryRemote::new(date(2024, 2, 15));
    remote.insert(
        "customers",
        RemoteEntity::new()
            .with("entity_id", 1)
            .with("updated_at", "2024-01-02 00:00:00"),
    );
    let mut cursor = PageableSyncCursor::new(
        remote.clone(),
        remote.source("customers", "entity_id"),
        SyncSettings::new(ALL_WEBSITES, date(2024, 1, 1)),
    )
    .unwrap()
    .with_logger(tracing::Dispatch::new(subscriber));

    cursor.restart().unwrap();
    let before = events.load(Ordering::SeqCst);
    assert!(before > 0);

    cursor.current();
    assert_eq!(events.load(Ordering::SeqCst), before + 1);
}
