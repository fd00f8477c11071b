//! Replay command implementation.

use pagesync_engine::{
    FilterScope, MemoryRemote, PageableSyncCursor, RemoteFixture, SyncError, SyncSettings,
};
use pagesync_protocol::{EntityId, RemoteEntity};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// What to replay from a fixture.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Entity kind to import.
    pub kind: String,
    /// Field holding the entity id.
    pub id_field: String,
    /// Scope clause of discovery queries.
    pub scope: FilterScope,
    /// Fixed ids; empty means discover.
    pub fixed_ids: Vec<String>,
    /// Bulk-load fixed ids.
    pub bulk: bool,
    /// Merge dependency data into entities.
    pub with_dependencies: bool,
    /// Maximum number of entities.
    pub limit: Option<usize>,
}

/// One yielded entity.
#[derive(Debug, Serialize)]
pub struct ReplayRecord {
    /// Entity id.
    pub id: Option<EntityId>,
    /// Entity body.
    pub entity: RemoteEntity,
}

/// Runs the replay command.
pub fn run(
    fixture: &Path,
    settings: SyncSettings,
    options: &ReplayOptions,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let remote = MemoryRemote::from_fixture(load_fixture(fixture)?);
    let records = replay(remote, settings, options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            for record in &records {
                let id = record
                    .id
                    .as_ref()
                    .map_or_else(|| "-".to_owned(), EntityId::to_string);
                println!("{id}\t{}", serde_json::to_string(&record.entity)?);
            }
        }
    }

    Ok(())
}

/// Reads a fixture file.
pub fn load_fixture(path: &Path) -> Result<RemoteFixture, SyncError> {
    let json = fs::read_to_string(path)
        .map_err(|e| SyncError::Fixture(format!("{}: {e}", path.display())))?;
    RemoteFixture::from_json_str(&json)
}

/// Drives a cursor over `remote` to completion or to the limit.
pub fn replay(
    remote: MemoryRemote,
    settings: SyncSettings,
    options: &ReplayOptions,
) -> Result<Vec<ReplayRecord>, SyncError> {
    let mut source = remote
        .source(options.kind.clone(), options.id_field.clone())
        .with_scope(options.scope);
    if options.bulk {
        source = source.with_bulk_load();
    }
    if options.with_dependencies {
        source = source.with_dependency_data();
    }

    let logger = tracing::dispatcher::get_default(|d| d.clone());
    let mut cursor = PageableSyncCursor::new(remote, source, settings)?.with_logger(logger);
    if !options.fixed_ids.is_empty() {
        cursor.set_fixed_ids(options.fixed_ids.iter().map(|id| EntityId::from(id.as_str())))?;
    }

    let limit = options.limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    while records.len() < limit {
        let Some(entity) = cursor.next_item()? else {
            break;
        };
        records.push(ReplayRecord {
            id: cursor.key(),
            entity,
        });
    }

    let stats = cursor.stats();
    info!(
        yielded = records.len(),
        discovery_calls = stats.discovery_calls,
        skipped = stats.entities_skipped,
        "replay finished, checkpoint at {}",
        cursor.checkpoint().last_sync_date()
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    const FIXTURE: &str = r#"{
        "server_time": "2024-03-15T00:00:00Z",
        "dependencies": {
            "stores": [{"store_id": 1, "website_id": 1, "code": "default", "name": "Default"}],
            "websites": [{"website_id": 1, "code": "base", "name": "Main"}]
        },
        "entities": {
            "orders": [
                {"order_id": 10, "store_id": 1, "updated_at": "2024-02-03 12:00:00"},
                {"order_id": 11, "store_id": 2, "updated_at": "2024-02-04 12:00:00"}
            ]
        }
    }"#;

    fn options() -> ReplayOptions {
        ReplayOptions {
            kind: "orders".into(),
            id_field: "order_id".into(),
            scope: FilterScope::Store,
            fixed_ids: Vec::new(),
            bulk: false,
            with_dependencies: true,
            limit: None,
        }
    }

    fn settings() -> SyncSettings {
        SyncSettings::new(1, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn load_fixture_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();

        let fixture = load_fixture(file.path()).unwrap();
        assert_eq!(fixture.entities["orders"].len(), 2);
        assert_eq!(fixture.dependencies.stores.len(), 1);
    }

    #[test]
    fn load_fixture_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_fixture(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, SyncError::Fixture(_)));
    }

    #[test]
    fn replay_scopes_and_enriches() {
        let remote = MemoryRemote::from_fixture(RemoteFixture::from_json_str(FIXTURE).unwrap());
        let records = replay(remote, settings(), &options()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, Some(EntityId::from(10)));
        assert_eq!(records[0].entity.get("website_code").unwrap(), "base");
    }

    #[test]
    fn replay_honors_limit_and_fixed_ids() {
        let remote = MemoryRemote::from_fixture(RemoteFixture::from_json_str(FIXTURE).unwrap());
        let options = ReplayOptions {
            fixed_ids: vec!["11".into(), "10".into(), "99".into()],
            bulk: true,
            limit: Some(1),
            ..options()
        };
        let records = replay(remote, settings(), &options).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, Some(EntityId::from(11)));
    }
}
