//! # PageSync Engine
//!
//! Incremental, windowed import of entities from a remote API.
//!
//! This crate provides:
//! - `PageableSyncCursor`, a restartable pull cursor over remote entities
//! - `SyncWindowPolicy` and `SyncCheckpoint` for date-window paging
//! - `RemoteTransport` / `EntitySource` seams for remote access
//! - `MemoryRemote`, an in-memory remote for tests and fixture replay
//!
//! ## Architecture
//!
//! The cursor asks the window policy for the next date range, discovers
//! the entity ids in that range, buffers them, and fetches one body per
//! pull. When the buffer drains it moves to the next window; once the
//! window has caught up with the server clock, iteration ends.
//!
//! ## Key Invariants
//!
//! - The cursor performs no retries; transport errors reach the caller
//! - Entities deleted upstream are skipped silently
//! - A restart always returns to the configured start date

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod error;
mod memory;
mod transport;
mod window;

pub use config::{SyncMode, SyncRange, SyncSettings, ALL_WEBSITES};
pub use cursor::{CursorState, CursorStats, PageableSyncCursor};
pub use error::{SyncError, SyncResult};
pub use memory::{parse_remote_date, MemoryRemote, MemorySource, RemoteCall, RemoteFixture};
pub use transport::{EntitySource, FilterScope, RemoteTransport};
pub use window::{SyncCheckpoint, SyncWindow, SyncWindowPolicy};
