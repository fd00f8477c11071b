//! # PageSync Protocol
//!
//! Data types shared between the sync cursor and remote transports.
//!
//! This crate provides:
//! - `EntityId` and `RemoteEntity` for remote records
//! - `BatchFilter` for accumulating discovery filter clauses
//! - `FilterPayload` for the rendered, provider-agnostic filter
//! - `Dependencies` for store / website cross references
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dependency;
mod entity;
mod filter;

pub use dependency::{Dependencies, DependencyAlias, StoreInfo, WebsiteInfo};
pub use entity::{EntityId, RemoteEntity};
pub use filter::{
    BatchFilter, DateBound, FilterClause, FilterGroup, FilterPayload, FilterValue,
    DEFAULT_DATE_FORMAT,
};
