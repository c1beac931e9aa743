//! Client-held query cache for Optimist.
//!
//! This crate provides:
//! - The record model (`RecordId`, `Record`, `Patch`)
//! - Cache addressing (`CacheKey`, `QueryKind`) and payloads (`CacheEntry`)
//! - The `CacheStore` trait the mutation coordinator writes through
//! - `QueryCache`, a thread-safe in-memory store with subscriptions,
//!   quiescing and invalidation

pub mod cache;
mod error;
mod key;
mod store;
mod types;

pub use cache::{CacheUpdate, FetchTicket, QueryCache};
pub use error::CacheError;
pub use key::{CacheKey, QueryKind};
pub use store::CacheStore;
pub use types::{CacheEntry, Patch, Record, RecordId};
