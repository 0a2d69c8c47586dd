//! Persistence layer for the Match Messenger backend.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - The transactional Postgres store behind the domain storage protocol
//! - Redis-backed unread counters, presence lookup and the event publisher

pub mod db;
pub mod entities;
pub mod redis;
pub mod repositories;

pub use repositories::PgStore;
