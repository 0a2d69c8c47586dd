//! Repository implementations for database operations.

pub mod messenger_store;

pub use messenger_store::PgStore;
