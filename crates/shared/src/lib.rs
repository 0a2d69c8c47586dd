//! Shared utilities for the Match Messenger backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Cursor-based pagination over message ids

pub mod pagination;
