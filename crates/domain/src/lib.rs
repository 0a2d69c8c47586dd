//! Domain layer for the Match Messenger backend.
//!
//! This crate contains:
//! - Domain models (Chat, Ticket, Message, memberships, events)
//! - The storage protocol (`MessengerStore`) and its in-memory implementation
//! - The controllers carrying all business logic (chats, messages, tickets,
//!   unread counters)
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;
pub mod storage;

pub use error::DomainError;
