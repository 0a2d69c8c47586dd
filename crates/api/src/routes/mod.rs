//! HTTP route handlers.

pub mod chats;
pub mod health;
pub mod messages;
pub mod tickets;
pub mod unread;
