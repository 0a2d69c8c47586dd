//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod chat;
pub mod message;
pub mod sport_match;
pub mod ticket;
pub mod user;

pub use chat::{ChatEntity, ChatMembershipEntity, ChatTypeDb};
pub use message::MessageEntity;
pub use sport_match::SportMatchEntity;
pub use ticket::{TicketEntity, TicketStatusDb};
pub use user::{UserEntity, UserRoleDb};
