//! Domain models for Match Messenger.

pub mod chat;
pub mod events;
pub mod message;
pub mod sport_match;
pub mod ticket;
pub mod user;

pub use chat::{Chat, ChatMembership, ChatMeta, ChatType};
pub use events::ServiceEvent;
pub use message::{DeliveryStatus, Message, MessageContent};
pub use sport_match::SportMatch;
pub use ticket::{Ticket, TicketStatus};
pub use user::{User, UserRole};
