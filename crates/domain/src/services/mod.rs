//! Domain services for Match Messenger.
//!
//! Controllers hold the business logic and operate on a request-scoped
//! [`crate::storage::MessengerStore`] plus the process-wide unread counter,
//! presence and publisher collaborators, all injected at construction.

pub mod chats;
pub mod messages;
pub mod presence;
pub mod publisher;
pub mod tickets;
pub mod unread;

pub use chats::ChatsController;
pub use messages::MessagesController;
pub use presence::{MockPresence, Presence};
pub use publisher::{publish_all, EventPublisher, MockEventPublisher};
pub use tickets::TicketsController;
pub use unread::UnreadCountersController;
