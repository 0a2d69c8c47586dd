//! Background job scheduler and job implementations.

mod close_inactive_chats;
mod scheduler;

pub use close_inactive_chats::CloseInactiveChatsJob;
pub use scheduler::JobScheduler;
