/// menteechat - headless direct-messaging core
///
/// Keeps a per-user conversation index and the open conversation in sync
/// with a REST backend and a real-time channel, routing every live message
/// to exactly one of them.

pub mod error;
pub mod config;
pub mod messenger_types;
pub mod conversation_index;
pub mod thread_store;
pub mod router;
pub mod session;
pub mod rest;
pub mod channel;
pub mod hub;
pub mod utils;

pub use error::{MessagingError, Result};
pub use config::{Config, HubConfig};
pub use messenger_types::{ConversationSummary, CounterpartProfile, Message, MessengerEvent};
pub use router::{LinkState, Route};
pub use session::MessagingSession;
