pub mod config;
pub mod conversation;
pub mod events;

pub use config::{AppConfig, ConfigStore, JsonFileStore, MemoryStore, S2sModel};
pub use conversation::{Conversation, Message, Sender};
pub use events::{SessionEvent, SessionStatus};
