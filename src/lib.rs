//! Client-side controller for the Nudgie chat widget: submits messages to the
//! chat endpoint, keeps the conversation log and task list of a page in sync
//! with the server, and triggers scheduled tasks on demand.

pub mod api;
pub mod cli_adapter;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fragment;
pub mod page;
pub mod timestamp;
pub mod types;

pub use api::{ChatBackend, HttpBackend};
pub use config::Config;
pub use coordinator::{Coordinator, Key, PageEvent, UiEvent};
pub use error::{ApiError, ApiResult};
pub use page::Page;
pub use types::{ChatReply, Container, ConversationTurn, OutgoingMessage, Speaker, TaskTriggerRequest};
