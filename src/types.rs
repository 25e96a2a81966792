use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Speaker {
    User,
    /// Whoever the chat endpoint named in the reply's `sender` field.
    Remote(String),
    /// Local notice for a request that failed.
    Error,
}

impl Speaker {
    pub fn label(&self) -> &str {
        match self {
            Speaker::User => "User",
            Speaker::Remote(name) => name,
            Speaker::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Error,
            text: text.into(),
        }
    }
}

impl From<ChatReply> for ConversationTurn {
    fn from(reply: ChatReply) -> Self {
        Self {
            speaker: Speaker::Remote(reply.sender),
            text: reply.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatReply {
    pub sender: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTriggerRequest {
    pub task_name: String,
    pub due_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodic_task_id: Option<String>,
}

impl TaskTriggerRequest {
    pub fn new(task_name: impl Into<String>, due_date: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            due_date: due_date.into(),
            next_run_time: None,
            periodic_task_id: None,
        }
    }
}

impl fmt::Display for TaskTriggerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (due {})", self.task_name, self.due_date)?;
        if let Some(next) = &self.next_run_time {
            write!(f, ", next run {next}")?;
        }
        Ok(())
    }
}

/// The two server-rendered containers a refresh can replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Conversation,
    TaskList,
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::Conversation => f.write_str("conversation"),
            Container::TaskList => f.write_str("task list"),
        }
    }
}
