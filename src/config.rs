use anyhow::{Context, Result, bail};
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Value of the `sessionid` cookie of a logged-in browser session.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Skips scraping the token from the chat page when set.
    #[serde(default)]
    pub csrf_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointsConfig {
    #[serde(default = "default_chat_path")]
    pub chat: String,
    #[serde(default = "default_task_list_path")]
    pub task_list: String,
    #[serde(default = "default_conversation_path")]
    pub conversation: String,
    #[serde(default = "default_trigger_path")]
    pub trigger: String,
    #[serde(default = "default_page_path")]
    pub page: String,
    #[serde(default = "default_reset_path")]
    pub reset: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_demo_message")]
    pub demo_message: String,
    #[serde(default = "default_true")]
    pub refresh_tasks_after_reply: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_id: None,
            csrf_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            chat: default_chat_path(),
            task_list: default_task_list_path(),
            conversation: default_conversation_path(),
            trigger: default_trigger_path(),
            page: default_page_path(),
            reset: default_reset_path(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            demo_message: default_demo_message(),
            refresh_tasks_after_reply: true,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&content).context("failed to parse config toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        if self.server.request_timeout_secs == 0 {
            bail!("server.request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        if self.server.base_url.trim().is_empty() {
            bail!("server.base_url is required");
        }
        Url::parse(self.server.base_url.trim())
            .with_context(|| format!("invalid server.base_url: {}", self.server.base_url))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_chat_path() -> String {
    "/chatbot/api/".to_string()
}

fn default_task_list_path() -> String {
    "/get_task_list/".to_string()
}

fn default_conversation_path() -> String {
    "/get_conversation_display/".to_string()
}

fn default_trigger_path() -> String {
    "/trigger_task/".to_string()
}

fn default_page_path() -> String {
    "/chatbot/".to_string()
}

fn default_reset_path() -> String {
    "/reset_user_data/".to_string()
}

fn default_demo_message() -> String {
    "I want to start cooking dinner at home three times a week.".to_string()
}

fn default_true() -> bool {
    true
}
