use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::types::{ChatReply, Container, OutgoingMessage, TaskTriggerRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, Response, Url};
use serde::Serialize;
use std::sync::Arc;

pub const CSRF_HEADER: &str = "X-CSRFToken";

/// The chat service as the widget sees it. State-changing calls take the
/// page's CSRF token; reads take nothing.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn send_message(
        &self,
        csrf_token: &str,
        message: &OutgoingMessage,
    ) -> ApiResult<ChatReply>;

    async fn fetch_fragment(&self, container: Container) -> ApiResult<String>;

    async fn trigger_task(&self, csrf_token: &str, request: &TaskTriggerRequest)
    -> ApiResult<()>;

    /// The full chat page, used to pick up the CSRF field and cookies.
    async fn fetch_page(&self) -> ApiResult<String>;

    async fn reset_user_data(&self) -> ApiResult<()>;
}

struct Endpoints {
    chat: Url,
    task_list: Url,
    conversation: Url,
    trigger: Url,
    page: Url,
    reset: Url,
}

pub struct HttpBackend {
    client: Client,
    endpoints: Endpoints,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config.base_url()?;
        let join = |path: &str| {
            base_url
                .join(path)
                .with_context(|| format!("invalid endpoint path: {path}"))
        };
        let endpoints = Endpoints {
            chat: join(&config.endpoints.chat)?,
            task_list: join(&config.endpoints.task_list)?,
            conversation: join(&config.endpoints.conversation)?,
            trigger: join(&config.endpoints.trigger)?,
            page: join(&config.endpoints.page)?,
            reset: join(&config.endpoints.reset)?,
        };

        let jar = Arc::new(Jar::default());
        if let Some(session_id) = &config.server.session_id {
            jar.add_cookie_str(&format!("sessionid={session_id}"), &base_url);
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            REFERER,
            HeaderValue::from_str(base_url.as_str()).context("base url is not a valid header")?,
        );

        let client = Client::builder()
            .cookie_provider(jar)
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .context("failed to build http client")?;

        Ok(Self { client, endpoints })
    }

    async fn get(&self, url: &Url) -> ApiResult<Response> {
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ApiError::network(url.path(), err))?;
        check_status(url, response)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &Url,
        csrf_token: &str,
        body: &T,
    ) -> ApiResult<Response> {
        tracing::debug!(%url, "POST");
        let response = self
            .client
            .post(url.clone())
            .header(CSRF_HEADER, csrf_token)
            .json(body)
            .send()
            .await
            .map_err(|err| ApiError::network(url.path(), err))?;
        check_status(url, response)
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn send_message(
        &self,
        csrf_token: &str,
        message: &OutgoingMessage,
    ) -> ApiResult<ChatReply> {
        let url = &self.endpoints.chat;
        let response = self.post_json(url, csrf_token, message).await?;
        let body = response
            .bytes()
            .await
            .map_err(|err| ApiError::network(url.path(), err))?;
        serde_json::from_slice(&body).map_err(|err| ApiError::malformed(url.path(), err))
    }

    async fn fetch_fragment(&self, container: Container) -> ApiResult<String> {
        let url = match container {
            Container::Conversation => &self.endpoints.conversation,
            Container::TaskList => &self.endpoints.task_list,
        };
        read_text(url, self.get(url).await?).await
    }

    async fn trigger_task(
        &self,
        csrf_token: &str,
        request: &TaskTriggerRequest,
    ) -> ApiResult<()> {
        self.post_json(&self.endpoints.trigger, csrf_token, request)
            .await?;
        Ok(())
    }

    async fn fetch_page(&self) -> ApiResult<String> {
        let url = &self.endpoints.page;
        read_text(url, self.get(url).await?).await
    }

    async fn reset_user_data(&self) -> ApiResult<()> {
        self.get(&self.endpoints.reset).await?;
        Ok(())
    }
}

fn check_status(url: &Url, response: Response) -> ApiResult<Response> {
    let status = response.status();
    if !status.is_success() {
        tracing::warn!(%url, %status, "request rejected");
        return Err(ApiError::Server {
            endpoint: url.path().to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

async fn read_text(url: &Url, response: Response) -> ApiResult<String> {
    response
        .text()
        .await
        .map_err(|err| ApiError::network(url.path(), err))
}
