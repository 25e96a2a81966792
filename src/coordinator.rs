use crate::api::ChatBackend;
use crate::config::ChatConfig;
use crate::error::ApiResult;
use crate::fragment;
use crate::page::Page;
use crate::timestamp;
use crate::types::{ChatReply, ConversationTurn, Container, OutgoingMessage, TaskTriggerRequest};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Enter { shift: bool },
}

/// Something the user did to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Key(Key),
    /// The form's submit event.
    Submit,
    /// Pre-fills the input with the configured demo message and submits it.
    Demo,
    SetDate(Option<String>),
    Focus(bool),
    /// Activates the trigger control at this position in the task list.
    Trigger(usize),
    TriggerTask(TaskTriggerRequest),
    Refresh(Container),
    Reset,
    Quit,
}

/// Changes made to the page, for whatever is displaying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    TurnAppended(ConversationTurn),
    Replaced { container: Container, html: String },
    InputRestored(String),
}

#[derive(Debug)]
enum Completion {
    Reply {
        draft: String,
        result: ApiResult<ChatReply>,
    },
    Triggered {
        request: TaskTriggerRequest,
        result: ApiResult<()>,
    },
    Fragment {
        container: Container,
        generation: u64,
        /// Local turn count when the request was issued.
        mark: u64,
        then: Option<Container>,
        result: ApiResult<String>,
    },
    Reset {
        result: ApiResult<()>,
    },
}

/// Drives one page: turns user events into requests and applies their
/// completions in the order they arrive.
pub struct Coordinator<B: ChatBackend> {
    backend: Arc<B>,
    page: Page,
    chat: ChatConfig,
    clock: fn() -> DateTime<Utc>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
    issued: HashMap<Container, u64>,
    applied: HashMap<Container, u64>,
    view: Option<mpsc::UnboundedSender<PageEvent>>,
}

impl<B: ChatBackend> Coordinator<B> {
    pub fn new(backend: Arc<B>, page: Page, chat: ChatConfig) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            page,
            chat,
            clock: Utc::now,
            completions_tx,
            completions_rx,
            in_flight: 0,
            issued: HashMap::new(),
            applied: HashMap::new(),
            view: None,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_view(mut self, view: mpsc::UnboundedSender<PageEvent>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Picks up the CSRF token from the chat page when none was supplied,
    /// then loads both containers.
    pub async fn bootstrap(&mut self) -> Result<()> {
        if self.page.csrf_token().is_empty() {
            let html = self
                .backend
                .fetch_page()
                .await
                .context("failed to load chat page")?;
            let token = fragment::csrf_token(&html)
                .context("chat page has no csrf token field (is the session logged in?)")?;
            self.page.set_csrf_token(token);
        }
        self.issue_refresh(Container::Conversation, Some(Container::TaskList));
        Ok(())
    }

    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<UiEvent>) -> Result<()> {
        let mut events_open = true;
        loop {
            if !events_open && self.in_flight == 0 {
                break;
            }
            tokio::select! {
                maybe_event = events.recv(), if events_open => {
                    match maybe_event {
                        Some(UiEvent::Quit) | None => {
                            if self.in_flight > 0 {
                                tracing::info!(in_flight = self.in_flight, "waiting for pending requests");
                            }
                            events_open = false;
                        }
                        Some(event) => self.handle_event(event),
                    }
                }
                Some(done) = self.completions_rx.recv() => self.apply(done),
                else => break,
            }
        }
        Ok(())
    }

    /// Waits for every request issued so far, including the ones their
    /// completions chain on.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.completions_rx.recv().await {
                Some(done) => self.apply(done),
                None => break,
            }
        }
    }

    /// Applies the next completion to arrive. Returns false when nothing is in flight.
    pub async fn step(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        match self.completions_rx.recv().await {
            Some(done) => {
                self.apply(done);
                true
            }
            None => false,
        }
    }

    pub fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Key(key) => self.handle_key(key),
            UiEvent::Submit => self.submit(),
            UiEvent::Demo => self.submit_demo(),
            UiEvent::SetDate(value) => self.page.set_date(value),
            UiEvent::Focus(focused) => self.page.set_input_focused(focused),
            UiEvent::Trigger(index) => self.trigger_at(index),
            UiEvent::TriggerTask(request) => self.trigger(request),
            UiEvent::Refresh(container) => self.issue_refresh(container, None),
            UiEvent::Reset => self.reset(),
            UiEvent::Quit => {}
        }
    }

    /// Enter submits; Shift+Enter only breaks the line. Keys are ignored
    /// while the input is not focused.
    pub fn handle_key(&mut self, key: Key) {
        if !self.page.is_input_focused() {
            return;
        }
        match key {
            Key::Char(ch) => self.page.push_input(ch),
            Key::Backspace => {
                self.page.pop_input();
            }
            Key::Enter { shift: true } => self.page.push_input('\n'),
            Key::Enter { shift: false } => self.submit(),
        }
    }

    pub fn submit(&mut self) {
        let draft = self.page.take_input();
        let datetime = timestamp::effective_timestamp(self.page.date(), (self.clock)());
        self.append(ConversationTurn::user(draft.clone()));

        tracing::info!(chars = draft.chars().count(), %datetime, "sending message");
        let message = OutgoingMessage {
            message: draft.clone(),
            datetime: Some(datetime),
        };
        let csrf_token = self.page.csrf_token().to_string();
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            let result = backend.send_message(&csrf_token, &message).await;
            Completion::Reply { draft, result }
        });
    }

    pub fn submit_demo(&mut self) {
        self.page.set_input(self.chat.demo_message.clone());
        self.submit();
    }

    pub fn trigger_at(&mut self, index: usize) {
        match self.page.triggers().get(index).cloned() {
            Some(request) => self.trigger(request),
            None => {
                let count = self.page.triggers().len();
                self.append(ConversationTurn::error(format!(
                    "no trigger control #{} (task list has {count})",
                    index + 1
                )));
            }
        }
    }

    pub fn trigger(&mut self, request: TaskTriggerRequest) {
        tracing::info!(task = %request.task_name, due = %request.due_date, "triggering task");
        let csrf_token = self.page.csrf_token().to_string();
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            let result = backend.trigger_task(&csrf_token, &request).await;
            Completion::Triggered { request, result }
        });
    }

    pub fn refresh(&mut self, container: Container) {
        self.issue_refresh(container, None);
    }

    pub fn reset(&mut self) {
        tracing::info!("resetting user data");
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            let result = backend.reset_user_data().await;
            Completion::Reset { result }
        });
    }

    fn issue_refresh(&mut self, container: Container, then: Option<Container>) {
        let generation = {
            let issued = self.issued.entry(container).or_insert(0);
            *issued += 1;
            *issued
        };
        let mark = self.page.turn_mark();
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            let result = backend.fetch_fragment(container).await;
            Completion::Fragment {
                container,
                generation,
                mark,
                then,
                result,
            }
        });
    }

    fn spawn<F>(&mut self, job: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(job.await);
        });
    }

    fn apply(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match completion {
            Completion::Reply { draft, result } => match result {
                Ok(reply) => {
                    self.append(ConversationTurn::from(reply));
                    if self.chat.refresh_tasks_after_reply {
                        self.issue_refresh(Container::TaskList, None);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "message not delivered");
                    self.append(ConversationTurn::error(format!(
                        "message not delivered: {err}"
                    )));
                    self.restore_draft(draft);
                }
            },
            Completion::Triggered { request, result } => match result {
                Ok(()) => {
                    self.issue_refresh(Container::Conversation, Some(Container::TaskList));
                }
                Err(err) => {
                    tracing::warn!(error = %err, task = %request.task_name, "trigger failed");
                    self.append(ConversationTurn::error(format!(
                        "could not trigger {request}: {err}"
                    )));
                }
            },
            Completion::Fragment {
                container,
                generation,
                mark,
                then,
                result,
            } => match result {
                Ok(html) => {
                    self.replace(container, generation, mark, html);
                    if let Some(next) = then {
                        self.issue_refresh(next, None);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, %container, "refresh failed");
                    self.append(ConversationTurn::error(format!(
                        "could not refresh {container}: {err}"
                    )));
                }
            },
            Completion::Reset { result } => match result {
                Ok(()) => self.issue_refresh(Container::Conversation, Some(Container::TaskList)),
                Err(err) => {
                    tracing::warn!(error = %err, "reset failed");
                    self.append(ConversationTurn::error(format!("could not reset: {err}")));
                }
            },
        }
    }

    fn replace(&mut self, container: Container, generation: u64, mark: u64, html: String) {
        let applied = self.applied.entry(container).or_insert(0);
        if generation <= *applied {
            tracing::debug!(%container, generation, applied = *applied, "stale fragment dropped");
            return;
        }
        *applied = generation;

        // Turns appended while the request was out are not in the fragment.
        let html = match container {
            Container::Conversation => {
                self.page.replace_conversation_since(html, mark);
                self.page.conversation_html()
            }
            Container::TaskList => {
                self.page.replace_task_list(html.clone());
                html
            }
        };
        self.emit(PageEvent::Replaced { container, html });
    }

    fn append(&mut self, turn: ConversationTurn) {
        self.page.append_turn(turn.clone());
        self.emit(PageEvent::TurnAppended(turn));
    }

    fn restore_draft(&mut self, draft: String) {
        if draft.is_empty() || !self.page.input().is_empty() {
            return;
        }
        self.page.set_input(draft.clone());
        self.emit(PageEvent::InputRestored(draft));
    }

    fn emit(&self, event: PageEvent) {
        if let Some(view) = &self.view {
            let _ = view.send(event);
        }
    }
}
