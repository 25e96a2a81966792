use crate::fragment;
use crate::types::{ConversationTurn, Speaker, TaskTriggerRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
enum LogEntry {
    /// A locally appended turn and its append sequence number.
    Turn(u64, ConversationTurn),
    /// Server-rendered conversation markup, installed by a refresh.
    Fragment(String),
}

/// The elements the chat widget reads and writes: the input and date fields,
/// the hidden CSRF value, and the conversation and task-list containers.
#[derive(Debug, Clone)]
pub struct Page {
    input: String,
    input_focused: bool,
    date: Option<String>,
    csrf_token: String,
    conversation: Vec<LogEntry>,
    appended: u64,
    task_list_html: String,
    triggers: Vec<TaskTriggerRequest>,
}

impl Page {
    pub fn new(csrf_token: impl Into<String>) -> Self {
        Self {
            input: String::new(),
            input_focused: true,
            date: None,
            csrf_token: csrf_token.into(),
            conversation: Vec::new(),
            appended: 0,
            task_list_html: String::new(),
            triggers: Vec::new(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn push_input(&mut self, ch: char) {
        self.input.push(ch);
    }

    pub fn pop_input(&mut self) -> Option<char> {
        self.input.pop()
    }

    pub fn take_input(&mut self) -> String {
        std::mem::take(&mut self.input)
    }

    pub fn is_input_focused(&self) -> bool {
        self.input_focused
    }

    pub fn set_input_focused(&mut self, focused: bool) {
        self.input_focused = focused;
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn set_date(&mut self, value: Option<String>) {
        self.date = value;
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub fn set_csrf_token(&mut self, token: impl Into<String>) {
        self.csrf_token = token.into();
    }

    pub fn append_turn(&mut self, turn: ConversationTurn) {
        self.appended += 1;
        self.conversation.push(LogEntry::Turn(self.appended, turn));
    }

    /// Number of turns appended so far; a refresh issued now can only
    /// account for turns up to this mark.
    pub fn turn_mark(&self) -> u64 {
        self.appended
    }

    /// Turns appended locally since the last conversation refresh.
    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.conversation.iter().filter_map(|entry| match entry {
            LogEntry::Turn(_, turn) => Some(turn),
            LogEntry::Fragment(_) => None,
        })
    }

    pub fn replace_conversation(&mut self, html: impl Into<String>) {
        self.replace_conversation_since(html, self.appended);
    }

    /// Installs a server fragment that reflects the log as of `mark`. Turns
    /// appended after the mark are kept, in order, after the fragment.
    pub fn replace_conversation_since(&mut self, html: impl Into<String>, mark: u64) {
        let newer: Vec<LogEntry> = self
            .conversation
            .drain(..)
            .filter(|entry| matches!(entry, LogEntry::Turn(seq, _) if *seq > mark))
            .collect();
        self.conversation = vec![LogEntry::Fragment(html.into())];
        self.conversation.extend(newer);
    }

    pub fn conversation_html(&self) -> String {
        let mut out = String::new();
        for entry in &self.conversation {
            match entry {
                LogEntry::Turn(_, turn) => out.push_str(&render_turn(turn)),
                LogEntry::Fragment(html) => out.push_str(html),
            }
        }
        out
    }

    pub fn replace_task_list(&mut self, html: impl Into<String>) {
        self.task_list_html = html.into();
        self.triggers = fragment::trigger_controls(&self.task_list_html);
    }

    pub fn task_list_html(&self) -> &str {
        &self.task_list_html
    }

    pub fn triggers(&self) -> &[TaskTriggerRequest] {
        &self.triggers
    }
}

pub fn render_turn(turn: &ConversationTurn) -> String {
    let label = fragment::escape(turn.speaker.label());
    let text = fragment::escape(&turn.text);
    match turn.speaker {
        Speaker::Error => format!("<strong class=\"error\">{label}:</strong> {text}<br>"),
        _ => format!("<strong>{label}:</strong> {text}<br>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_render_in_append_order() {
        let mut page = Page::new("token");
        page.append_turn(ConversationTurn::user("hello"));
        page.append_turn(ConversationTurn {
            speaker: Speaker::Remote("bot".to_string()),
            text: "hi".to_string(),
        });
        assert_eq!(
            page.conversation_html(),
            "<strong>User:</strong> hello<br><strong>bot:</strong> hi<br>"
        );
    }

    #[test]
    fn turn_text_is_escaped() {
        let html = render_turn(&ConversationTurn::user("<script>alert(1)</script>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn conversation_refresh_replaces_everything() {
        let mut page = Page::new("token");
        page.append_turn(ConversationTurn::user("one"));
        page.replace_conversation("<p>server</p>");
        page.replace_conversation("<p>server</p>");
        assert_eq!(page.conversation_html(), "<p>server</p>");
        assert_eq!(page.turns().count(), 0);

        page.append_turn(ConversationTurn::user("two"));
        assert_eq!(
            page.conversation_html(),
            "<p>server</p><strong>User:</strong> two<br>"
        );
    }

    #[test]
    fn refresh_keeps_turns_appended_after_its_mark() {
        let mut page = Page::new("token");
        page.append_turn(ConversationTurn::user("before"));
        let mark = page.turn_mark();
        page.append_turn(ConversationTurn::user("after"));

        page.replace_conversation_since("<p>server</p>", mark);
        assert_eq!(
            page.conversation_html(),
            "<p>server</p><strong>User:</strong> after<br>"
        );
        assert_eq!(page.turns().count(), 1);
    }

    #[test]
    fn task_list_refresh_reparses_triggers() {
        let mut page = Page::new("token");
        page.replace_task_list(
            r#"<button class="trigger-task" data-task-name="Cook" data-due-date="2024-01-01">go</button>"#,
        );
        assert_eq!(page.triggers().len(), 1);
        page.replace_task_list("<p>no tasks</p>");
        assert!(page.triggers().is_empty());
        assert_eq!(page.task_list_html(), "<p>no tasks</p>");
    }

    #[test]
    fn take_input_clears_field() {
        let mut page = Page::new("token");
        page.set_input("draft");
        assert_eq!(page.take_input(), "draft");
        assert_eq!(page.input(), "");
    }
}
