//! Reading the server-rendered HTML the chat service hands back: trigger
//! controls in the task list, the CSRF field on the full page, and plain-text
//! renderings for the terminal.

use crate::types::TaskTriggerRequest;
use scraper::{ElementRef, Html, Selector};

pub const TRIGGER_CLASS: &str = "trigger-task";
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";

/// Elements that end a line when rendered as text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "tr", "ul", "ol", "table", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Every trigger control in a task-list fragment, in document order.
pub fn trigger_controls(html: &str) -> Vec<TaskTriggerRequest> {
    let fragment = Html::parse_fragment(html);
    let trigger_selector = Selector::parse(&format!("[class~={TRIGGER_CLASS}]")).unwrap();

    let mut out = Vec::new();
    for element in fragment.select(&trigger_selector) {
        let attrs = element.value();
        let (Some(task_name), Some(due_date)) =
            (attrs.attr("data-task-name"), attrs.attr("data-due-date"))
        else {
            tracing::warn!(
                tag = %element.value().name(),
                "trigger control without data-task-name/data-due-date ignored"
            );
            continue;
        };

        out.push(TaskTriggerRequest {
            task_name: task_name.to_string(),
            due_date: due_date.to_string(),
            next_run_time: non_empty(attrs.attr("data-next-run-time")),
            periodic_task_id: non_empty(attrs.attr("data-periodic-task-id")),
        });
    }
    out
}

/// Value of the hidden CSRF input on a full page, if there is one.
pub fn csrf_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let csrf_selector = Selector::parse(&format!("input[name={CSRF_FIELD}]")).unwrap();
    document
        .select(&csrf_selector)
        .filter_map(|input| input.value().attr("value"))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Flattens markup to readable lines: `<br>` and block elements end a line,
/// scripts and styles are skipped, blank lines dropped.
pub fn to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut raw = String::new();
    push_text(fragment.root_element(), &mut raw);
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child.value().name();
        match name {
            "br" => out.push('\n'),
            "script" | "style" => {}
            _ => {
                push_text(child, out);
                if BLOCK_TAGS.contains(&name) {
                    out.push('\n');
                }
            }
        }
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASK_LIST: &str = r#"
        <p>Server time: 2024-01-01 08:00:00</p>
        <ul id="task-list">
          <li>Cook dinner
            <button class="btn trigger-task" data-task-name="Cook"
                    data-due-date="2024-01-01" data-next-run-time="2024-01-01T18:00:00"
                    data-periodic-task-id="12">Trigger</button>
          </li>
          <li>Run
            <button class='trigger-task' data-task-name='Run &amp; stretch' data-due-date='2024-01-02'>Trigger</button>
          </li>
          <li><button class="delete" data-task-name="Nope" data-due-date="x">Delete</button></li>
          <li><button class="trigger-task" data-task-name="Broken">Trigger</button></li>
        </ul>"#;

    #[test]
    fn finds_trigger_controls_in_order() {
        let controls = trigger_controls(TASK_LIST);
        assert_eq!(controls.len(), 2);

        assert_eq!(controls[0].task_name, "Cook");
        assert_eq!(controls[0].due_date, "2024-01-01");
        assert_eq!(
            controls[0].next_run_time.as_deref(),
            Some("2024-01-01T18:00:00")
        );
        assert_eq!(controls[0].periodic_task_id.as_deref(), Some("12"));

        assert_eq!(controls[1].task_name, "Run & stretch");
        assert_eq!(controls[1].next_run_time, None);
        assert_eq!(controls[1].periodic_task_id, None);
    }

    #[test]
    fn class_match_is_whole_word() {
        let html = r#"<a class="trigger-task-disabled" data-task-name="A" data-due-date="b">x</a>"#;
        assert!(trigger_controls(html).is_empty());
    }

    #[test]
    fn commented_out_controls_are_not_triggers() {
        let html = r#"<!-- <button class="trigger-task" data-task-name="Old" data-due-date="2023-01-01"> -->
            <button class="trigger-task" data-task-name="New" data-due-date="2024-01-01">go</button>"#;
        let controls = trigger_controls(html);
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].task_name, "New");
    }

    #[test]
    fn attribute_values_may_contain_angle_brackets() {
        let html = r#"<button class="trigger-task" data-task-name="a > b" data-due-date="2024-01-01">go</button>"#;
        let controls = trigger_controls(html);
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].task_name, "a > b");
    }

    #[test]
    fn entities_are_decoded_once() {
        let html = r#"<button class="trigger-task" data-task-name="&#38;lt;" data-due-date="d">go</button>"#;
        assert_eq!(trigger_controls(html)[0].task_name, "&lt;");
        assert_eq!(to_text("<p>&amp;lt;</p>"), "&lt;");
    }

    #[test]
    fn reads_csrf_token_from_hidden_input() {
        let page = r#"<form id="chatForm"><input type="hidden" name="csrfmiddlewaretoken" value="abc123"><input id="user_input" name="msg"></form>"#;
        assert_eq!(csrf_token(page).as_deref(), Some("abc123"));
        assert_eq!(csrf_token("<form></form>"), None);
    }

    #[test]
    fn text_rendering_keeps_line_structure() {
        let html = "<strong>user:</strong> hi &amp; bye<br><strong>assistant:</strong>  hello&#33;<br>";
        assert_eq!(to_text(html), "user: hi & bye\nassistant: hello!");
    }

    #[test]
    fn text_rendering_skips_scripts() {
        let html = "<div>tasks</div><script>var x = 1;</script><li>Cook</li>";
        assert_eq!(to_text(html), "tasks\nCook");
    }

    #[test]
    fn escaped_text_renders_back_to_the_original() {
        let raw = r#"<b>"Tom" & 'Jerry'</b>"#;
        let escaped = escape(raw);
        assert!(!escaped.contains('<'));
        assert_eq!(to_text(&escaped), raw);
    }
}
