use crate::coordinator::{Key, PageEvent, UiEvent};
use crate::fragment;
use crate::types::{Container, Speaker, TaskTriggerRequest};
use anyhow::{Context, Result, bail};

pub const COMMANDS_HELP: &str = "\
commands:
  <text>                 type text and press Enter
  <text>\\                type text and press Shift+Enter (keep composing)
  //text                 send text that starts with '/'
  /date [value]          set the date field (empty clears it)
  /demo                  send the demo message
  /trigger <n>           trigger the n-th task in the task list
  /trigger <name> <due> [next-run] [task-id]
  /tasks                 refresh the task list
  /history               refresh the conversation
  /reset                 reset user data on the server
  /quit                  finish pending requests and exit";

/// Turns one line of terminal input into the page events it stands for.
pub fn parse_input(line: &str) -> Result<Vec<UiEvent>> {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.strip_prefix('/') {
        if !rest.starts_with('/') {
            return parse_command(rest).map(|event| vec![event]);
        }
        return Ok(type_line(&line[1..]));
    }
    Ok(type_line(line))
}

fn type_line(line: &str) -> Vec<UiEvent> {
    let (text, shift) = match line.strip_suffix('\\') {
        Some(text) => (text, true),
        None => (line, false),
    };
    let mut events: Vec<UiEvent> = text.chars().map(|c| UiEvent::Key(Key::Char(c))).collect();
    events.push(UiEvent::Key(Key::Enter { shift }));
    events
}

fn parse_command(command: &str) -> Result<UiEvent> {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    let event = match name {
        "date" => {
            let value = args.join(" ");
            UiEvent::SetDate(if value.is_empty() { None } else { Some(value) })
        }
        "demo" => UiEvent::Demo,
        "tasks" => UiEvent::Refresh(Container::TaskList),
        "history" => UiEvent::Refresh(Container::Conversation),
        "reset" => UiEvent::Reset,
        "quit" | "exit" => UiEvent::Quit,
        "trigger" => parse_trigger(&args)?,
        "" => bail!("empty command"),
        other => bail!("unknown command: /{other}"),
    };
    Ok(event)
}

fn parse_trigger(args: &[&str]) -> Result<UiEvent> {
    match args {
        [] => bail!("/trigger requires a task number or <name> <due-date>"),
        [index] => {
            let n: usize = index.parse().context("invalid task number")?;
            if n == 0 {
                bail!("task numbers start at 1");
            }
            Ok(UiEvent::Trigger(n - 1))
        }
        [name, due, rest @ ..] if rest.len() <= 2 => Ok(UiEvent::TriggerTask(TaskTriggerRequest {
            task_name: name.to_string(),
            due_date: due.to_string(),
            next_run_time: rest.first().map(|s| s.to_string()),
            periodic_task_id: rest.get(1).map(|s| s.to_string()),
        })),
        _ => bail!("too many arguments to /trigger"),
    }
}

/// Terminal rendering of a page change.
pub fn pretty_event(event: &PageEvent) -> String {
    match event {
        PageEvent::TurnAppended(turn) => match &turn.speaker {
            Speaker::Error => format!("!! {}", turn.text),
            speaker => format!("{}: {}", speaker.label(), turn.text),
        },
        PageEvent::Replaced {
            container: Container::Conversation,
            html,
        } => format!("--- conversation ---\n{}\n---", fragment::to_text(html)),
        PageEvent::Replaced {
            container: Container::TaskList,
            html,
        } => pretty_task_list(html),
        PageEvent::InputRestored(draft) => format!("(draft kept: {draft})"),
    }
}

pub fn pretty_task_list(html: &str) -> String {
    let mut out = String::from("--- tasks ---\n");
    let text = fragment::to_text(html);
    if !text.is_empty() {
        out.push_str(&text);
        out.push('\n');
    }
    for (i, control) in fragment::trigger_controls(html).iter().enumerate() {
        out.push_str(&format!("  [{}] {}\n", i + 1, control));
    }
    out.push_str("---");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConversationTurn;

    fn typed(events: &[UiEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                UiEvent::Key(Key::Char(c)) => Some(*c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn plain_line_types_then_presses_enter() {
        let events = parse_input("hello\n").unwrap();
        assert_eq!(typed(&events), "hello");
        assert_eq!(
            events.last(),
            Some(&UiEvent::Key(Key::Enter { shift: false }))
        );
    }

    #[test]
    fn trailing_backslash_is_shift_enter() {
        let events = parse_input("first line\\").unwrap();
        assert_eq!(typed(&events), "first line");
        assert_eq!(events.last(), Some(&UiEvent::Key(Key::Enter { shift: true })));
    }

    #[test]
    fn double_slash_escapes_commands() {
        let events = parse_input("//tasks are fun").unwrap();
        assert_eq!(typed(&events), "/tasks are fun");
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_input("/demo").unwrap(), vec![UiEvent::Demo]);
        assert_eq!(
            parse_input("/date 2024-01-01T08:00:00").unwrap(),
            vec![UiEvent::SetDate(Some("2024-01-01T08:00:00".to_string()))]
        );
        assert_eq!(parse_input("/date").unwrap(), vec![UiEvent::SetDate(None)]);
        assert_eq!(parse_input("/trigger 2").unwrap(), vec![UiEvent::Trigger(1)]);
        assert_eq!(
            parse_input("/trigger Cook 2024-01-01").unwrap(),
            vec![UiEvent::TriggerTask(TaskTriggerRequest::new("Cook", "2024-01-01"))]
        );
        assert_eq!(
            parse_input("/tasks").unwrap(),
            vec![UiEvent::Refresh(Container::TaskList)]
        );
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(parse_input("/trigger 0").is_err());
        assert!(parse_input("/trigger").is_err());
        assert!(parse_input("/trigger a b c d e").is_err());
        assert!(parse_input("/frobnicate").is_err());
    }

    #[test]
    fn renders_error_turns_distinctly() {
        let line = pretty_event(&PageEvent::TurnAppended(ConversationTurn::error("boom")));
        assert_eq!(line, "!! boom");
        let line = pretty_event(&PageEvent::TurnAppended(ConversationTurn::user("hi")));
        assert_eq!(line, "User: hi");
    }

    #[test]
    fn task_list_lists_numbered_triggers() {
        let html = r#"<li>Cook <button class="trigger-task" data-task-name="Cook" data-due-date="2024-01-01">Trigger</button></li>"#;
        let out = pretty_task_list(html);
        assert!(out.contains("[1] Cook (due 2024-01-01)"));
    }
}
