use anyhow::{Context, Result, anyhow, bail};
use nudgie_chat::cli_adapter::{self, COMMANDS_HELP};
use nudgie_chat::{
    Config, Container, Coordinator, HttpBackend, Page, PageEvent, Speaker, TaskTriggerRequest,
    UiEvent,
};
use std::env;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "nudgie-chat.toml";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut args: Vec<String> = env::args().collect();
    let _bin = args.remove(0);
    if args.is_empty() {
        print_usage();
        return Ok(());
    }

    match args[0].as_str() {
        "chat" => run_chat(&args[1..]).await,
        "send" => run_send(&args[1..]).await,
        "tasks" => run_tasks(&args[1..]).await,
        "trigger" => run_trigger(&args[1..]).await,
        "reset" => run_reset(&args[1..]).await,
        "help" | "-h" | "--help" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            Err(anyhow!("unknown command: {other}"))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Flags every subcommand accepts.
#[derive(Debug, Default)]
struct CommonArgs {
    config: Option<PathBuf>,
    base_url: Option<String>,
    session_id: Option<String>,
    csrf_token: Option<String>,
}

impl CommonArgs {
    /// Consumes the flag at `i` if it is a common one, returning the next index.
    fn parse(&mut self, args: &[String], i: usize) -> Result<Option<usize>> {
        let slot = match args[i].as_str() {
            "--config" => {
                self.config = Some(PathBuf::from(flag_value(args, i)?));
                return Ok(Some(i + 2));
            }
            "--base-url" => &mut self.base_url,
            "--session-id" => &mut self.session_id,
            "--csrf-token" => &mut self.csrf_token,
            _ => return Ok(None),
        };
        *slot = Some(flag_value(args, i)?.to_string());
        Ok(Some(i + 2))
    }

    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Config::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };
        if let Some(base_url) = &self.base_url {
            config.server.base_url = base_url.clone();
        }
        if let Some(session_id) = &self.session_id {
            config.server.session_id = Some(session_id.clone());
        }
        if let Some(csrf_token) = &self.csrf_token {
            config.server.csrf_token = Some(csrf_token.clone());
        }
        config.validate()?;
        Ok(config)
    }

    async fn connect(&self) -> Result<Coordinator<HttpBackend>> {
        let config = self.load_config()?;
        let backend = Arc::new(HttpBackend::new(&config)?);
        let page = Page::new(config.server.csrf_token.clone().unwrap_or_default());
        Ok(Coordinator::new(backend, page, config.chat.clone()))
    }
}

fn flag_value<'a>(args: &'a [String], i: usize) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("{} requires a value", args[i]))
}

async fn run_chat(args: &[String]) -> Result<()> {
    let mut common = CommonArgs::default();
    let mut date: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        if let Some(next) = common.parse(args, i)? {
            i = next;
            continue;
        }
        match args[i].as_str() {
            "--date" => {
                date = Some(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--help" | "-h" => {
                print_chat_usage();
                return Ok(());
            }
            other => bail!("unknown chat argument: {other}"),
        }
    }

    let (view_tx, mut view_rx) = mpsc::unbounded_channel::<PageEvent>();
    let mut coordinator = common.connect().await?.with_view(view_tx);
    coordinator.page_mut().set_date(date);
    coordinator.bootstrap().await?;

    let printer = tokio::spawn(async move {
        while let Some(event) = view_rx.recv().await {
            println!("{}", cli_adapter::pretty_event(&event));
        }
    });

    // Blocking stdin lives on its own thread so exit never waits on it.
    let (events_tx, events_rx) = mpsc::unbounded_channel::<UiEvent>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::error!(error = %err, "failed to read stdin");
                    break;
                }
            };
            if line.trim() == "/help" {
                eprintln!("{COMMANDS_HELP}");
                continue;
            }
            match cli_adapter::parse_input(&line) {
                Ok(events) => {
                    let quit = events.contains(&UiEvent::Quit);
                    for event in events {
                        if events_tx.send(event).is_err() {
                            return;
                        }
                    }
                    if quit {
                        return;
                    }
                }
                Err(err) => eprintln!("{err}"),
            }
        }
    });

    eprintln!("connected; /help lists commands");
    coordinator.run(events_rx).await?;
    printer.await.context("printer task failed")?;
    Ok(())
}

async fn run_send(args: &[String]) -> Result<()> {
    let mut common = CommonArgs::default();
    let mut message: Option<String> = None;
    let mut datetime: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        if let Some(next) = common.parse(args, i)? {
            i = next;
            continue;
        }
        match args[i].as_str() {
            "--message" => {
                message = Some(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--datetime" => {
                datetime = Some(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--help" | "-h" => {
                print_send_usage();
                return Ok(());
            }
            other => bail!("unknown send argument: {other}"),
        }
    }
    let message = message.context("--message is required")?;

    let mut coordinator = common.connect().await?;
    coordinator.bootstrap().await?;
    coordinator.settle().await;

    coordinator.page_mut().set_date(datetime);
    coordinator.page_mut().set_input(message);
    coordinator.handle_event(UiEvent::Submit);
    coordinator.settle().await;

    for turn in coordinator.page().turns() {
        println!(
            "{}",
            cli_adapter::pretty_event(&PageEvent::TurnAppended(turn.clone()))
        );
    }
    report_errors(coordinator.page())
}

async fn run_tasks(args: &[String]) -> Result<()> {
    let mut common = CommonArgs::default();
    let mut i = 0;
    while i < args.len() {
        if let Some(next) = common.parse(args, i)? {
            i = next;
            continue;
        }
        match args[i].as_str() {
            "--help" | "-h" => {
                print_tasks_usage();
                return Ok(());
            }
            other => bail!("unknown tasks argument: {other}"),
        }
    }

    let mut coordinator = common.connect().await?;
    coordinator.refresh(Container::TaskList);
    coordinator.settle().await;
    report_errors(coordinator.page())?;

    println!(
        "{}",
        cli_adapter::pretty_task_list(coordinator.page().task_list_html())
    );
    Ok(())
}

async fn run_trigger(args: &[String]) -> Result<()> {
    let mut common = CommonArgs::default();
    let mut index: Option<usize> = None;
    let mut task_name: Option<String> = None;
    let mut due_date: Option<String> = None;
    let mut next_run_time: Option<String> = None;
    let mut periodic_task_id: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        if let Some(next) = common.parse(args, i)? {
            i = next;
            continue;
        }
        match args[i].as_str() {
            "--index" => {
                let n: usize = flag_value(args, i)?.parse().context("invalid --index")?;
                if n == 0 {
                    bail!("--index starts at 1");
                }
                index = Some(n - 1);
                i += 2;
            }
            "--task-name" => {
                task_name = Some(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--due-date" => {
                due_date = Some(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--next-run-time" => {
                next_run_time = Some(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--periodic-task-id" => {
                periodic_task_id = Some(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--help" | "-h" => {
                print_trigger_usage();
                return Ok(());
            }
            other => bail!("unknown trigger argument: {other}"),
        }
    }

    let event = match (index, task_name, due_date) {
        (Some(index), None, None) => UiEvent::Trigger(index),
        (None, Some(task_name), Some(due_date)) => UiEvent::TriggerTask(TaskTriggerRequest {
            task_name,
            due_date,
            next_run_time,
            periodic_task_id,
        }),
        _ => bail!("give either --index or both --task-name and --due-date"),
    };

    let mut coordinator = common.connect().await?;
    coordinator.bootstrap().await?;
    coordinator.settle().await;
    coordinator.handle_event(event);
    coordinator.settle().await;
    report_errors(coordinator.page())?;

    println!(
        "{}",
        cli_adapter::pretty_event(&PageEvent::Replaced {
            container: Container::Conversation,
            html: coordinator.page().conversation_html(),
        })
    );
    println!(
        "{}",
        cli_adapter::pretty_task_list(coordinator.page().task_list_html())
    );
    Ok(())
}

async fn run_reset(args: &[String]) -> Result<()> {
    let mut common = CommonArgs::default();
    let mut i = 0;
    while i < args.len() {
        if let Some(next) = common.parse(args, i)? {
            i = next;
            continue;
        }
        match args[i].as_str() {
            "--help" | "-h" => {
                eprintln!("nudgie-chat reset [common options]");
                return Ok(());
            }
            other => bail!("unknown reset argument: {other}"),
        }
    }

    let mut coordinator = common.connect().await?;
    coordinator.reset();
    coordinator.settle().await;
    report_errors(coordinator.page())?;
    println!("user data reset");
    Ok(())
}

fn report_errors(page: &Page) -> Result<()> {
    let errors: Vec<&str> = page
        .turns()
        .filter(|turn| turn.speaker == Speaker::Error)
        .map(|turn| turn.text.as_str())
        .collect();
    if !errors.is_empty() {
        bail!("{}", errors.join("; "));
    }
    Ok(())
}

fn print_usage() {
    eprintln!(
        "nudgie-chat usage:\n  nudgie-chat chat [options]\n  nudgie-chat send --message <text> [options]\n  nudgie-chat tasks [options]\n  nudgie-chat trigger (--index <n> | --task-name <name> --due-date <date>) [options]\n  nudgie-chat reset [options]\n\ncommon options:\n  --config <path>\n  --base-url <url>\n  --session-id <cookie value>\n  --csrf-token <token>"
    );
}

fn print_chat_usage() {
    eprintln!("nudgie-chat chat options:\n  --date <value>\n\n{COMMANDS_HELP}");
}

fn print_send_usage() {
    eprintln!("nudgie-chat send options:\n  --message <text>\n  --datetime <value>");
}

fn print_tasks_usage() {
    eprintln!("nudgie-chat tasks [common options]");
}

fn print_trigger_usage() {
    eprintln!(
        "nudgie-chat trigger options:\n  --index <n>\n  --task-name <name>\n  --due-date <date>\n  --next-run-time <value>\n  --periodic-task-id <id>"
    );
}
