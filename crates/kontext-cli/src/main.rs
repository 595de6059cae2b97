use std::cell::RefCell;
use std::collections::HashSet;
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use kontext_contracts::commands::{parse_intent, parse_param_pairs, SESSION_HELP_COMMANDS};
use kontext_contracts::events::EventWriter;
use kontext_contracts::methods::{MethodRegistry, ParamKind};
use kontext_contracts::ImageRecord;
use kontext_engine::{
    BatchOutcome, DeleteOutcome, GatewayConfig, GenerationError, GenerationOutcome, HttpGateway,
    MemorySurface, NoticeLevel, NotificationCenter, Notifier, RemoteGateway, Session,
    SessionConfig, SessionParts, SessionReply, UploadFile, ViewMode, Viewport,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::task::LocalSet;

const DEFAULT_EVENTS_FILE: &str = "kontext-events.jsonl";

#[derive(Debug, Parser)]
#[command(name = "kontext-rs", version, about = "Kontext image studio gallery client")]
struct Cli {
    /// Base URL of the studio API (overrides KONTEXT_API_BASE).
    #[arg(long, global = true)]
    api_base: Option<String>,
    /// JSONL event log path (overrides KONTEXT_EVENTS).
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive gallery session.
    Session(SessionArgs),
    /// Print the remote history.
    History,
    /// Submit one generation request.
    Generate(GenerateArgs),
    /// Upload image files straight into the gallery.
    Drop(DropArgs),
    /// Delete records from the remote history.
    Delete(DeleteArgs),
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[arg(long, default_value_t = 1200)]
    width: u32,
    #[arg(long, default_value_t = 100)]
    zoom: u32,
    #[arg(long, default_value = "grid")]
    view: String,
    /// Answer yes to every confirmation.
    #[arg(long)]
    yes: bool,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value_t = 1)]
    count: u64,
    #[arg(long, default_value = "1:1")]
    aspect: String,
    #[arg(long)]
    method: Option<String>,
    /// Reference image uploaded before generating.
    #[arg(long)]
    reference: Option<PathBuf>,
    /// Method parameter override, `key=value`; repeatable.
    #[arg(long = "param")]
    params: Vec<String>,
}

#[derive(Debug, Parser)]
struct DropArgs {
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
struct DeleteArgs {
    #[arg(required = true)]
    ids: Vec<String>,
    #[arg(long)]
    yes: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("kontext-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed starting tokio runtime")?;
    LocalSet::new().block_on(&runtime, run_command(cli))
}

async fn run_command(cli: Cli) -> Result<i32> {
    let mut config = GatewayConfig::from_env();
    if let Some(api_base) = cli.api_base.clone() {
        config = config.with_api_base(api_base);
    }
    let gateway = Rc::new(HttpGateway::new(config)?);
    let events_path = cli
        .events
        .clone()
        .or_else(|| non_empty_env("KONTEXT_EVENTS").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EVENTS_FILE));
    let events = EventWriter::new(events_path, uuid::Uuid::new_v4().to_string());
    let console = Rc::new(Console::new());

    match cli.command {
        Command::Session(args) => run_session(gateway, events, console, args).await,
        Command::History => run_history(gateway.as_ref()).await,
        Command::Generate(args) => run_generate(gateway, events, console, args).await,
        Command::Drop(args) => run_drop(gateway, events, console, args).await,
        Command::Delete(args) => run_delete(gateway, events, console, args).await,
    }
}

/// Owns the stdin line reader so the REPL and confirmations never read concurrently.
struct Console {
    lines: RefCell<Option<Lines<BufReader<Stdin>>>>,
}

impl Console {
    fn new() -> Self {
        Self {
            lines: RefCell::new(Some(BufReader::new(tokio::io::stdin()).lines())),
        }
    }

    async fn read_line(&self) -> Result<Option<String>> {
        let Some(mut lines) = self.lines.borrow_mut().take() else {
            return Ok(None);
        };
        let line = lines.next_line().await;
        *self.lines.borrow_mut() = Some(lines);
        Ok(line?)
    }
}

struct TerminalNotifier {
    center: NotificationCenter,
    console: Rc<Console>,
    assume_yes: bool,
}

#[async_trait(?Send)]
impl Notifier for TerminalNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.center.prune_expired();
        self.center.notify(level, message);
        match level {
            NoticeLevel::Error => eprintln!("[{}] {message}", level.as_str()),
            _ => println!("[{}] {message}", level.as_str()),
        }
    }

    async fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{message} [y/N] ");
        let _ = io::stdout().flush();
        match self.console.read_line().await {
            Ok(Some(answer)) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

fn build_session(
    gateway: Rc<HttpGateway>,
    events: EventWriter,
    console: Rc<Console>,
    config: SessionConfig,
    assume_yes: bool,
) -> (Rc<Session>, Rc<MemorySurface>, Rc<TerminalNotifier>) {
    let surface = Rc::new(MemorySurface::new());
    let notifier = Rc::new(TerminalNotifier {
        center: NotificationCenter::new(config.notice_ttl),
        console,
        assume_yes,
    });
    let assets = Rc::new(gateway.asset_probe());
    let session = Session::new(
        SessionParts {
            gateway,
            surface: surface.clone(),
            notifier: notifier.clone(),
            assets,
            events,
            methods: MethodRegistry::default(),
        },
        config,
    );
    (Rc::new(session), surface, notifier)
}

async fn run_session(
    gateway: Rc<HttpGateway>,
    events: EventWriter,
    console: Rc<Console>,
    args: SessionArgs,
) -> Result<i32> {
    let Some(view) = ViewMode::parse(&args.view) else {
        bail!("unknown view mode '{}' (expected grid or list)", args.view);
    };
    let config = SessionConfig {
        viewport: Viewport {
            width: args.width,
            zoom: args.zoom,
            view,
        },
        ..SessionConfig::default()
    };
    let events_path = events.path().to_path_buf();
    let (session, surface, notifier) =
        build_session(gateway, events, Rc::clone(&console), config, args.yes);

    println!("Kontext session started. Type /help for commands.");
    println!("Events: {}", events_path.display());
    let loaded = session.hydrate().await;
    println!("Loaded {loaded} image(s) from history.");

    let pump = {
        let session = Rc::clone(&session);
        tokio::task::spawn_local(async move {
            loop {
                match session.next_timer() {
                    Some(deadline) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(deadline) => {
                                session.fire_due();
                            }
                            _ = session.timers_changed() => {}
                        }
                    }
                    None => session.timers_changed().await,
                }
            }
        })
    };

    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = console.read_line().await? else {
            break;
        };
        let intent = parse_intent(&line);
        if intent.action == "noop" {
            continue;
        }

        // Long-running requests run in the background so the prompt stays responsive.
        if matches!(
            intent.action.as_str(),
            "generate" | "enhance_prompt" | "drop_files"
        ) {
            let session = Rc::clone(&session);
            let surface = Rc::clone(&surface);
            let notifier = Rc::clone(&notifier);
            tokio::task::spawn_local(async move {
                let reply = session.dispatch(&intent).await;
                print_reply(&session, &surface, &notifier.center, &reply);
            });
            continue;
        }

        let reply = session.dispatch(&intent).await;
        if reply == SessionReply::Quit {
            break;
        }
        print_reply(&session, &surface, &notifier.center, &reply);
    }

    pump.abort();
    Ok(0)
}

async fn run_history(gateway: &HttpGateway) -> Result<i32> {
    let records = gateway
        .fetch_history()
        .await
        .context("failed loading history")?;
    if records.is_empty() {
        println!("History is empty.");
    }
    for record in &records {
        print_record(record, false, true);
    }
    Ok(0)
}

async fn run_generate(
    gateway: Rc<HttpGateway>,
    events: EventWriter,
    console: Rc<Console>,
    args: GenerateArgs,
) -> Result<i32> {
    let (session, _surface, _notifier) =
        build_session(gateway, events, console, SessionConfig::default(), true);

    if let Some(method) = &args.method {
        session.set_method(method);
    }
    if !session.set_count(Some(args.count)) || !session.set_aspect_ratio(&args.aspect) {
        return Ok(2);
    }
    session.merge_params(&parse_param_pairs(args.params.iter().map(String::as_str)));
    session.set_prompt(&args.prompt);
    if let Some(path) = &args.reference {
        let file = UploadFile::from_path(path)?;
        if session.uploads().stage_reference(file).await?.is_none() {
            return Ok(1);
        }
    }

    let outcome = session.generate().await;
    session.run_until_idle().await;
    match outcome {
        Ok(GenerationOutcome::Generated(records)) => {
            for record in &records {
                print_record(record, false, true);
            }
            Ok(0)
        }
        Ok(GenerationOutcome::Empty) => Ok(0),
        Ok(GenerationOutcome::Failed) => Ok(1),
        Err(GenerationError::Busy) => Ok(1),
        Err(GenerationError::Invalid(_)) => Ok(2),
    }
}

async fn run_drop(
    gateway: Rc<HttpGateway>,
    events: EventWriter,
    console: Rc<Console>,
    args: DropArgs,
) -> Result<i32> {
    let (session, _surface, _notifier) =
        build_session(gateway, events, console, SessionConfig::default(), true);
    let mut files = Vec::new();
    let mut unreadable = 0;
    for path in &args.paths {
        match UploadFile::from_path(path) {
            Ok(file) => files.push(file),
            Err(err) => {
                eprintln!("[error] Could not read {}: {err:#}", path.display());
                unreadable += 1;
            }
        }
    }

    let outcome = match session.uploads().drop_loaded(files, unreadable).await {
        Ok(outcome) => outcome,
        Err(_) => return Ok(2),
    };
    session.run_until_idle().await;
    for record in session.gallery().borrow().iter() {
        print_record(record, false, true);
    }
    Ok(if outcome.unprocessed() == 0 { 0 } else { 1 })
}

async fn run_delete(
    gateway: Rc<HttpGateway>,
    events: EventWriter,
    console: Rc<Console>,
    args: DeleteArgs,
) -> Result<i32> {
    let (session, _surface, _notifier) =
        build_session(gateway, events, console, SessionConfig::default(), args.yes);

    if let [id] = args.ids.as_slice() {
        let outcome = session.commands().delete(id).await;
        session.run_until_idle().await;
        return Ok(match outcome {
            DeleteOutcome::Deleted | DeleteOutcome::Cancelled => 0,
            DeleteOutcome::Failed => 1,
        });
    }

    session.hydrate().await;
    let selected = session.commands().select(&args.ids);
    if selected < args.ids.len() {
        eprintln!(
            "{} id(s) are not in the history and were skipped",
            args.ids.len() - selected
        );
    }
    let outcome = session.commands().delete_selected().await;
    session.run_until_idle().await;
    Ok(match outcome {
        Ok(Some(BatchOutcome { failed: 0, .. })) | Ok(None) => 0,
        Ok(Some(_)) => 1,
        Err(_) => 2,
    })
}

fn print_reply(
    session: &Session,
    surface: &MemorySurface,
    notices: &NotificationCenter,
    reply: &SessionReply,
) {
    match reply {
        SessionReply::Help => println!("Commands: {}", SESSION_HELP_COMMANDS.join(" ")),
        SessionReply::ShowGallery => {
            print_gallery(session, surface);
            for notice in notices.visible() {
                println!("  ({}) {}", notice.level.as_str(), notice.message);
            }
        }
        SessionReply::ShowLayout => {
            let layout = session.layout().state();
            println!(
                "Layout: {} view, {} column(s), zoom {}%, gap {}px, width {}px",
                layout.view.as_str(),
                layout.columns,
                layout.zoom,
                layout.gap_px,
                session.layout().width()
            );
        }
        SessionReply::ShowMethods => print_methods(session),
        SessionReply::Busy => println!("A request is already in progress."),
        SessionReply::Generated(GenerationOutcome::Generated(records)) => {
            for record in records {
                print_record(record, false, false);
            }
        }
        SessionReply::Unknown(raw) => println!("Unknown command: {raw} (type /help)"),
        _ => {}
    }
}

fn print_gallery(session: &Session, surface: &MemorySurface) {
    let visible: HashSet<String> = surface.visible_card_ids().into_iter().collect();
    let gallery = session.gallery().borrow();
    if gallery.is_empty() {
        println!("Gallery is empty.");
        return;
    }
    for record in gallery.iter() {
        let selected = gallery.is_selected(&record.id);
        print_record(record, selected, visible.contains(&record.id));
    }
    let form = session.form();
    println!(
        "{} image(s), {} selected. Next request: {} x{} ({}), prompt: {}",
        gallery.len(),
        gallery.selection_len(),
        form.method,
        form.count,
        form.aspect_ratio,
        if form.prompt.is_empty() { "<empty>" } else { form.prompt.as_str() }
    );
}

fn print_record(record: &ImageRecord, selected: bool, visible: bool) {
    let mark = if selected { "[x]" } else { "[ ]" };
    let loading = if visible { "" } else { " (loading)" };
    println!(
        "{mark} {}  {}  {}  {}{loading}",
        record.id,
        record.display_model(),
        record.display_prompt(),
        record.full_url()
    );
}

fn print_methods(session: &Session) {
    let current = session.form().method;
    for method in session.orchestrator().methods().list() {
        let marker = if method.name == current { "*" } else { " " };
        let reference = if method.requires_reference {
            " (needs reference)"
        } else {
            ""
        };
        println!("{marker} {} - {}{reference}", method.name, method.label);
        for param in &method.params {
            let detail = match &param.kind {
                ParamKind::Float { default, min, max } => format!("{default} [{min}..{max}]"),
                ParamKind::Int { default, min, max } => format!("{default} [{min}..{max}]"),
                ParamKind::Choice { default, options } => {
                    format!("{default} ({})", options.join("|"))
                }
                ParamKind::Flag { default } => format!("{default}"),
            };
            println!("      {} = {detail}", param.name);
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
