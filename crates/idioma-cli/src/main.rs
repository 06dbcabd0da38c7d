mod chat;
mod logging;
mod render;

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use idioma_contracts::events::EventWriter;
use idioma_contracts::options::{
    messages, LanguageVariant, OperationMode, OperationType, ReferenceCitationStyle, UiLanguage,
    WritingStyle,
};
use idioma_contracts::request::RequestDraft;
use idioma_engine::{
    attach_file, EngineConfig, ProcessingFailure, ProviderRegistry, Session, SessionState,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::render::{render_failure, render_options, render_result, PreviewEcho};

const PREVIEW_POLL_INTERVAL: Duration = Duration::from_millis(100);

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_REFUSED: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "idioma",
    version,
    about = "Rewrite, correct and enrich text in a chosen language variant"
)]
struct Cli {
    /// Raise log verbosity (repeatable).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process one request and print the result.
    Run(RunArgs),
    /// Interactive session.
    Chat(ChatArgs),
    /// List every option code.
    Options(OptionsArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Input text; `-` reads stdin.
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    url: Option<String>,
    /// Text (.txt, .md) or image file; repeatable.
    #[arg(long = "file")]
    files: Vec<PathBuf>,
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    #[arg(long, default_value_t = LanguageVariant::default())]
    source: LanguageVariant,
    #[arg(long, default_value_t = LanguageVariant::default())]
    target: LanguageVariant,
    #[arg(long, default_value_t = WritingStyle::default())]
    style: WritingStyle,
    #[arg(long, default_value_t = OperationMode::default())]
    mode: OperationMode,
    /// Operation type; repeatable. Defaults to rewrite.
    #[arg(long = "op")]
    ops: Vec<OperationType>,
    #[arg(long, default_value_t = ReferenceCitationStyle::default())]
    cite: ReferenceCitationStyle,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value_t = UiLanguage::default())]
    ui_lang: UiLanguage,
    /// Append session events as JSON lines to this file.
    #[arg(long)]
    events: Option<PathBuf>,
    /// Append the reference list to the final text.
    #[arg(long)]
    insert_sources: bool,
    /// Print the final result as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
pub(crate) struct ChatArgs {
    #[arg(long)]
    pub(crate) model: Option<String>,
    #[arg(long, default_value_t = UiLanguage::default())]
    pub(crate) ui_lang: UiLanguage,
    #[arg(long)]
    pub(crate) events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct OptionsArgs {
    #[arg(long, default_value_t = UiLanguage::default())]
    ui_lang: UiLanguage,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("idioma error: {err:#}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet)?;
    match cli.command {
        Command::Run(args) => run_once(args),
        Command::Chat(args) => {
            chat::run_chat(args)?;
            Ok(EXIT_OK)
        }
        Command::Options(args) => {
            println!("{}", render_options(args.ui_lang));
            Ok(EXIT_OK)
        }
    }
}

pub(crate) fn new_session(
    model: Option<String>,
    events: Option<PathBuf>,
    ui_lang: UiLanguage,
) -> Result<Session> {
    let mut config = EngineConfig::from_env();
    if let Some(model) = model {
        config.model = Some(model);
    }
    let session_id = format!("idioma-{}", Uuid::new_v4().simple());
    let events = events.map(|path| EventWriter::new(path, session_id.clone()));
    let providers = ProviderRegistry::with_defaults(&config)?;
    let mut session = Session::new(config, providers, events)?;
    session.set_ui_language(ui_lang);
    info!(session_id, "session ready");
    Ok(session)
}

fn read_text_arg(raw: &str) -> Result<String> {
    if raw != "-" {
        return Ok(raw.to_string());
    }
    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("failed reading input text from stdin")?;
    Ok(text)
}

fn draft_from_args(args: &RunArgs) -> Result<RequestDraft> {
    let mut draft = RequestDraft::new();
    draft.source_variant = args.source;
    draft.target_variant = args.target;
    draft.writing_style = args.style;
    draft.operation_mode = args.mode;
    draft.citation_style = args.cite;
    if !args.ops.is_empty() {
        draft.set_operations(args.ops.iter().copied());
    }
    if let Some(text) = args.text.as_deref() {
        draft.append_text(&read_text_arg(text)?);
    }
    if let Some(url) = args.url.as_deref() {
        draft.raw_url = url.trim().to_string();
    }
    for path in args.files.iter().chain(args.images.iter()) {
        attach_file(&mut draft, path)?;
    }
    Ok(draft)
}

fn exit_code_for(state: &SessionState) -> i32 {
    if state.result.is_some() {
        return EXIT_OK;
    }
    match state.failure.as_ref() {
        Some(ProcessingFailure::Refused(_)) => EXIT_REFUSED,
        Some(_) => EXIT_FAILURE,
        None if state.last_outcome.as_deref() == Some("cancelled") => EXIT_CANCELLED,
        None => EXIT_FAILURE,
    }
}

#[cfg(unix)]
fn install_interrupt_flag(flag: &Arc<AtomicBool>) {
    if let Err(err) = signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(flag)) {
        warn!("Ctrl-C will not stop the stream: {err}");
    }
}

#[cfg(not(unix))]
fn install_interrupt_flag(_flag: &Arc<AtomicBool>) {}

/// Echoes the preview until the stream ends. A raised `interrupted` flag
/// stops the stream, keeping the last preview.
fn follow_stream(
    session: &mut Session,
    interrupted: &AtomicBool,
    out: &mut impl Write,
) -> Result<SessionState> {
    let view = session.view();
    let mut echo = PreviewEcho::default();
    loop {
        let state = view.snapshot();
        echo.update(&state, out)?;
        if !state.loading {
            break;
        }
        if interrupted.swap(false, Ordering::SeqCst) && session.stop() {
            info!("stream interrupted");
        }
        thread::sleep(PREVIEW_POLL_INTERVAL);
    }
    let state = session.wait();
    echo.update(&state, out)?;
    echo.finish(out)?;
    Ok(state)
}

fn run_once(args: RunArgs) -> Result<i32> {
    let lang = args.ui_lang;
    let params = draft_from_args(&args)?.snapshot()?;
    let mode = params.operation_mode;
    let mut session = new_session(args.model.clone(), args.events.clone(), lang)?;

    let selection = session.submit(params)?;
    if let Some(reason) = selection.fallback_reason.as_deref() {
        warn!("{reason} Using {}.", selection.model.name);
    }
    eprintln!("{}", messages(lang).streaming_placeholder);

    let interrupted = Arc::new(AtomicBool::new(false));
    install_interrupt_flag(&interrupted);
    let mut state = follow_stream(&mut session, &interrupted, &mut io::stderr())?;

    if state.result.is_some() && args.insert_sources {
        if !session.insert_references() {
            eprintln!("{}", messages(lang).no_references);
        }
        state = session.snapshot();
    }

    match (&state.result, &state.failure) {
        (Some(result), _) => {
            let mut stdout = io::stdout().lock();
            if args.json {
                writeln!(stdout, "{}", serde_json::to_string_pretty(result)?)?;
            } else {
                writeln!(stdout, "{}", render_result(result, mode, lang))?;
            }
        }
        (None, Some(failure)) => eprintln!("{}", render_failure(failure, lang)),
        (None, None) => eprintln!("{}", messages(lang).cancelled),
    }
    Ok(exit_code_for(&state))
}
