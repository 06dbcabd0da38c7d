use std::io::{self, ErrorKind, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use idioma_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use idioma_contracts::options::{
    messages, LanguageVariant, OperationMode, OperationType, OptionParseError, OptionSet,
    ReferenceCitationStyle, UiLanguage, WritingStyle,
};
use idioma_contracts::request::RequestDraft;
use idioma_engine::{attach_file, Attachment, Session, SessionView};
use tracing::debug;

use crate::render::{render_failure, render_options, render_result, render_status, PreviewEcho};
use crate::ChatArgs;

const WATCH_INTERVAL: Duration = Duration::from_millis(120);

/// How finished streams are rendered by the watcher thread.
#[derive(Debug, Clone, Copy)]
struct RenderPrefs {
    lang: UiLanguage,
    mode: OperationMode,
}

type SharedPrefs = Arc<Mutex<RenderPrefs>>;

fn read_prefs(prefs: &SharedPrefs) -> RenderPrefs {
    *prefs.lock().unwrap_or_else(PoisonError::into_inner)
}

fn update_prefs(prefs: &SharedPrefs, apply: impl FnOnce(&mut RenderPrefs)) {
    apply(&mut prefs.lock().unwrap_or_else(PoisonError::into_inner));
}

/// Echoes the live preview to stderr and prints each finished stream once.
fn spawn_watcher(
    view: SessionView,
    prefs: SharedPrefs,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("idioma-watch".to_string())
        .spawn(move || {
            let mut echo = PreviewEcho::default();
            let mut reported_generation = 0u64;
            while !stop.load(Ordering::SeqCst) {
                let state = view.snapshot();
                let stderr = io::stderr();
                let _ = echo.update(&state, &mut stderr.lock());

                let finished = !state.loading && state.last_outcome.is_some();
                if finished && state.generation != reported_generation {
                    reported_generation = state.generation;
                    let _ = echo.finish(&mut stderr.lock());
                    let RenderPrefs { lang, mode } = read_prefs(&prefs);
                    match (&state.result, &state.failure) {
                        (Some(result), _) => println!("{}", render_result(result, mode, lang)),
                        (None, Some(failure)) => println!("{}", render_failure(failure, lang)),
                        (None, None) => println!("{}", messages(lang).cancelled),
                    }
                    print!("> ");
                    let _ = io::stdout().flush();
                }
                thread::sleep(WATCH_INTERVAL);
            }
        })
        .context("failed to start preview watcher")
}

fn parse_option<T>(intent: &Intent) -> Result<T, String>
where
    T: OptionSet + FromStr<Err = OptionParseError>,
{
    let Some(raw) = intent.arg_str("value") else {
        return Err(format!("missing {} (see /options)", T::KIND));
    };
    raw.parse::<T>().map_err(|err| err.to_string())
}

fn describe_attachment(path: &Path, attachment: &Attachment) -> String {
    match attachment {
        Attachment::Image { mime_type, bytes } => {
            format!("Attached image {} ({mime_type}, {bytes} bytes)", path.display())
        }
        Attachment::Text { chars } => {
            format!("Appended {} ({chars} chars)", path.display())
        }
    }
}

fn operations_text(draft: &RequestDraft) -> String {
    let codes = draft
        .operations()
        .iter()
        .map(|operation| operation.code())
        .collect::<Vec<&str>>();
    if codes.is_empty() {
        "(none)".to_string()
    } else {
        codes.join(", ")
    }
}

/// Applies one chat line to the draft and session. Returns false on quit.
fn handle_intent(
    intent: &Intent,
    draft: &mut RequestDraft,
    session: &mut Session,
    prefs: &SharedPrefs,
) -> bool {
    let lang = session.ui_language();
    let msgs = messages(lang);
    match intent.action.as_str() {
        "noop" => {}
        "help" => println!("Commands: {}", CHAT_HELP_COMMANDS.join(" ")),
        "append_text" => {
            if let Some(text) = intent.text.as_deref() {
                if !draft.raw_text.is_empty() {
                    draft.raw_text.push('\n');
                }
                draft.raw_text.push_str(text);
            }
        }
        "set_source" => match parse_option::<LanguageVariant>(intent) {
            Ok(variant) => {
                draft.source_variant = variant;
                println!("Source set to {}", variant.display_name());
            }
            Err(err) => println!("{err}"),
        },
        "set_target" => match parse_option::<LanguageVariant>(intent) {
            Ok(variant) => {
                draft.target_variant = variant;
                println!("Target set to {}", variant.display_name());
            }
            Err(err) => println!("{err}"),
        },
        "set_style" => match parse_option::<WritingStyle>(intent) {
            Ok(style) => {
                draft.writing_style = style;
                println!("Style set to {}", style.label(lang));
            }
            Err(err) => println!("{err}"),
        },
        "set_mode" => match parse_option::<OperationMode>(intent) {
            Ok(mode) => {
                draft.operation_mode = mode;
                println!("Mode set to {}: {}", mode.label(lang), mode.description(lang));
            }
            Err(err) => println!("{err}"),
        },
        "set_citation" => match parse_option::<ReferenceCitationStyle>(intent) {
            Ok(style) => {
                draft.citation_style = style;
                println!("Citation style set to {}", style.label(lang));
            }
            Err(err) => println!("{err}"),
        },
        "toggle_operation" => match parse_option::<OperationType>(intent) {
            Ok(operation) => {
                let selected = draft.toggle_operation(operation);
                println!(
                    "{} {}. Operations: {}",
                    operation.label(lang),
                    if selected { "on" } else { "off" },
                    operations_text(draft)
                );
            }
            Err(err) => println!("{err}"),
        },
        "set_ui_language" => {
            let next = match intent.arg_str("value") {
                Some(raw) => match raw.parse::<UiLanguage>() {
                    Ok(next) => next,
                    Err(err) => {
                        println!("{err}");
                        return true;
                    }
                },
                None => lang.toggled(),
            };
            session.set_ui_language(next);
            update_prefs(prefs, |prefs| prefs.lang = next);
            println!("{}", next.label(next));
        }
        "set_model" => match intent.arg_str("value") {
            Some(model) => {
                session.set_model(Some(model.to_string()));
                println!("Model set to {model}");
            }
            None => {
                let models = session
                    .model_registry()
                    .list()
                    .map(|spec| spec.name.as_str())
                    .collect::<Vec<&str>>();
                println!(
                    "Model: {} (available: {})",
                    session.model().unwrap_or("(default)"),
                    models.join(", ")
                );
            }
        },
        "set_url" => {
            draft.raw_url = intent.arg_str("value").unwrap_or_default().to_string();
            println!("URL: {}", if draft.raw_url.is_empty() { "-" } else { &draft.raw_url });
        }
        "clear_url" => {
            draft.raw_url.clear();
            println!("URL cleared");
        }
        "clear_text" => {
            draft.raw_text.clear();
            println!("Text cleared");
        }
        "attach_file" => {
            let paths = intent.arg_strings("paths");
            if paths.is_empty() {
                println!("/file requires at least one path");
            }
            for raw in paths {
                let path = Path::new(&raw);
                match attach_file(draft, path) {
                    Ok(attachment) => println!("{}", describe_attachment(path, &attachment)),
                    Err(err) => println!("{err:#}"),
                }
            }
        }
        "remove_image" => match intent.arg_index("index") {
            Some(index) => match draft.remove_image(index) {
                Some(_) => println!("Image {} removed ({} left)", index + 1, draft.images().len()),
                None => println!("No image {}", index + 1),
            },
            None => println!("/remove_image requires a 1-based index"),
        },
        "run" => match draft.snapshot() {
            Ok(params) => {
                let mode = params.operation_mode;
                match session.submit(params) {
                    Ok(selection) => {
                        update_prefs(prefs, |prefs| prefs.mode = mode);
                        if let Some(reason) = selection.fallback_reason.as_deref() {
                            println!("{reason} Using {}.", selection.model.name);
                        }
                        eprintln!("{}", msgs.streaming_placeholder);
                    }
                    Err(err) => println!("{err:#}"),
                }
            }
            Err(err) => println!("{err}"),
        },
        "toggle_pause" => match session.toggle_pause() {
            Some(true) => println!("{}", msgs.paused),
            Some(false) => println!("{}", msgs.resumed),
            None => println!("Nothing is streaming"),
        },
        "resume" => {
            if session.resume() {
                println!("{}", msgs.resumed);
            } else {
                println!("Nothing is streaming");
            }
        }
        "stop" => {
            if !session.stop() {
                println!("Nothing is streaming");
            }
        }
        "reset" => {
            session.reset();
            draft.clear_inputs();
            println!("{}", msgs.reset_done);
        }
        "clear_output" => {
            if !session.clear_output() {
                println!("Stop the running stream first");
            }
        }
        "status" => println!(
            "{}",
            render_status(draft, &session.snapshot(), session.model(), lang)
        ),
        "show_result" => {
            let state = session.snapshot();
            let mode = read_prefs(prefs).mode;
            match (&state.result, &state.failure) {
                (Some(result), _) => println!("{}", render_result(result, mode, lang)),
                (None, Some(failure)) => println!("{}", render_failure(failure, lang)),
                (None, None) if !state.preview.is_empty() => println!("{}", state.preview),
                (None, None) => println!("No result yet"),
            }
        }
        "insert_sources" => {
            if session.insert_references() {
                println!("{}", msgs.sources_inserted);
                if let Some(result) = session.snapshot().result {
                    println!("{}", result.text);
                }
            } else {
                println!("{}", msgs.no_references);
            }
        }
        "list_options" => println!("{}", render_options(lang)),
        "quit" => return false,
        "unknown" => {
            let command = intent
                .command_args
                .get("command")
                .and_then(|value| value.as_str())
                .unwrap_or_default();
            println!("Unknown command: /{command}. Type /help for commands.");
        }
        other => debug!(action = other, "unhandled chat action"),
    }
    true
}

pub(crate) fn run_chat(args: ChatArgs) -> Result<()> {
    let mut session = crate::new_session(args.model, args.events, args.ui_lang)?;
    let mut draft = RequestDraft::new();
    let prefs: SharedPrefs = Arc::new(Mutex::new(RenderPrefs {
        lang: args.ui_lang,
        mode: draft.operation_mode,
    }));
    let stop = Arc::new(AtomicBool::new(false));
    let watcher = spawn_watcher(session.view(), Arc::clone(&prefs), Arc::clone(&stop))?;

    println!("IdiomaSwitch chat started. Type text to add input, /run to process, /help for commands.");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        if !handle_intent(&intent, &mut draft, &mut session, &prefs) {
            break;
        }
    }

    session.stop();
    stop.store(true, Ordering::SeqCst);
    if watcher.join().is_err() {
        debug!("preview watcher panicked");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use idioma_engine::{DryrunProvider, EngineConfig, ProviderRegistry};

    use super::*;

    fn fixture() -> Result<(RequestDraft, Session, SharedPrefs)> {
        let mut providers = ProviderRegistry::new();
        providers.register(DryrunProvider::new());
        let config = EngineConfig {
            model: Some("dryrun-text-1".to_string()),
            ..EngineConfig::default()
        };
        let session = Session::new(config, providers, None)?;
        let prefs = Arc::new(Mutex::new(RenderPrefs {
            lang: UiLanguage::Pt,
            mode: OperationMode::Professional,
        }));
        Ok((RequestDraft::new(), session, prefs))
    }

    fn apply(lines: &[&str], draft: &mut RequestDraft, session: &mut Session, prefs: &SharedPrefs) {
        for line in lines {
            assert!(handle_intent(&parse_intent(line), draft, session, prefs));
        }
    }

    #[test]
    fn typed_lines_and_options_shape_the_draft() -> Result<()> {
        let (mut draft, mut session, prefs) = fixture()?;
        apply(
            &[
                "Primeira linha",
                "Segunda linha",
                "/target en-us",
                "/style writer-fiction",
                "/mode expert",
                "/op enrich",
                "/op rewrite",
                "/cite name-only",
                "/url https://example.pt",
                "/target pt-br",
            ],
            &mut draft,
            &mut session,
            &prefs,
        );
        assert_eq!(draft.raw_text, "Primeira linha\nSegunda linha");
        assert_eq!(draft.target_variant, LanguageVariant::EnUs);
        assert_eq!(draft.writing_style, WritingStyle::WriterFiction);
        assert_eq!(draft.operation_mode, OperationMode::Expert);
        assert_eq!(draft.operations(), &[OperationType::Enrich]);
        assert_eq!(draft.citation_style, ReferenceCitationStyle::NameOnly);
        assert_eq!(draft.raw_url, "https://example.pt");
        Ok(())
    }

    #[test]
    fn lang_without_argument_toggles() -> Result<()> {
        let (mut draft, mut session, prefs) = fixture()?;
        apply(&["/lang"], &mut draft, &mut session, &prefs);
        assert_eq!(session.ui_language(), UiLanguage::En);
        assert_eq!(read_prefs(&prefs).lang, UiLanguage::En);
        apply(&["/lang pt"], &mut draft, &mut session, &prefs);
        assert_eq!(session.ui_language(), UiLanguage::Pt);
        Ok(())
    }

    #[test]
    fn files_attach_and_images_can_be_removed() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = temp.path().join("a b.gif");
        fs::write(&photo, b"GIF89a")?;
        let (mut draft, mut session, prefs) = fixture()?;

        let line = format!("/image \"{}\"", photo.display());
        apply(&[line.as_str()], &mut draft, &mut session, &prefs);
        assert_eq!(draft.images().len(), 1);
        assert_eq!(draft.images()[0].mime_type, "image/gif");

        apply(&["/remove_image 2", "/remove_image 1"], &mut draft, &mut session, &prefs);
        assert!(draft.images().is_empty());
        Ok(())
    }

    #[test]
    fn run_then_reset_clears_inputs_and_output() -> Result<()> {
        let (mut draft, mut session, prefs) = fixture()?;
        apply(&["/mode expert", "Olá", "/run"], &mut draft, &mut session, &prefs);
        assert_eq!(read_prefs(&prefs).mode, OperationMode::Expert);

        let state = session.wait();
        assert_eq!(
            state.result.map(|result| result.text),
            Some("[REWRITE] Olá".to_string())
        );

        apply(&["/reset"], &mut draft, &mut session, &prefs);
        assert!(draft.raw_text.is_empty());
        assert_eq!(draft.operation_mode, OperationMode::Expert);
        assert!(session.snapshot().result.is_none());
        Ok(())
    }

    #[test]
    fn quit_ends_the_loop() -> Result<()> {
        let (mut draft, mut session, prefs) = fixture()?;
        assert!(!handle_intent(&parse_intent("/exit"), &mut draft, &mut session, &prefs));
        assert!(handle_intent(&parse_intent("/bogus"), &mut draft, &mut session, &prefs));
        Ok(())
    }
}
