//! `parley chat`: interactive session on the terminal.
//!
//! Lines are sent as prompts; lines starting with `/` are commands (see
//! [`HELP`]). Ctrl-C stops the response being generated, or leaves when
//! no response is in progress.

use crate::commands::ChatArgs;
use anyhow::{Context, Result, bail};
use parley_application::{SessionController, SessionEvent};
use parley_domain::{ResponseState, Session};
use parley_infrastructure::{
    EchoBackend, FileConfig, FileSessionStore, JsonlConversationLogger, KeywordRetrievalClient,
    LocalWorker, read_session_file, write_session_file,
};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Model loaded when neither `--model` nor `worker.default_model` names one.
const FALLBACK_MODEL: &str = "echo";

const HELP: &str = "\
Commands:
  /help               Show this help
  /regenerate         Generate the last response again
  /reset              Start over under a new session id
  /name <NAME>        Rename the session
  /collections        List enabled collections
  /add <NAME>         Enable a collection
  /remove <NAME>      Disable a collection
  /model <NAME>       Switch models
  /save               Save to the sessions directory
  /quit               Leave";

enum Flow {
    Continue,
    Quit,
}

pub async fn run(config: &FileConfig, args: ChatArgs) -> Result<()> {
    let session_config = config.to_session_config()?;

    let retrieval = Arc::new(
        KeywordRetrievalClient::new().with_retrieval_size(config.retrieval.retrieval_size),
    );
    for (name, dir) in &config.retrieval.collections {
        match retrieval.index_directory(name, Path::new(dir)) {
            Ok(count) => info!("Indexed {} documents into {}", count, name),
            Err(e) => warn!("Could not index collection {} at {}: {}", name, dir, e),
        }
    }

    let backend = EchoBackend::new()
        .with_models(config.worker.models.clone())
        .with_context_size(config.worker.context_size);
    let default_model = config
        .worker
        .default_model
        .clone()
        .unwrap_or_else(|| FALLBACK_MODEL.to_string());
    let worker = LocalWorker::new(backend).with_default_model(default_model);

    let mut session =
        SessionController::new(Session::new(), worker, retrieval.clone(), session_config)?;
    if let Some(dir) = config.persistence.sessions_dir() {
        session = session.with_session_store(Arc::new(FileSessionStore::new(dir)));
    }
    if let Some(path) = &config.logging.conversation_log
        && let Some(logger) = JsonlConversationLogger::new(path)
    {
        session = session.with_conversation_logger(Arc::new(logger));
    }
    let mut events = session.subscribe();

    if let Some(path) = &args.load {
        let stored =
            read_session_file(path).with_context(|| format!("reading {}", path.display()))?;
        session
            .deserialize(&stored.body, stored.version)
            .await
            .with_context(|| format!("restoring {}", path.display()))?;
        println!(
            "Resumed \"{}\" ({} turns)",
            session.name(),
            session.chat_model().len()
        );
    }

    let available = retrieval.collections();
    for name in &args.collections {
        if !available.contains(name) {
            warn!("Collection {} is not configured, it will match nothing", name);
        }
        session.add_collection(name.clone());
    }

    if let Some(model) = &args.model {
        session.load_model(model.clone())?;
    } else if !session.model_name().is_empty() {
        session.reload_model()?;
    } else {
        session.load_default_model()?;
    }
    wait_for_model(&mut session, &mut events).await?;
    println!("Model {} ready. Type /help for commands.", session.model_name());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    show_prompt();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if let Some(command) = line.strip_prefix('/') {
            match handle_command(&mut session, &mut events, command).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => eprintln!("error: {e:#}"),
            }
        } else if !line.is_empty() {
            session.new_prompt_response_pair(line).await?;
            match session.submit(line) {
                Ok(()) => stream_response(&mut session, &mut events).await,
                Err(e) => eprintln!("error: {e}"),
            }
        }
        show_prompt();
    }

    if let Some(path) = &args.save {
        let version = session.config().format_version;
        let body = session.serialize(version).await?;
        write_session_file(path, version, &body)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Saved to {}", path.display());
    } else if !session.chat_model().is_empty()
        && let Err(e) = session.save().await
    {
        warn!("Session not saved: {}", e);
    }

    session.unload_and_delete_later().await;
    Ok(())
}

fn show_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

async fn handle_command(
    session: &mut SessionController,
    events: &mut UnboundedReceiver<SessionEvent>,
    command: &str,
) -> Result<Flow> {
    let (name, arg) = command
        .split_once(' ')
        .map(|(n, a)| (n, a.trim()))
        .unwrap_or((command, ""));

    match (name, arg) {
        ("quit" | "exit", _) => return Ok(Flow::Quit),
        ("help", _) => println!("{HELP}"),
        ("regenerate", _) => {
            let Some(prompt) = session
                .chat_model()
                .last()
                .map(|t| t.prompt().to_string())
                .filter(|p| !p.is_empty())
            else {
                bail!("nothing to regenerate");
            };
            session.regenerate_response().await?;
            session.submit(prompt)?;
            stream_response(session, events).await;
        }
        ("reset", _) => {
            session.reset().await?;
            println!("New session {}", session.id());
        }
        ("name", name) if !name.is_empty() => session.set_name(name),
        ("collections", _) => {
            println!("Enabled: {}", session.collections().join(", "));
        }
        ("add", collection) if !collection.is_empty() => session.add_collection(collection),
        ("remove", collection) if !collection.is_empty() => {
            session.remove_collection(collection)
        }
        ("model", model) if !model.is_empty() => {
            session.set_model_name(model)?;
            wait_for_model(session, events).await?;
            println!("Model {} ready.", session.model_name());
        }
        ("save", _) => {
            session.save().await?;
            println!("Saved session {}", session.id());
        }
        _ => bail!("unknown command /{command}, try /help"),
    }
    Ok(Flow::Continue)
}

/// Process worker events until the model reports loaded or fails.
async fn wait_for_model(
    session: &mut SessionController,
    events: &mut UnboundedReceiver<SessionEvent>,
) -> Result<()> {
    loop {
        if !session.process_next_event().await {
            bail!("worker stopped while loading the model");
        }
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::ModelLoadedChanged(true) => return Ok(()),
                SessionEvent::ModelLoadingError(message) => bail!(message),
                _ => {}
            }
        }
    }
}

/// Print the response as it streams in. Ctrl-C stops generation.
async fn stream_response(
    session: &mut SessionController,
    events: &mut UnboundedReceiver<SessionEvent>,
) {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut printed = String::new();
    while session.response_in_progress() {
        tokio::select! {
            alive = session.process_next_event() => {
                if !alive {
                    break;
                }
            }
            () = cancel.cancelled() => session.stop_generating(),
        }
        render_events(session, events, &mut printed);
    }
    render_events(session, events, &mut printed);
    ctrl_c.abort();
    println!();
}

fn render_events(
    session: &SessionController,
    events: &mut UnboundedReceiver<SessionEvent>,
    printed: &mut String,
) {
    let mut stdout = std::io::stdout();
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::ResponseChanged(text) => {
                if let Some(rest) = text.strip_prefix(printed.as_str()) {
                    let _ = write!(stdout, "{rest}");
                    *printed = text;
                }
            }
            SessionEvent::ResponseStateChanged(
                state @ (ResponseState::RetrievingContext | ResponseState::ProcessingContext),
            ) => {
                eprintln!("[{}]", state.describe(session.collections()));
            }
            SessionEvent::ModelLoadingError(message) => eprintln!("error: {message}"),
            _ => {}
        }
    }
    let _ = stdout.flush();
}
