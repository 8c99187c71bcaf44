use std::io::{BufRead, Write};

use snafu::{OptionExt, ResultExt, Snafu};

use veritas::chat::{ChatSession, SubmitRejection, TurnEvent, WELCOME_TEXT};
use veritas::orchestrator::CompletionOrchestrator;
use veritas::research::ResearchLevel;
use veritas::settings::{API_KEY_ENV_VAR, SettingsStore};
use veritas_llm::{ProviderError, create_provider};

const APP_NAME: &str = "VERITAS";
const APP_VERSION: &str = "v1.0.0";

#[derive(Debug, Snafu)]
enum AppError {
    #[snafu(display(
        "no API key configured; set {API_KEY_ENV_VAR} or add \"api_key\" to {path}"
    ))]
    MissingApiKey { stage: &'static str, path: String },
    #[snafu(display("failed to initialize provider: {source}"))]
    ProviderInit {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("failed to read input: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write output: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

type AppResult<T> = Result<T, AppError>;

enum CommandOutcome {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run().await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let store = SettingsStore::load();
    let settings = store.settings().as_ref().clone().with_env_fallback();

    let config = settings.to_provider_config().context(MissingApiKeySnafu {
        stage: "load-provider-config",
        path: SettingsStore::default_config_path().display().to_string(),
    })?;
    let provider = create_provider(config).context(ProviderInitSnafu {
        stage: "create-provider",
    })?;
    let orchestrator = CompletionOrchestrator::new(provider)
        .with_models(&settings.model_fast, &settings.model_deep);

    run_repl(store, orchestrator, settings.default_level).await
}

async fn run_repl(
    store: SettingsStore,
    orchestrator: CompletionOrchestrator,
    initial_level: ResearchLevel,
) -> AppResult<()> {
    let mut level = initial_level;
    let mut session = ChatSession::with_welcome("New Inquiry");

    println!("{APP_NAME} {APP_VERSION}");
    println!("{WELCOME_TEXT}");
    println!("Commands: /quick /moderate /deep /levels /new /quit");
    println!("Current level: {level} ({})", level.description());

    let stdin = std::io::stdin();
    let mut input = String::new();

    loop {
        print!("> ");
        flush_stdout()?;

        input.clear();
        let bytes_read = stdin.lock().read_line(&mut input).context(ReadInputSnafu {
            stage: "read-prompt-line",
        })?;
        if bytes_read == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            match handle_command(command, &store, &mut level, &mut session) {
                CommandOutcome::Continue => continue,
                CommandOutcome::Quit => break,
            }
        }

        run_turn(&orchestrator, &mut session, level, line).await?;
    }

    Ok(())
}

fn handle_command(
    command: &str,
    store: &SettingsStore,
    level: &mut ResearchLevel,
    session: &mut ChatSession,
) -> CommandOutcome {
    match command.trim() {
        "quit" | "exit" => return CommandOutcome::Quit,
        "levels" => {
            for candidate in ResearchLevel::ALL {
                let marker = if candidate == *level { "*" } else { " " };
                println!("{marker} {:<8} {}", candidate.name(), candidate.description());
            }
        }
        "new" => {
            *session = ChatSession::with_welcome("New Inquiry");
            println!("{WELCOME_TEXT}");
        }
        other => match ResearchLevel::parse(other) {
            Some(selected) => {
                *level = selected;
                println!("Research level set to {selected}: {}", selected.description());
                persist_default_level(store, selected);
            }
            None => {
                println!("Unknown command '/{other}'. Commands: /quick /moderate /deep /levels /new /quit");
            }
        },
    }

    CommandOutcome::Continue
}

/// Remembers the chosen level as the default for the next launch. Persistence
/// failures are logged, not surfaced.
fn persist_default_level(store: &SettingsStore, level: ResearchLevel) {
    let mut settings = store.settings().as_ref().clone();
    settings.default_level = level;
    if let Err(error) = store.update(settings) {
        tracing::warn!(error = %error, "failed to persist default research level");
    }
}

async fn run_turn(
    orchestrator: &CompletionOrchestrator,
    session: &mut ChatSession,
    level: ResearchLevel,
    line: &str,
) -> AppResult<()> {
    let prepared = match session.submit(line) {
        Ok(prepared) => prepared,
        Err(SubmitRejection::EmptyPrompt) => return Ok(()),
        Err(SubmitRejection::RequestInFlight) => {
            println!("A response is still streaming; wait for it to finish.");
            return Ok(());
        }
    };

    if session.transcript().awaiting_first_chunk() {
        println!("[{level}] thinking...");
    }

    let mut stream = orchestrator.stream_completion(&prepared.prompt, &prepared.history, level);
    let mut stdout = std::io::stdout();

    while let Some(event) = stream.recv().await {
        match &event {
            TurnEvent::TextDelta(delta) => {
                write!(stdout, "{delta}").context(WriteOutputSnafu {
                    stage: "write-delta",
                })?;
                stdout.flush().context(WriteOutputSnafu {
                    stage: "flush-delta",
                })?;
            }
            TurnEvent::SourcesFound(_) => {}
            TurnEvent::Completed { sources, .. } => {
                println!();
                if !sources.is_empty() {
                    println!("Verified Sources:");
                    for (index, source) in sources.iter().enumerate() {
                        println!("  {}. {} <{}>", index + 1, source.title, source.uri);
                    }
                }
            }
            TurnEvent::Failed { .. } => {
                println!();
            }
        }
        session.apply_event(prepared.placeholder_id, event);
    }

    Ok(())
}

fn flush_stdout() -> AppResult<()> {
    std::io::stdout().flush().context(WriteOutputSnafu {
        stage: "flush-prompt",
    })
}
