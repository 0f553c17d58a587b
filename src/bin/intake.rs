//! Intake CLI — conversational questionnaire assistant.
//!
//! Usage:
//!   intake chat [--questions path] [--prompt path] [--resume path] [--save path]
//!   intake export --snapshot path --format csv|json|markdown [--out path]

use clap::{Parser, Subcommand, ValueEnum};
use intake::session::snapshot::{export_session_data, import_session_data};
use intake::{
    export, notify::LogNotifier, summary, ConversationController, FinalizeError,
    OpenAiOracle, QuestionnaireConfig, Session, TurnError, TurnOutcome,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "intake",
    version,
    about = "Conversational questionnaire assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive questionnaire in the terminal
    Chat {
        /// Path to a questions file (one question per line)
        #[arg(long)]
        questions: Option<PathBuf>,
        /// Path to a system prompt file
        #[arg(long)]
        prompt: Option<PathBuf>,
        /// Resume from a saved session snapshot
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Where to save the session snapshot (default: data dir)
        #[arg(long)]
        save: Option<PathBuf>,
        /// Override the model name
        #[arg(long)]
        model: Option<String>,
        /// Cap the number of transcript messages sent per request
        #[arg(long)]
        context_window: Option<usize>,
    },
    /// Export a saved session snapshot
    Export {
        /// Path to the session snapshot JSON
        #[arg(long)]
        snapshot: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
    Markdown,
}

/// Get the default snapshot path (~/.local/share/intake/session.json)
fn default_snapshot_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let intake_dir = data_dir.join("intake");
    std::fs::create_dir_all(&intake_dir).ok();
    intake_dir.join("session.json")
}

fn load_config(
    questions: Option<&Path>,
    prompt: Option<&Path>,
    context_window: Option<usize>,
) -> QuestionnaireConfig {
    let mut config = match (questions, prompt) {
        (Some(q), Some(p)) => QuestionnaireConfig::from_files(q, p),
        (Some(q), None) => QuestionnaireConfig::from_files(q, Path::new("prompt.txt")),
        (None, Some(p)) => QuestionnaireConfig::from_files(Path::new("questions.txt"), p),
        (None, None) => QuestionnaireConfig::default(),
    };
    if context_window.is_some() {
        config.context_window = context_window;
    }
    config
}

fn save_snapshot(session: &Session, path: &Path) -> i32 {
    match std::fs::write(path, export_session_data(session)) {
        Ok(()) => {
            println!("Saved session to {}", path.display());
            0
        }
        Err(e) => {
            eprintln!("Error: cannot write '{}': {}", path.display(), e);
            1
        }
    }
}

fn print_progress(session: &Session) {
    let coverage = session.coverage();
    println!(
        "[question {}/{} | sections covered {}/{}]",
        session.question_pointer().min(session.question_count()),
        session.question_count(),
        coverage.covered_count(),
        coverage.total()
    );
}

async fn cmd_chat(
    questions: Option<PathBuf>,
    prompt: Option<PathBuf>,
    resume: Option<PathBuf>,
    save: Option<PathBuf>,
    model: Option<String>,
    context_window: Option<usize>,
) -> i32 {
    let config = load_config(questions.as_deref(), prompt.as_deref(), context_window);

    let oracle = match OpenAiOracle::try_from_env() {
        Ok(o) => match model {
            Some(m) => o.with_model(m),
            None => o,
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let mut session = match &resume {
        Some(path) => {
            let json = match std::fs::read_to_string(path) {
                Ok(j) => j,
                Err(e) => {
                    eprintln!("Error: cannot read '{}': {}", path.display(), e);
                    return 1;
                }
            };
            match import_session_data(&json, &config) {
                Ok(s) => {
                    println!("Resumed session from {}", path.display());
                    s
                }
                Err(e) => {
                    eprintln!("Error: invalid snapshot '{}': {}", path.display(), e);
                    return 1;
                }
            }
        }
        None => Session::new(&config),
    };

    let controller = ConversationController::new(Arc::new(oracle), config);
    let save_path = save.unwrap_or_else(default_snapshot_path);
    let notifier = LogNotifier;

    if let Some(greeting) = session.last_assistant_message() {
        println!("\n{}\n", greeting);
    }
    println!("(type /quit to exit, //save to snapshot, //finalize for the summary)\n");

    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error: stdin: {}", e);
                return 1;
            }
        }
        let input = line.trim();

        match input {
            "/quit" => break,
            "//save" => {
                save_snapshot(&session, &save_path);
                continue;
            }
            "//finalize" => {
                match controller.finalize(&mut session, &notifier) {
                    Ok(summary) => println!("\n{}", summary),
                    Err(FinalizeError::NotReady) => {
                        eprintln!("The summary has not been granted yet; keep answering or ask for a summary.");
                    }
                }
                continue;
            }
            _ => {}
        }

        match controller.handle_turn(&mut session, input).await {
            Ok(outcome) => {
                if let Some(reply) = session.last_assistant_message() {
                    println!("\n{}\n", reply);
                }
                print_progress(&session);
                if let TurnOutcome::Summary { granted: true } = outcome {
                    println!("(run //finalize to print the summary and complete the session)");
                }
            }
            Err(TurnError::EmptyInput) => continue,
            Err(TurnError::Oracle(e)) => {
                eprintln!("Error: {}", e);
            }
        }
    }

    save_snapshot(&session, &save_path)
}

fn cmd_export(snapshot: &Path, format: ExportFormat, out: Option<&Path>) -> i32 {
    let json = match std::fs::read_to_string(snapshot) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", snapshot.display(), e);
            return 1;
        }
    };
    let config = QuestionnaireConfig::default();
    let session = match import_session_data(&json, &config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: invalid snapshot '{}': {}", snapshot.display(), e);
            return 1;
        }
    };

    let rendered = match format {
        ExportFormat::Csv => export::generate_csv(session.answers()),
        ExportFormat::Json => match export::generate_json(session.answers(), &session.respondent) {
            Ok(j) => j,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
        ExportFormat::Markdown => summary::compile(&session, &config),
    };

    match out {
        Some(path) => match std::fs::write(path, rendered) {
            Ok(()) => {
                println!("Wrote {}", path.display());
                0
            }
            Err(e) => {
                eprintln!("Error: cannot write '{}': {}", path.display(), e);
                1
            }
        },
        None => {
            print!("{}", rendered);
            0
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("intake=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Chat {
            questions,
            prompt,
            resume,
            save,
            model,
            context_window,
        } => cmd_chat(questions, prompt, resume, save, model, context_window).await,
        Commands::Export {
            snapshot,
            format,
            out,
        } => cmd_export(&snapshot, format, out.as_deref()),
    };
    std::process::exit(code);
}
