use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::ai::follow_up::{FollowUpComposer, FollowUpEngine, FollowUpExchange};
use crate::ai::llm::{available_models, DEFAULT_REASONING_MODEL, DEFAULT_USER_PROMPT};
use crate::ai::openrouter::CompletionClient;
use crate::ai::pipeline::{ExplainPipeline, PipelineRequest, RunState, ViewScope};
use crate::ai::ExplanationMode;
use crate::capture;
use crate::config::{app_data_dir, AppConfig};
use crate::session::{CredentialStore, SessionContext};

const SETTINGS_DB: &str = "settings.db";
const RETRY_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(
    name = "visual-explain",
    version,
    about = "Explain diagrams, charts and notes for students"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Explain an image, then answer follow-up questions about it.
    Explain(ExplainArgs),
    /// Manage the stored API key and default model.
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// List the selectable reasoning models and explanation modes.
    Models,
}

#[derive(Debug, clap::Args)]
pub struct ExplainArgs {
    /// Image file to explain.
    pub image: PathBuf,
    #[arg(long)]
    pub subject: Option<String>,
    #[arg(long)]
    pub prompt: Option<String>,
    /// Beginner, Exam-Oriented, Conceptual or Quick Revision. See `models`.
    #[arg(long, default_value = "beginner")]
    pub mode: ExplanationMode,
    /// Reasoning model; defaults to the saved default model.
    #[arg(long)]
    pub model: Option<String>,
    /// Follow-up question, asked in order after the explanation. Repeatable.
    #[arg(long = "ask")]
    pub ask: Vec<String>,
    /// Keep reading follow-up questions from stdin until EOF or `quit`.
    #[arg(long)]
    pub interactive: bool,
    /// Print the export snapshot as JSON at the end.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    Reset,
}

pub async fn execute(cli: Cli) -> Result<()> {
    let data_dir = app_data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let config = AppConfig::load(&data_dir);
    let credentials = Arc::new(
        CredentialStore::open(&data_dir.join(SETTINGS_DB)).context("Failed to open settings")?,
    );

    match cli.command {
        Command::Explain(args) => explain(&config, credentials, args).await,
        Command::Settings(cmd) => settings(&credentials, cmd),
        Command::Models => {
            println!("Reasoning models:");
            for model in available_models() {
                println!("  {:<36} {} - {}", model.id, model.label, model.description);
            }
            println!("\nExplanation modes:");
            for mode in ExplanationMode::ALL {
                println!("  {:<12} {} - {}", mode.as_str(), mode.label(), mode.description());
            }
            Ok(())
        }
    }
}

fn settings(credentials: &CredentialStore, cmd: SettingsCommand) -> Result<()> {
    match cmd {
        SettingsCommand::Show => {
            let current = credentials.load()?;
            let key = match current.api_key.as_deref() {
                Some(key) if key.chars().count() > 8 => {
                    format!("{}...", key.chars().take(8).collect::<String>())
                }
                Some(_) => "set".to_string(),
                None => "not set".to_string(),
            };
            println!("API key:       {}", key);
            println!(
                "Default model: {}",
                current
                    .default_model
                    .as_deref()
                    .unwrap_or(DEFAULT_REASONING_MODEL)
            );
        }
        SettingsCommand::Set { api_key, model } => {
            if api_key.is_none() && model.is_none() {
                bail!("nothing to save: pass --api-key and/or --model");
            }
            credentials.save(api_key.as_deref(), model.as_deref())?;
            println!("Settings saved.");
        }
        SettingsCommand::Reset => {
            credentials.reset()?;
            println!("Settings reset.");
        }
    }
    Ok(())
}

async fn explain(config: &AppConfig, credentials: Arc<CredentialStore>, args: ExplainArgs) -> Result<()> {
    let image = capture::load_data_uri(&args.image)?;
    let reasoning_model = match args.model {
        Some(model) => model,
        None => credentials
            .default_model()?
            .unwrap_or_else(|| DEFAULT_REASONING_MODEL.to_string()),
    };
    let request = PipelineRequest {
        image,
        subject: args.subject.filter(|s| !s.trim().is_empty()),
        user_prompt: Some(
            args.prompt
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_PROMPT.to_string()),
        ),
        explanation_mode: args.mode,
        reasoning_model,
    };

    let client = CompletionClient::new(config);
    let session = SessionContext::new();
    let scope = ViewScope::new();
    log::info!(
        "Session {} started at {} against {}",
        session.id(),
        session.started_at().to_rfc3339(),
        client.api_url()
    );

    let pipeline = ExplainPipeline::new(client.clone(), credentials.clone(), session.clone());
    eprintln!("Understanding image...");
    let run = pipeline.run(&request, &scope).await;
    if run.state != RunState::Done {
        if run.model_unavailable.is_some() {
            eprintln!("Run `visual-explain settings show` to review your configuration.");
        }
        session.clear();
        bail!(run
            .error_message
            .unwrap_or_else(|| "Explanation did not complete".to_string()));
    }
    println!("{}", run.explanation_text.unwrap_or_default());

    let mut composer = FollowUpComposer::new(
        FollowUpEngine::new(client),
        credentials,
        session.clone(),
        scope.clone(),
    );
    for question in args.ask {
        ask(&mut composer, question).await;
    }

    if args.interactive {
        eprintln!("Ask a follow-up question (empty line skips, `quit` or EOF ends):");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().eq_ignore_ascii_case("quit") {
                break;
            }
            ask(&mut composer, line).await;
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&session.export_snapshot())?);
    }

    scope.close();
    session.clear();
    Ok(())
}

async fn ask(composer: &mut FollowUpComposer, question: String) {
    composer.set_question(question);
    let retry = composer.engine().retry_indicator();
    let submit = composer.submit();
    tokio::pin!(submit);
    let mut poll = tokio::time::interval(RETRY_POLL);
    let mut announced = false;
    let result = loop {
        tokio::select! {
            result = &mut submit => break result,
            _ = poll.tick() => {
                if retry.is_retrying() && !announced {
                    eprintln!("Retrying...");
                    announced = true;
                }
            }
        }
    };

    match result {
        Ok(Some(FollowUpExchange {
            answer: Some(answer),
            ..
        })) => println!("\nFollow-up answer:\n{}", answer),
        Ok(Some(FollowUpExchange {
            error: Some(message),
            ..
        })) => eprintln!("\nFollow-up error: {}", message),
        Ok(_) => {}
        Err(e) => eprintln!("\n{}", e),
    }
}
