//! memlink - capture chat conversations and sync them to a memory server
//!
//! This tool provides commands for:
//! - Logging in and out of the memory server
//! - Listing and creating projects
//! - Saving a conversation page snapshot into a project
//! - Querying a project's memory
//!
//! Uses XDG Base Directory specification for file locations:
//! - Session: $XDG_DATA_HOME/memlink/session.json (~/.local/share/memlink/session.json)
//! - Logs: $XDG_STATE_HOME/memlink/memlink.log.YYYY-MM-DD (~/.local/state/memlink/)
//! - Config: $XDG_CONFIG_HOME/memlink/config.toml (~/.config/memlink/config.toml)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use memlink_core::extract::HtmlFile;
use memlink_core::relay::{ContentService, Relay, TabRegistry};
use memlink_core::{Config, Controller, ControllerState, Session, SyncClient};

/// Characters of each memory block shown by `query`
const PREVIEW_CHARS: usize = 400;

#[derive(Parser)]
#[command(name = "memlink")]
#[command(about = "Capture chat conversations and sync them to a memory server")]
#[command(version)]
struct Args {
    /// Write debug logs to the state directory
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show backend and session status
    Status,

    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Create an account and log in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Forget the stored session
    Logout,

    /// List projects
    Projects,

    /// Create a project
    CreateProject {
        /// Project name
        name: String,
    },

    /// List conversations saved in a project
    Conversations {
        #[arg(short, long)]
        project: i64,
    },

    /// Extract the conversation from a saved chat page and store it
    Save {
        #[arg(short, long)]
        project: i64,

        /// HTML snapshot of the conversation page
        #[arg(long)]
        page: PathBuf,
    },

    /// Ask a project's memory for relevant context
    Query {
        #[arg(short, long)]
        project: i64,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,

        /// What to look for
        text: String,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<memlink_core::Error>() {
                Some(error) => eprintln!("Error: {}", error.user_message()),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = if args.verbose {
        Some(memlink_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    tracing::info!(base_url = %config.backend.base_url, "memlink starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(execute(args.command, config))
}

async fn execute(command: Command, config: Config) -> Result<()> {
    let session = Session::file(config.session.token_path());
    let client = SyncClient::new(&config.backend, session.clone())?;
    let base_url = client.base_url().to_string();

    let tabs = Arc::new(TabRegistry::new());
    if let Command::Save { page, .. } = &command {
        let (content, _handle) = ContentService::new(Arc::new(HtmlFile::new(page))).spawn();
        tabs.open_tab(format!("file://{}", page.display()), Some(content));
    }
    let (relay, _relay_handle) = Relay::new(tabs).spawn();

    let mut controller =
        Controller::new(session, client, relay).with_capture_config(&config.capture);
    let state = controller.startup().await;

    match command {
        Command::Status => {
            println!("Backend: {base_url}");
            println!("Session: {state}");
            if state == ControllerState::LoggedIn {
                println!("Projects: {}", controller.projects().len());
            }
        }

        Command::Login { email, password } => {
            controller.login(&email, &password).await?;
            println!("Logged in as {}", email.trim());
        }

        Command::Register { email, password } => {
            controller.register(&email, &password).await?;
            println!("Registered and logged in as {}", email.trim());
        }

        Command::Logout => {
            controller.logout();
            println!("Logged out");
        }

        Command::Projects => {
            let projects = controller.load_projects().await?;
            if projects.is_empty() {
                println!("No projects yet. Create one with `memlink create-project <name>`.");
            }
            for project in projects {
                println!("{:>6}  {}", project.id, project.name);
            }
        }

        Command::CreateProject { name } => {
            let project = controller.create_project(&name).await?;
            println!("Created project {}: {}", project.id, project.name);
        }

        Command::Conversations { project } => {
            controller.select_project(project)?;
            let conversations = controller.list_conversations().await?;
            println!("{} conversation(s) in project {project}", conversations.len());
            for conversation in conversations {
                let created = conversation
                    .created_at_utc()
                    .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or(conversation.created_at);
                let first_line = conversation
                    .raw_content
                    .lines()
                    .find(|l| !l.trim().is_empty() && !l.ends_with(':'))
                    .unwrap_or("");
                println!("{:>6}  {}  {}", conversation.id, created, first_line);
            }
        }

        Command::Save { project, .. } => {
            controller.select_project(project)?;
            let record = controller.capture_and_save().await?;
            println!("Saved conversation {} to project {project}", record.id);
        }

        Command::Query {
            project,
            json,
            text,
        } => {
            controller.select_project(project)?;
            let result = controller.query_memory(&text).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            println!(
                "Scanned {} conversation(s), {} relevant block(s)",
                result.total_scanned,
                result.context_blocks.len()
            );
            for block in &result.context_blocks {
                println!();
                match block.conversation_id {
                    Some(id) => println!("[score {:.2}] conversation {id}", block.score),
                    None => println!("[score {:.2}]", block.score),
                }
                if let Some(summary) = &block.summary {
                    println!("{summary}");
                }
                println!("{}", block.preview(PREVIEW_CHARS));
            }
        }
    }

    Ok(())
}
