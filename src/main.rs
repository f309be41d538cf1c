mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use cortex::app::App;
use cortex::config::CortexConfig;

#[derive(Parser)]
#[command(name = "cortex", version, about = "Personal chief-of-staff agent with long-term memory")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the agent (interactive unless a message is given)
    Chat {
        /// User the conversation belongs to
        #[arg(long, default_value = "default")]
        user: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
        /// Send a single message and exit
        message: Option<String>,
    },
    /// Show the facts `search_memory` would return for a query
    Recall {
        #[arg(long, default_value = "default")]
        user: String,
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the memory context block for a user
    Context {
        #[arg(long, default_value = "default")]
        user: String,
        #[arg(long)]
        min_importance: Option<f64>,
        /// Only standing preferences, constraints, and habits
        #[arg(long)]
        constraints: bool,
    },
    /// Delete a user's stored facts
    Forget {
        #[arg(long, default_value = "default")]
        user: String,
        /// Comma-separated categories to keep, e.g. `preference,personal`
        #[arg(long, default_value = "")]
        keep: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Recompute every embedding with the configured provider
    ReEmbed,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging starts before config so loading can report problems
    let initial = std::env::var("CORTEX_LOG_LEVEL").unwrap_or_else(|_| "info".into());
    let (filter, log_level) = reload::Layer::new(log_filter(&initial));
    // Log to stderr so stdout carries only replies
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CortexConfig::load()?;
    apply_log_level(&log_level, &config.logging.log_level)?;

    let app = App::open(config)?;

    match cli.command {
        Command::Chat {
            user,
            conversation,
            message,
        } => cli::chat::chat(&app, &user, conversation, message).await?,
        Command::Recall { user, query, limit } => {
            cli::recall::recall(&app, &user, &query, limit).await?
        }
        Command::Context {
            user,
            min_importance,
            constraints,
        } => cli::context::context(&app, &user, min_importance, constraints).await?,
        Command::Forget { user, keep, yes } => {
            let keep = cli::parse_categories(&keep)?;
            cli::forget::forget(&app, &user, &keep, yes).await?
        }
        Command::ReEmbed => cli::re_embed::re_embed(&app).await?,
    }

    Ok(())
}

fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn apply_log_level(handle: &reload::Handle<EnvFilter, Registry>, level: &str) -> Result<()> {
    handle.reload(log_filter(level))?;
    Ok(())
}
