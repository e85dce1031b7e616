use clap::{Parser, Subcommand};
use std::path::PathBuf;
use support_rag::Result;
use support_rag::app_description::AppDescriptionRequest;
use support_rag::commands::{build_index, describe, run_chat, serve};
use support_rag::config::{
    Config, load_dotenv, resolve_config_dir, run_interactive_config, show_config,
};

#[derive(Parser)]
#[command(name = "support-rag")]
#[command(about = "Support chatbot over issue-tracker tickets, plus an App Store listing generator")]
#[command(version)]
struct Cli {
    /// Use this directory instead of the platform config directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the OpenAI and vector index connections
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build the ticket index from the configured source file
    Index {
        /// Delete an existing index and rebuild it from the source file
        #[arg(long)]
        force_recreate: bool,
    },
    /// Chat with the support assistant in the terminal
    Chat,
    /// Serve the web chat page and JSON API
    Serve,
    /// Generate App Store listing copy for an app idea
    Describe {
        /// App Store category, e.g. "Health & Fitness"
        #[arg(long)]
        category: String,
        /// What the app is for
        #[arg(long)]
        purpose: String,
        /// Comma-separated feature list
        #[arg(long, default_value = "")]
        features: String,
        /// Working name to attach to the generated listing
        #[arg(long)]
        name: Option<String>,
        /// Model to use instead of the first available gpt- model
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir.as_deref())
        .map_err(|e| support_rag::SupportError::Config(e.to_string()))?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Index { force_recreate } => {
            build_index(&Config::load(&config_dir)?, force_recreate)?;
        }
        Commands::Chat => {
            run_chat(&Config::load(&config_dir)?)?;
        }
        Commands::Serve => {
            serve(&Config::load(&config_dir)?).await?;
        }
        Commands::Describe {
            category,
            purpose,
            features,
            name,
            model,
        } => {
            let request = AppDescriptionRequest {
                selected_model: model,
                category,
                purpose_statement: purpose,
                features,
                working_name: name,
            };
            describe(&Config::load(&config_dir)?, &request)?;
        }
    }

    Ok(())
}
