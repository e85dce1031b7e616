use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::app_description::{AppDescriptionGenerator, AppDescriptionRequest, AppListing};
use crate::chat::{ChatEngine, ChatSettings};
use crate::completion::{ChatCompleter, ModelCatalog};
use crate::config::Config;
use crate::conversation::SessionMemory;
use crate::embeddings::Embedder;
use crate::indexer::{EnsureOutcome, IndexManager, RebuildMode};
use crate::openai::OpenAiClient;
use crate::records::CsvRecordSource;
use crate::retrieval::Retriever;
use crate::server::{self, AppState};
use crate::vector_index::{PineconeClient, VectorIndexService};

/// Live clients for the two external services
#[derive(Clone)]
pub struct Services {
    pub openai: Arc<OpenAiClient>,
    pub index: Arc<dyn VectorIndexService>,
}

impl Services {
    /// Connect to the services named in `config`.
    #[inline]
    pub fn connect(config: &Config) -> Result<Self> {
        let openai = OpenAiClient::new(&config.openai).context("Failed to set up OpenAI client")?;
        let index =
            PineconeClient::new(&config.vector_index).context("Failed to set up index client")?;

        Ok(Self {
            openai: Arc::new(openai),
            index: Arc::new(index),
        })
    }

    fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.openai) as Arc<dyn Embedder>
    }

    fn completer(&self) -> Arc<dyn ChatCompleter> {
        Arc::clone(&self.openai) as Arc<dyn ChatCompleter>
    }
}

/// Create the ticket index if needed, or rebuild it when `force_recreate` is set.
#[inline]
pub fn ensure_index(
    config: &Config,
    services: &Services,
    force_recreate: bool,
) -> Result<EnsureOutcome> {
    let source = CsvRecordSource::new(config.source_path());
    let manager = IndexManager::new(Arc::clone(&services.index), services.embedder())
        .with_policy(config.data.malformed_records)
        .with_batch_size(config.openai.batch_size as usize)
        .with_progress(console::user_attended_stderr());

    let outcome = manager.ensure_index(
        &config.vector_index.index_name,
        &source,
        RebuildMode::from(force_recreate),
    )?;
    Ok(outcome)
}

/// Chat engine attached to the configured index, building it first if absent
#[inline]
pub fn chat_engine(config: &Config, services: &Services) -> Result<ChatEngine> {
    let handle = ensure_index(config, services, false)?.into_handle();
    info!("Using index {} at {}", handle.name, handle.locator);

    Ok(ChatEngine {
        retriever: Retriever::new(Arc::clone(&services.index), services.embedder()),
        completer: services.completer(),
        handle,
        template: config.prompt_template(),
        settings: ChatSettings {
            model: config.openai.chat_model.clone(),
            temperature: config.openai.temperature,
            top_k: config.chat.top_k,
        },
    })
}

#[inline]
pub fn app_description_generator(
    config: &Config,
    openai: &Arc<OpenAiClient>,
) -> AppDescriptionGenerator {
    AppDescriptionGenerator::new(
        Arc::clone(openai) as Arc<dyn ChatCompleter>,
        Arc::clone(openai) as Arc<dyn ModelCatalog>,
        config.openai.chat_model.as_str(),
        config.app_description.clone(),
    )
}

/// `index` subcommand
#[inline]
pub fn build_index(config: &Config, force_recreate: bool) -> Result<()> {
    let services = Services::connect(config)?;

    match ensure_index(config, &services, force_recreate)? {
        EnsureOutcome::Attached(handle) => {
            println!(
                "{} Index {} already exists, nothing to do",
                style("✓").green(),
                style(&handle.name).cyan()
            );
            println!("  Use --force-recreate to rebuild it from the source file.");
        }
        EnsureOutcome::Built(handle, stats) => {
            println!(
                "{} Built index {}",
                style("✓").green(),
                style(&handle.name).cyan()
            );
            println!("  Records read:     {}", stats.records_read);
            println!("  Records skipped:  {}", stats.records_skipped);
            println!("  Entries inserted: {}", stats.entries_inserted);
        }
    }

    Ok(())
}

fn thinking_spinner() -> ProgressBar {
    if !console::user_attended() {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// `chat` subcommand: terminal conversation against the configured index
#[inline]
pub fn run_chat(config: &Config) -> Result<()> {
    let services = Services::connect(config)?;
    let engine = chat_engine(config, &services)?;
    let mut session = engine.session(SessionMemory::from_window_setting(config.chat.history_window));

    println!(
        "{}",
        style(format!("{} support chat", config.chat.product_name)).bold()
    );
    println!("Type /reset to start over, /quit to leave.");
    println!();

    loop {
        let message: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;

        match message.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                println!("{}", style("Conversation cleared.").dim());
                continue;
            }
            _ => {}
        }

        let spinner = thinking_spinner();
        let result = session.predict(&message);
        spinner.finish_and_clear();

        match result {
            Ok(reply) => println!("{} {}\n", style("Assistant:").green().bold(), reply),
            Err(e) => {
                warn!("Turn failed: {}", e);
                println!("{} {}\n", style("Error:").red().bold(), e);
            }
        }
    }

    Ok(())
}

/// `serve` subcommand
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let bind = config.bind_address()?;
    let services = Services::connect(config)?;

    let setup_config = config.clone();
    let setup_services = services.clone();
    let engine =
        tokio::task::spawn_blocking(move || chat_engine(&setup_config, &setup_services)).await??;

    let generator = Arc::new(app_description_generator(config, &services.openai));
    let state = Arc::new(
        AppState::new(engine, config.chat.history_window, generator)
            .with_max_sessions(config.server.max_sessions),
    );

    println!(
        "{} Serving support chat on {}",
        style("✓").green(),
        style(format!("http://{}", bind)).cyan()
    );
    server::serve(state, bind).await
}

/// `describe` subcommand: generate one listing and print it as JSON
#[inline]
pub fn describe(config: &Config, request: &AppDescriptionRequest) -> Result<AppListing> {
    let openai =
        Arc::new(OpenAiClient::new(&config.openai).context("Failed to set up OpenAI client")?);
    let generator = app_description_generator(config, &openai);

    let listing = generator.generate(request)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&listing).context("Failed to render listing")?
    );
    Ok(listing)
}
