
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::path::{Path, PathBuf};

use super::{Config, ConfigError, OpenAiConfig, VectorIndexConfig};
use crate::completion::ModelCatalog;
use crate::openai::OpenAiClient;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Support RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("OpenAI Configuration").bold().yellow());
    eprintln!("Models used for ticket embeddings and chat completions.");
    eprintln!();
    configure_openai(&mut config.openai)?;

    eprintln!();
    eprintln!("{}", style("Vector Index Configuration").bold().yellow());
    configure_vector_index(&mut config.vector_index)?;

    eprintln!();
    eprintln!("{}", style("Chat Configuration").bold().yellow());
    configure_chat(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_openai_connection(&config.openai) {
        eprintln!("{}", style("✓ OpenAI connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not list OpenAI models").yellow()
        );
        eprintln!(
            "Make sure {} is set before indexing or chatting.",
            super::settings::OPENAI_API_KEY_VAR
        );
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("OpenAI Settings:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.openai.base_url).cyan());
    eprintln!("  Chat Model: {}", style(&config.openai.chat_model).cyan());
    eprintln!(
        "  Embedding Model: {} ({} dimensions)",
        style(&config.openai.embedding_model).cyan(),
        style(config.openai.embedding_dimension).cyan()
    );
    eprintln!("  Temperature: {}", style(config.openai.temperature).cyan());
    eprintln!("  API Key: {}", key_status(config.openai.api_key.as_deref()));

    eprintln!();
    eprintln!("{}", style("Vector Index Settings:").bold().yellow());
    eprintln!(
        "  Controller URL: {}",
        style(&config.vector_index.controller_url).cyan()
    );
    eprintln!(
        "  Index Name: {}",
        style(&config.vector_index.index_name).cyan()
    );
    eprintln!(
        "  Serverless: {}/{}",
        style(&config.vector_index.cloud).cyan(),
        style(&config.vector_index.region).cyan()
    );
    eprintln!(
        "  API Key: {}",
        key_status(config.vector_index.api_key.as_deref())
    );

    eprintln!();
    eprintln!("{}", style("Chat Settings:").bold().yellow());
    eprintln!("  Product: {}", style(&config.chat.product_name).cyan());
    eprintln!("  Top K: {}", style(config.chat.top_k).cyan());
    eprintln!(
        "  History Window: {}",
        style(window_label(config.chat.history_window)).cyan()
    );
    eprintln!(
        "  Source File: {}",
        style(config.source_path().display()).cyan()
    );
    eprintln!("  Web Bind: {}", style(&config.server.bind).cyan());
    eprintln!("  Max Chat Sessions: {}", style(config.server.max_sessions).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn key_status(key: Option<&str>) -> String {
    match key {
        Some(_) => style("set").green().to_string(),
        None => style("not set").red().to_string(),
    }
}

fn window_label(window: usize) -> String {
    if window == 0 {
        "unbounded".to_string()
    } else {
        format!("{} exchanges", window)
    }
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    if config_dir.join("config.toml").exists() {
        let config = Config::load(config_dir)?;
        eprintln!("{}", style("Found existing configuration.").green());
        Ok(config)
    } else {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
        let mut config = Config {
            base_dir: config_dir.to_path_buf(),
            ..Config::default()
        };
        config.apply_env();
        Ok(config)
    }
}

fn configure_openai(openai: &mut OpenAiConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(openai.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = OpenAiConfig {
                base_url: input.clone(),
                ..OpenAiConfig::default()
            };
            candidate.base_url()?;
            Ok(())
        })
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(openai.chat_model.clone())
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(openai.embedding_model.clone())
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(openai.embedding_dimension)
        .interact_text()?;

    let temperature: f32 = Input::new()
        .with_prompt("Chat temperature")
        .default(openai.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=2.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0 and 2")
            }
        })
        .interact_text()?;

    openai.base_url = base_url;
    openai.set_chat_model(chat_model)?;
    openai.set_embedding_model(embedding_model)?;
    openai.set_embedding_dimension(embedding_dimension)?;
    openai.set_temperature(temperature)?;

    Ok(())
}

fn configure_vector_index(index: &mut VectorIndexConfig) -> Result<()> {
    let index_name: String = Input::new()
        .with_prompt("Index name")
        .default(index.index_name.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            super::settings::validate_index_name(input)
        })
        .interact_text()?;

    let cloud: String = Input::new()
        .with_prompt("Serverless cloud")
        .default(index.cloud.clone())
        .interact_text()?;

    let region: String = Input::new()
        .with_prompt("Serverless region")
        .default(index.region.clone())
        .interact_text()?;

    index.set_index_name(index_name)?;
    index.cloud = cloud;
    index.region = region;

    Ok(())
}

fn configure_chat(config: &mut Config) -> Result<()> {
    let product_name: String = Input::new()
        .with_prompt("Product name used in the assistant instructions")
        .default(config.chat.product_name.clone())
        .interact_text()?;

    let source_path: String = Input::new()
        .with_prompt("Ticket CSV file")
        .default(config.data.source_path.display().to_string())
        .interact_text()?;

    let history_window: usize = Input::new()
        .with_prompt("Exchanges remembered per session (0 = unbounded)")
        .default(config.chat.history_window)
        .interact_text()?;

    config.chat.product_name = product_name;
    config.data.source_path = PathBuf::from(source_path);
    config.chat.history_window = history_window;

    Ok(())
}

fn test_openai_connection(openai: &OpenAiConfig) -> bool {
    if openai.api_key.is_none() {
        return false;
    }

    OpenAiClient::new(openai)
        .and_then(|client| client.list_models())
        .is_ok()
}
