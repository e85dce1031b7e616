// App description generator
// Turns a short pitch for a mobile app into App Store listing copy


use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::completion::{ChatCompleter, CompletionRequest, ModelCatalog};
use crate::config::AppDescriptionConfig;
use crate::conversation::PromptMessage;
use crate::{Result, SupportError};

const SYSTEM_INSTRUCTIONS: [&str; 4] = [
    "You are an assistant that will help me submit my new app idea to the App Store. \
     I need specific information about my app to submit it. Here are some notes to keep track of",
    "The title should be quirky and fun. The description should be a 3 paragraph summary of the \
     purpose_statement and features, written in a fun, exciting, and descriptive way.",
    "Output should be in JSON. It should be a single object with the following keys: \
     choices: [{ name, description }] (2 choices), category, and keywords[] (10). \
     The name should be a string, the description should be a string, the category should be \
     a string, and the keywords should be an array of strings.",
    "The description should be several paragraphs containing an overview, features, and benefits.",
];

/// Body of a listing request. Missing strings are treated as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppDescriptionRequest {
    pub selected_model: Option<String>,
    pub category: String,
    pub purpose_statement: String,
    pub features: String,
    pub working_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingChoice {
    pub name: Option<String>,
    pub description: String,
}

/// Listing copy returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppListing {
    pub choices: Vec<ListingChoice>,
    pub category: String,
    pub keywords: Vec<String>,
}

/// Pick the model for a request: the caller's choice, else the first
/// `gpt-` model the backend lists, else `fallback`.
#[inline]
pub fn choose_model(selected: Option<&str>, available: &[String], fallback: &str) -> String {
    if let Some(model) = selected.map(str::trim).filter(|m| !m.is_empty()) {
        return model.to_string();
    }

    available
        .iter()
        .find(|id| id.starts_with("gpt-"))
        .map_or_else(|| fallback.to_string(), Clone::clone)
}

/// Messages sent for one listing request
#[inline]
pub fn build_conversation(request: &AppDescriptionRequest) -> Vec<PromptMessage> {
    let mut messages: Vec<PromptMessage> = SYSTEM_INSTRUCTIONS
        .iter()
        .map(|instruction| PromptMessage::system(*instruction))
        .collect();

    messages.push(PromptMessage::user(format!(
        "I want to create a mobile app that falls under the category of {}. The main purpose of this app is: {}.",
        request.category, request.purpose_statement
    )));
    messages.push(PromptMessage::user(format!(
        "The features of the app include: {}.",
        request.features
    )));

    messages
}

/// Cut `text` at the earliest occurrence of any marker.
#[inline]
pub fn strip_boilerplate<'a, S: AsRef<str>>(text: &'a str, markers: &[S]) -> &'a str {
    let cut = markers
        .iter()
        .map(AsRef::as_ref)
        .filter(|marker| !marker.is_empty())
        .filter_map(|marker| text.find(marker))
        .min();

    match cut {
        Some(end) => text.get(..end).unwrap_or(text),
        None => text,
    }
}

/// Comma-separated features as keywords; nothing in, nothing out
#[inline]
pub fn split_keywords(features: &str) -> Vec<String> {
    if features.is_empty() {
        return Vec::new();
    }
    features.split(", ").map(str::to_string).collect()
}

/// Generates App Store listings with a single completion call
pub struct AppDescriptionGenerator {
    completer: Arc<dyn ChatCompleter>,
    catalog: Arc<dyn ModelCatalog>,
    default_model: String,
    settings: AppDescriptionConfig,
}

impl AppDescriptionGenerator {
    #[inline]
    pub fn new(
        completer: Arc<dyn ChatCompleter>,
        catalog: Arc<dyn ModelCatalog>,
        default_model: impl Into<String>,
        settings: AppDescriptionConfig,
    ) -> Self {
        Self {
            completer,
            catalog,
            default_model: default_model.into(),
            settings,
        }
    }

    fn resolve_model(&self, selected: Option<&str>) -> String {
        if selected.is_some_and(|m| !m.trim().is_empty()) {
            return choose_model(selected, &[], &self.default_model);
        }

        let available = match self.catalog.list_models() {
            Ok(models) => models,
            Err(e) => {
                warn!("Could not list models, using {}: {:#}", self.default_model, e);
                Vec::new()
            }
        };
        choose_model(None, &available, &self.default_model)
    }

    #[inline]
    pub fn generate(&self, request: &AppDescriptionRequest) -> Result<AppListing> {
        let model = self.resolve_model(request.selected_model.as_deref());
        info!("Generating app description with {}", model);

        let completion = CompletionRequest::new(
            model,
            build_conversation(request),
            self.settings.temperature,
        );
        let text = self
            .completer
            .complete(&completion)
            .map_err(|e| SupportError::Completion(format!("{:#}", e)))?;

        let description = strip_boilerplate(&text, &self.settings.output_markers);
        debug!(
            "Kept {} of {} characters of the completion",
            description.len(),
            text.len()
        );

        Ok(AppListing {
            choices: vec![ListingChoice {
                name: request.working_name.clone(),
                description: description.to_string(),
            }],
            category: request.category.clone(),
            keywords: split_keywords(&request.features),
        })
    }
}
