#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::completion::{ChatCompleter, CompletionRequest, ModelCatalog};
use crate::config::OpenAiConfig;
use crate::config::settings::OPENAI_API_KEY_VAR;
use crate::embeddings::Embedder;
use crate::http;

/// Interactive calls (completions, query embeddings, model listing) are never retried
const SINGLE_ATTEMPT: u32 = 1;

/// Blocking client for the OpenAI-style embeddings, chat and models APIs
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    api_key: String,
    embedding_model: String,
    embedding_dimension: usize,
    batch_size: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, serde::Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Failed to parse OpenAI base URL from config")?;

        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("{} environment variable not set", OPENAI_API_KEY_VAR))?;

        Ok(Self {
            base_url,
            api_key,
            embedding_model: config.embedding_model.clone(),
            embedding_dimension: config.embedding_dimension as usize,
            batch_size: config.batch_size.max(1) as usize,
            agent: http::agent(Duration::from_secs(config.timeout_seconds)),
            retry_attempts: config.retry_attempts,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = http::agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {}", path))
    }

    fn post_json(&self, url: &Url, body: &str, attempts: u32) -> Result<String> {
        let authorization = format!("Bearer {}", self.api_key);
        http::with_retry(attempts, url.as_str(), || {
            self.agent
                .post(url.as_str())
                .header("Authorization", &authorization)
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Request to {} failed", url))
    }

    fn embed_single_batch(&self, texts: &[String], attempts: u32) -> Result<Vec<Vec<f32>>> {
        let url = self.endpoint("/v1/embeddings")?;
        let request = EmbeddingsRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .post_json(&url, &request_json, attempts)
            .context("Failed to generate embeddings")?;

        let mut response: EmbeddingsResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        if response.data.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            ));
        }

        response.data.sort_by_key(|d| d.index);

        let vectors: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.embedding_dimension) {
            return Err(anyhow::anyhow!(
                "Embedding has {} dimensions, expected {}",
                bad.len(),
                self.embedding_dimension
            ));
        }

        Ok(vectors)
    }
}

impl Embedder for OpenAiClient {
    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let batch = self
                .embed_single_batch(chunk, self.retry_attempts)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;
            results.extend(batch);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    #[inline]
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_single_batch(&[text.to_string()], SINGLE_ATTEMPT)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedding response was empty"))
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.embedding_dimension
    }
}

impl ChatCompleter for OpenAiClient {
    #[inline]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = self.endpoint("/v1/chat/completions")?;
        let request_json =
            serde_json::to_string(request).context("Failed to serialize chat request")?;

        debug!(
            "Requesting completion from {} with {} messages",
            request.model,
            request.messages.len()
        );

        let response_text = self
            .post_json(&url, &request_json, SINGLE_ATTEMPT)
            .context("Failed to generate completion")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat response contained no message content"))?;

        info!(
            "Received completion of {} characters from {}",
            content.len(),
            request.model
        );
        Ok(content)
    }
}

impl ModelCatalog for OpenAiClient {
    #[inline]
    fn list_models(&self) -> Result<Vec<String>> {
        let url = self.endpoint("/v1/models")?;
        let authorization = format!("Bearer {}", self.api_key);

        debug!("Fetching available models from {}", url);

        let response_text = http::with_retry(SINGLE_ATTEMPT, url.as_str(), || {
            self.agent
                .get(url.as_str())
                .header("Authorization", &authorization)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Failed to fetch models")?;

        let response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", response.data.len());
        Ok(response.data.into_iter().map(|m| m.id).collect())
    }
}
