
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    CreateOutcome, IndexEntry, IndexHandle, IndexServiceError, IndexSpec, Metric, ScoredMatch,
    ServiceResult, VectorIndexService,
};
use crate::config::VectorIndexConfig;
use crate::config::settings::PINECONE_API_KEY_VAR;
use crate::http::{self, HttpError};
use crate::records::Sentence;

const API_VERSION: &str = "2024-07";
const UPSERT_BATCH_SIZE: usize = 100;
const DEFAULT_READY_TIMEOUT_SECONDS: u64 = 120;
const DEFAULT_READY_POLL_MILLIS: u64 = 1000;

/// Blocking client for a Pinecone-style serverless vector index service
#[derive(Debug, Clone)]
pub struct PineconeClient {
    controller_url: Url,
    api_key: String,
    cloud: String,
    region: String,
    agent: ureq::Agent,
    ready_timeout: Duration,
    ready_poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexModel>,
}

#[derive(Debug, Deserialize)]
struct IndexModel {
    name: String,
    dimension: usize,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: Metric,
    spec: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    serverless: CloudRegion<'a>,
}

#[derive(Debug, Serialize)]
struct CloudRegion<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<VectorPayload<'a>>,
}

#[derive(Debug, Serialize)]
struct VectorPayload<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: TextMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct TextMetadata<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    metadata: Option<serde_json::Value>,
}

impl IndexModel {
    fn into_handle(self) -> IndexHandle {
        IndexHandle {
            name: self.name,
            dimension: self.dimension,
            locator: self.host,
        }
    }
}

fn map_http_error(error: HttpError, name: &str) -> IndexServiceError {
    match error {
        HttpError::Status { status: 404 } => IndexServiceError::NotFound(name.to_string()),
        HttpError::Status { status } if status < 500 && status != 429 => {
            IndexServiceError::Rejected(format!("{} (HTTP {})", name, status))
        }
        other => IndexServiceError::Unavailable(format!("{}: {}", name, other)),
    }
}

fn parse<T: for<'de> Deserialize<'de>>(body: &str, what: &str) -> ServiceResult<T> {
    serde_json::from_str(body)
        .with_context(|| format!("Failed to parse {} response", what))
        .map_err(|e| IndexServiceError::Unavailable(format!("{:#}", e)))
}

impl PineconeClient {
    #[inline]
    pub fn new(config: &VectorIndexConfig) -> anyhow::Result<Self> {
        let controller_url = config
            .controller_url()
            .context("Failed to parse vector index controller URL from config")?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            anyhow::anyhow!("{} environment variable not set", PINECONE_API_KEY_VAR)
        })?;

        Ok(Self {
            controller_url,
            api_key,
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            agent: http::agent(Duration::from_secs(config.timeout_seconds)),
            ready_timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECONDS),
            ready_poll_interval: Duration::from_millis(DEFAULT_READY_POLL_MILLIS),
        })
    }

    /// How long to wait for a new index to report ready, and how often to ask
    #[inline]
    pub fn with_ready_wait(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.ready_timeout = timeout;
        self.ready_poll_interval = poll_interval;
        self
    }

    fn controller_endpoint(&self, path: &str) -> ServiceResult<Url> {
        self.controller_url
            .join(path)
            .map_err(|e| IndexServiceError::Rejected(format!("Invalid URL for {}: {}", path, e)))
    }

    /// Data-plane URL for an index host, which the service reports without a scheme
    fn data_endpoint(handle: &IndexHandle, path: &str) -> ServiceResult<Url> {
        if handle.locator.is_empty() {
            return Err(IndexServiceError::NotFound(handle.name.clone()));
        }

        let base = if handle.locator.contains("://") {
            handle.locator.clone()
        } else {
            format!("https://{}", handle.locator)
        };

        Url::parse(&base)
            .and_then(|url| url.join(path))
            .map_err(|e| {
                IndexServiceError::Rejected(format!("Invalid host {}: {}", handle.locator, e))
            })
    }

    fn get(&self, url: &Url) -> Result<String, HttpError> {
        http::with_retry(1, url.as_str(), || {
            self.agent
                .get(url.as_str())
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn post(&self, url: &Url, body: &str) -> Result<String, HttpError> {
        http::with_retry(1, url.as_str(), || {
            self.agent
                .post(url.as_str())
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn delete(&self, url: &Url) -> Result<String, HttpError> {
        http::with_retry(1, url.as_str(), || {
            self.agent
                .delete(url.as_str())
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn describe(&self, name: &str) -> ServiceResult<IndexModel> {
        let url = self.controller_endpoint(&format!("/indexes/{}", name))?;
        let body = self.get(&url).map_err(|e| map_http_error(e, name))?;
        parse(&body, "describe index")
    }

    fn wait_until_ready(&self, name: &str) -> ServiceResult<IndexHandle> {
        let started = Instant::now();

        loop {
            let model = self.describe(name)?;
            if model.status.ready && !model.host.is_empty() {
                debug!("Index {} ready after {:?}", name, started.elapsed());
                return Ok(model.into_handle());
            }

            if started.elapsed() >= self.ready_timeout {
                return Err(IndexServiceError::Unavailable(format!(
                    "index {} not ready after {:?}",
                    name, self.ready_timeout
                )));
            }

            debug!("Index {} not ready yet, waiting", name);
            std::thread::sleep(self.ready_poll_interval);
        }
    }
}

impl VectorIndexService for PineconeClient {
    #[inline]
    fn list_indexes(&self) -> ServiceResult<Vec<String>> {
        let url = self.controller_endpoint("/indexes")?;
        let body = self.get(&url).map_err(|e| map_http_error(e, "indexes"))?;
        let list: IndexList = parse(&body, "list indexes")?;
        Ok(list.indexes.into_iter().map(|i| i.name).collect())
    }

    #[inline]
    fn describe_index(&self, name: &str) -> ServiceResult<IndexHandle> {
        self.describe(name).map(IndexModel::into_handle)
    }

    #[inline]
    fn create_index_if_absent(&self, spec: &IndexSpec) -> ServiceResult<CreateOutcome> {
        let url = self.controller_endpoint("/indexes")?;
        let request = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric,
            spec: ServerlessSpec {
                serverless: CloudRegion {
                    cloud: &self.cloud,
                    region: &self.region,
                },
            },
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| IndexServiceError::Rejected(format!("Invalid create request: {}", e)))?;

        match self.post(&url, &request_json) {
            Ok(_) => {
                info!(
                    "Created index {} ({} dimensions, {:?})",
                    spec.name, spec.dimension, spec.metric
                );
                self.wait_until_ready(&spec.name).map(CreateOutcome::Created)
            }
            Err(HttpError::Status { status: 409 }) => {
                debug!("Index {} already exists", spec.name);
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(map_http_error(e, &spec.name)),
        }
    }

    #[inline]
    fn delete_index(&self, name: &str) -> ServiceResult<()> {
        let url = self.controller_endpoint(&format!("/indexes/{}", name))?;
        self.delete(&url).map_err(|e| map_http_error(e, name))?;
        info!("Deleted index {}", name);
        Ok(())
    }

    #[inline]
    fn upsert(&self, handle: &IndexHandle, entries: &[IndexEntry]) -> ServiceResult<usize> {
        let url = Self::data_endpoint(handle, "/vectors/upsert")?;
        let mut upserted = 0;

        for batch in entries.chunks(UPSERT_BATCH_SIZE) {
            let request = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|entry| VectorPayload {
                        id: &entry.id,
                        values: &entry.vector,
                        metadata: TextMetadata {
                            text: entry.sentence.as_str(),
                        },
                    })
                    .collect(),
            };
            let request_json = serde_json::to_string(&request).map_err(|e| {
                IndexServiceError::Rejected(format!("Invalid upsert request: {}", e))
            })?;

            let body = self
                .post(&url, &request_json)
                .map_err(|e| map_http_error(e, &handle.name))?;
            let response: UpsertResponse = parse(&body, "upsert")?;

            debug!(
                "Upserted {} vectors into {}",
                response.upserted_count, handle.name
            );
            upserted += response.upserted_count;
        }

        Ok(upserted)
    }

    #[inline]
    fn query(
        &self,
        handle: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> ServiceResult<Vec<ScoredMatch>> {
        let url = Self::data_endpoint(handle, "/query")?;
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| IndexServiceError::Rejected(format!("Invalid query request: {}", e)))?;

        let body = self
            .post(&url, &request_json)
            .map_err(|e| map_http_error(e, &handle.name))?;
        let response: QueryResponse = parse(&body, "query")?;

        let mut matches = Vec::with_capacity(response.matches.len());
        for m in response.matches {
            let text = m
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.get("text"))
                .and_then(serde_json::Value::as_str);

            match text {
                Some(text) => matches.push(ScoredMatch {
                    id: m.id,
                    score: m.score,
                    sentence: Sentence::new(text),
                }),
                None => warn!("Match {} in {} has no text metadata", m.id, handle.name),
            }
        }

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(matches)
    }
}
