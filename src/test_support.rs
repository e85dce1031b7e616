// Deterministic collaborators shared by unit tests

use anyhow::{Result, anyhow};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::completion::{ChatCompleter, CompletionRequest, ModelCatalog};
use crate::embeddings::Embedder;
use crate::records::{Record, RecordSource};

/// Words the keyword embedder maps onto vector axes
pub const VOCABULARY: [&str; 8] = [
    "login", "crash", "payment", "export", "report", "password", "slow", "email",
];

/// Embeds text as keyword counts over [`VOCABULARY`], so texts sharing
/// keywords end up close together.
#[derive(Debug, Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        VOCABULARY
            .iter()
            .map(|keyword| words.iter().filter(|w| *w == keyword).count() as f32)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len()
    }
}

/// Embedder whose backend is always down
#[derive(Debug, Default)]
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("embedding service unreachable"))
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len()
    }
}

/// Completer that replays canned replies and remembers every request
#[derive(Debug, Default)]
pub struct ScriptedCompleter {
    replies: Mutex<VecDeque<Result<String, String>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompleter {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| Ok((*r).to_string())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(message.to_string())])),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: &str) {
        self.replies
            .lock()
            .expect("replies lock")
            .push_back(Ok(reply.to_string()));
    }

    pub fn recorded(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ChatCompleter for ScriptedCompleter {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());

        let next = self.replies.lock().expect("replies lock").pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok("OK".to_string()),
        }
    }
}

/// Fixed model listing
#[derive(Debug, Default)]
pub struct StaticCatalog {
    pub models: Vec<String>,
}

impl StaticCatalog {
    pub fn new(models: &[&str]) -> Self {
        Self {
            models: models.iter().map(|m| (*m).to_string()).collect(),
        }
    }
}

impl ModelCatalog for StaticCatalog {
    fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.models.clone())
    }
}

/// Record source that counts how often it was read
#[derive(Debug, Default)]
pub struct CountingSource {
    pub records: Vec<Record>,
    pub loads: AtomicUsize,
}

impl CountingSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl RecordSource for CountingSource {
    fn load(&self) -> crate::Result<Vec<Record>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        "counting test source".to_string()
    }
}

pub fn ticket(title: &str, kind: &str, assignee: &str, status: &str, description: &str) -> Record {
    Record::new()
        .with("title", title)
        .with("type", kind)
        .with("assignee", assignee)
        .with("status", status)
        .with("description", description)
}

/// The two-ticket export used throughout the pipeline tests
pub fn sample_tickets() -> Vec<Record> {
    vec![
        ticket(
            "Login fails",
            "Bug",
            "Ana",
            "Open",
            "App crashes on login",
        ),
        ticket(
            "Export report",
            "Feature",
            "Ben",
            "Done",
            "Add CSV export to the monthly report",
        ),
    ]
}
