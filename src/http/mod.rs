// Shared blocking HTTP plumbing for the API clients


use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request error: {0}")]
    Request(String),
}

impl HttpError {
    #[inline]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status } => *status >= 500 || *status == 429,
            Self::Transport(_) => true,
            Self::Request(_) => false,
        }
    }
}

impl From<ureq::Error> for HttpError {
    #[inline]
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::StatusCode(status) => Self::Status { status },
            ureq::Error::ConnectionFailed
            | ureq::Error::HostNotFound
            | ureq::Error::Timeout(_)
            | ureq::Error::Io(_) => Self::Transport(error.to_string()),
            other => Self::Request(other.to_string()),
        }
    }
}

/// Build an agent with a global timeout.
#[inline]
pub fn agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Run `request_fn` up to `attempts` times.
///
/// Only 429, 5xx and transport failures are retried; every other error is
/// returned as soon as it happens. Waits 1s, 2s, 4s... between attempts.
#[inline]
pub fn with_retry<F>(attempts: u32, target: &str, mut request_fn: F) -> Result<String, HttpError>
where
    F: FnMut() -> Result<String, ureq::Error>,
{
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        debug!("HTTP request to {} attempt {}/{}", target, attempt, attempts);

        match request_fn() {
            Ok(response_text) => return Ok(response_text),
            Err(e) => {
                let e = HttpError::from(e);
                if !e.is_retryable() {
                    debug!("Not retrying {}: {}", target, e);
                    return Err(e);
                }

                warn!(
                    "Request to {} failed: {}, attempt {}/{}",
                    target, e, attempt, attempts
                );
                last_error = Some(e);

                if attempt < attempts {
                    let delay = Duration::from_millis(EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000);
                    debug!("Waiting {:?} before retry", delay);
                    std::thread::sleep(delay);
                }
            }
        }
    }

    error!("All {} attempts failed for request to {}", attempts, target);
    Err(last_error.unwrap_or_else(|| HttpError::Request("no attempts were made".to_string())))
}
