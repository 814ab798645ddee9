use std::error::Error as StdError;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Default model asked for completions.
pub const DEFAULT_MODEL: &str = "gemma2";

/// Default address of the Ollama server.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Something that completes prompts.
#[async_trait]
pub trait Completer: Clone + Debug + Send + Sync + 'static {
    /// The error type for the completer.
    type Error: StdError + Send + Sync + 'static;

    /// Returns the completion of `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, Self::Error>;
}

/// Errors from the Ollama HTTP API.
#[derive(Debug, Error)]
pub enum OllamaError {
    /// The request failed or the server answered with an error status.
    #[error("ollama request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Completes prompts with a model served by Ollama.
#[derive(Clone, Debug)]
pub struct OllamaCompleter {
    client: Client,
    generate_url: String,
    model: String,
}

impl OllamaCompleter {
    /// Creates a completer for `model` on the server at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new<U, M>(url: U, model: M, timeout: Duration) -> Result<Self, OllamaError>
    where
        U: AsRef<str>,
        M: Into<String>,
    {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            generate_url: generate_url(url.as_ref()),
            model: model.into(),
        })
    }

    /// The model completions are requested from.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

fn generate_url(base: &str) -> String {
    format!("{}/api/generate", base.trim_end_matches('/'))
}

#[async_trait]
impl Completer for OllamaCompleter {
    type Error = OllamaError;

    async fn complete(&self, prompt: &str) -> Result<String, Self::Error> {
        trace!("posting {} byte prompt to {}", prompt.len(), self.generate_url);

        let response: GenerateResponse = self
            .client
            .post(&self.generate_url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.response)
    }
}
