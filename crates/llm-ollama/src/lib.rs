//! Text-completion service backed by Ollama.
//!
//! Answers `TextCompletionRequest`s under the correlation id each request
//! carries, so callers using the request client receive their own reply.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod completer;
mod error;
mod handler;
mod stage;

pub use completer::{Completer, DEFAULT_MODEL, DEFAULT_OLLAMA_URL, OllamaCompleter, OllamaError};
pub use error::{Error, HandlerError};
pub use handler::{CompletionHandler, ResponseProducer};
pub use stage::{CompletionConfig, CompletionStage, DEFAULT_SUBSCRIBER};
