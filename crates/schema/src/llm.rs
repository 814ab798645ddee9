use serde::{Deserialize, Serialize};

/// A prompt to complete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCompletionRequest {
    /// The full prompt text.
    pub prompt: String,
}

/// The completion of a [`TextCompletionRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCompletionResponse {
    /// Generated text.
    pub response: String,
}

json_payload!(TextCompletionRequest, TextCompletionResponse);
