use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for provider reply streams.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events yielded while a provider streams a reply.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ReplyEvent {
    /// A chunk of reply text.
    #[serde(rename = "token")]
    Token { text: String },

    /// Stream closed; carries final usage metadata when the provider
    /// reports it.
    #[serde(rename = "done")]
    Done { usage: Option<Usage> },

    /// Stream-level failure.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for one provider call.
///
/// The cache counters are optional — providers that support prompt caching
/// report them and the transcript folds them into its accounting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_creation_tokens: Option<u64>,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
