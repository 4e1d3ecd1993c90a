//! Text-processing collaborator contracts
//!
//! The dispatcher consumes four narrow operations: sentiment classification,
//! translation, named-entity extraction, and text generation. Each is a trait
//! so tests can substitute in-process fakes; the shipped implementation
//! (`HttpNlpService`) speaks JSON-over-HTTP to an inference service.
//!
//! Collaborator failures are always recoverable: the dispatcher converts them
//! into an `error` envelope for the single request that triggered them.

mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::envelope::Sentiment;

pub use http::HttpNlpService;

/// Result type for collaborator operations
pub type NlpResult<T> = Result<T, NlpError>;

/// Errors that can occur during collaborator calls
#[derive(Debug, thiserror::Error)]
pub enum NlpError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("response parsing failed: {0}")]
    Parse(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
}

/// A named entity found in a piece of text
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Entity {
    /// The entity text as it appeared
    pub text: String,
    /// Entity group, e.g. "PER", "LOC", "ORG"
    pub group: String,
    /// Confidence score in [0, 1]
    pub score: f64,
}

/// Sentiment classification of free chat text
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> NlpResult<Sentiment>;
}

/// Translation into a target language
#[async_trait]
pub trait Translator: Send + Sync {
    /// An unsupported `lang` is a reported failure, not a fatal one
    async fn translate(&self, lang: &str, text: &str) -> NlpResult<String>;
}

/// Named-entity extraction
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract_entities(&self, text: &str) -> NlpResult<Vec<Entity>>;
}

/// Free-form text generation from a prompt
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> NlpResult<String>;
}

/// Bundle of collaborator handles consumed by the dispatcher
///
/// Each handle is a trait object so the four concerns can be backed by one
/// service, four services, or test fakes in any mix.
#[derive(Clone)]
pub struct NlpServices {
    pub sentiment: Arc<dyn SentimentClassifier>,
    pub translator: Arc<dyn Translator>,
    pub entities: Arc<dyn EntityExtractor>,
    pub generator: Arc<dyn TextGenerator>,
}

impl NlpServices {
    /// Back all four collaborators with one HTTP inference service
    pub fn over_http(base_url: impl Into<String>, timeout: Duration) -> Self {
        let service = Arc::new(HttpNlpService::new(base_url, timeout));
        Self {
            sentiment: service.clone(),
            translator: service.clone(),
            entities: service.clone(),
            generator: service,
        }
    }
}
