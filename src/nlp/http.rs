//! HTTP-backed collaborator implementation
//!
//! Talks to an inference service exposing one JSON endpoint per operation:
//! `POST /sentiment`, `/translate`, `/ner`, `/generate`. Every request is
//! bounded by the configured timeout so a stuck model never wedges a
//! connection's dispatch path.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Entity, EntityExtractor, NlpError, NlpResult, SentimentClassifier, TextGenerator, Translator};
use crate::envelope::Sentiment;

/// Collaborator client for a JSON-over-HTTP inference service
pub struct HttpNlpService {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    lang: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct SentimentResponse {
    label: String,
    score: f64,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translation: String,
}

#[derive(Deserialize)]
struct EntitiesResponse {
    entities: Vec<Entity>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
}

impl HttpNlpService {
    /// Create a client for the service at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> NlpResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);

        let response = tokio::time::timeout(self.timeout, self.client.post(&url).json(body).send())
            .await
            .map_err(|_| NlpError::Timeout(self.timeout))?
            .map_err(|e| NlpError::Api(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NlpError::Api(format!(
                "inference service returned status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| NlpError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SentimentClassifier for HttpNlpService {
    async fn classify(&self, text: &str) -> NlpResult<Sentiment> {
        let response: SentimentResponse = self.post_json("sentiment", &TextRequest { text }).await?;
        Ok(Sentiment {
            label: response.label,
            score: response.score,
        })
    }
}

#[async_trait]
impl Translator for HttpNlpService {
    async fn translate(&self, lang: &str, text: &str) -> NlpResult<String> {
        let url = format!("{}/translate", self.base_url.trim_end_matches('/'));
        let body = TranslateRequest { lang, text };

        let response = tokio::time::timeout(self.timeout, self.client.post(&url).json(&body).send())
            .await
            .map_err(|_| NlpError::Timeout(self.timeout))?
            .map_err(|e| NlpError::Api(e.to_string()))?;

        // The service rejects unknown language codes with 422
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(NlpError::UnsupportedLanguage(lang.to_string()));
        }
        if !response.status().is_success() {
            return Err(NlpError::Api(format!(
                "inference service returned status {}",
                response.status()
            )));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| NlpError::Parse(e.to_string()))?;
        Ok(parsed.translation)
    }
}

#[async_trait]
impl EntityExtractor for HttpNlpService {
    async fn extract_entities(&self, text: &str) -> NlpResult<Vec<Entity>> {
        let response: EntitiesResponse = self.post_json("ner", &TextRequest { text }).await?;
        Ok(response.entities)
    }
}

#[async_trait]
impl TextGenerator for HttpNlpService {
    async fn generate(&self, prompt: &str) -> NlpResult<String> {
        let response: GenerateResponse = self.post_json("generate", &GenerateRequest { prompt }).await?;
        Ok(response.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Only run with an inference service on localhost:8000
    async fn test_live_sentiment() {
        let service = HttpNlpService::new("http://127.0.0.1:8000", Duration::from_secs(30));

        let sentiment = service.classify("I love this").await.unwrap();

        assert!(!sentiment.label.is_empty());
        assert!((0.0..=1.0).contains(&sentiment.score));
        println!("Sentiment: {:?}", sentiment);
    }
}
