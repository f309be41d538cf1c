//! OpenAI-compatible `/embeddings` provider.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{l2_normalize, EmbeddingProvider};
use crate::config::EmbeddingConfig;

pub struct RemoteEmbeddingProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        anyhow::ensure!(config.dimensions > 0, "embedding.dimensions must be positive");
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;

        // Local servers (Ollama) need no key
        let api_key = std::env::var(&config.api_key_env).ok();

        tracing::info!(model = %config.model, dims = config.dimensions, "remote embedding provider ready");

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let mut req = self.client.post(&url).json(&json!({
            "model": self.model,
            "input": input,
        }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("HTTP request failed for {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("embedding request failed with HTTP {status}: {body}");
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .context("failed to decode embedding response")?;
        parsed.data.sort_by_key(|d| d.index);

        anyhow::ensure!(
            parsed.data.len() == input.len(),
            "embedding response had {} vectors for {} inputs",
            parsed.data.len(),
            input.len()
        );

        parsed
            .data
            .into_iter()
            .map(|d| {
                anyhow::ensure!(
                    d.embedding.len() == self.dimensions,
                    "model {} returned {} dimensions, expected {}",
                    self.model,
                    d.embedding.len(),
                    self.dimensions
                );
                Ok(l2_normalize(&d.embedding))
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.request(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding response was empty"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.request(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}
