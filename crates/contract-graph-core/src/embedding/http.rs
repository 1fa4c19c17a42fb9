//! HTTP embedding provider
//!
//! Talks to an embedding service exposing:
//! - `GET  /health` - readiness probe
//! - `POST /embed`  - `{"text": "..."}` -> `{"embedding": [f32, ...]}`
//!
//! The provider is created once and warmed up lazily: [`HttpEmbeddingProvider::start`]
//! spawns a background task probing `/health` with exponential backoff.
//! Until that task succeeds the provider reports [`Readiness::NotReady`];
//! if every probe fails it reports [`Readiness::Failed`]. Requests retry on
//! transient failures the same way.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::{normalize, EmbeddingError, EmbeddingProvider, EmbeddingResult, Readiness};
use crate::config::EmbeddingConfig;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Embedding provider backed by an HTTP service
pub struct HttpEmbeddingProvider {
    client: Client,
    base_url: String,
    config: EmbeddingConfig,
    state: RwLock<Readiness>,
}

impl HttpEmbeddingProvider {
    /// Create a provider for `config.endpoint`; starts out not ready
    pub fn new(config: EmbeddingConfig) -> EmbeddingResult<Self> {
        let base_url = config
            .endpoint
            .clone()
            .ok_or_else(|| EmbeddingError::Http("no embedding endpoint configured".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EmbeddingError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            config,
            state: RwLock::new(Readiness::NotReady),
        })
    }

    /// Spawn the background warm-up task
    pub fn start(self: &Arc<Self>) -> JoinHandle<Readiness> {
        let provider = Arc::clone(self);
        tokio::spawn(async move { provider.warm_up().await })
    }

    /// Probe the service until it answers healthy or the attempts run out
    pub async fn warm_up(&self) -> Readiness {
        let mut backoff_ms = self.config.initial_backoff_ms;
        let attempts = self.config.warmup_attempts.max(1);

        for attempt in 0..attempts {
            if attempt > 0 {
                sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = self.next_backoff(backoff_ms);
            }

            if self.health_check().await {
                tracing::info!(endpoint = %self.base_url, "Embedding provider ready");
                self.set_state(Readiness::Ready);
                return Readiness::Ready;
            }
            tracing::debug!(attempt = attempt, endpoint = %self.base_url, "Embedding provider not healthy yet");
        }

        let reason = format!("{} unreachable after {} attempts", self.base_url, attempts);
        tracing::warn!(endpoint = %self.base_url, "Embedding provider failed to initialise");
        self.set_state(Readiness::Failed(reason.clone()));
        Readiness::Failed(reason)
    }

    /// Single health probe
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<HealthResponse>().await {
                    Ok(health) => matches!(health.status.as_str(), "healthy" | "ok" | "up" | "ready"),
                    Err(_) => true,
                }
            }
            Ok(_) => false,
            Err(e) => {
                tracing::debug!(error = %e, "Embedding health check failed");
                false
            }
        }
    }

    fn set_state(&self, readiness: Readiness) {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *state = readiness;
    }

    fn next_backoff(&self, current_ms: u64) -> u64 {
        ((current_ms as f64 * self.config.backoff_multiplier) as u64).min(self.config.max_backoff_ms)
    }

    async fn request_embedding(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let url = format!("{}/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(|e| EmbeddingError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: EmbedResponse = response
                .json()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
            normalize(body.embedding)
        } else if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            let error_text = response.text().await.unwrap_or_default();
            Err(EmbeddingError::InvalidResponse(format!("Bad request: {}", error_text)))
        } else {
            Err(EmbeddingError::Http(format!("Unexpected status: {}", status)))
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn readiness(&self) -> Readiness {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn generate_embedding(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyText);
        }
        if !self.is_ready() {
            return Err(EmbeddingError::NotReady);
        }

        let mut backoff_ms = self.config.initial_backoff_ms;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::debug!(attempt = attempt, backoff_ms = backoff_ms, "Retrying embedding request");
                sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = self.next_backoff(backoff_ms);
            }

            match self.request_embedding(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) => {
                    tracing::warn!(attempt = attempt, error = %e, "Embedding request failed");
                    let permanent = matches!(e, EmbeddingError::InvalidResponse(_));
                    last_error = Some(e);
                    if permanent {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EmbeddingError::Http("no attempt made".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig {
            endpoint: Some(server.uri()),
            timeout_ms: 1000,
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_multiplier: 2.0,
            warmup_attempts: 2,
        }
    }

    #[test]
    fn test_requires_endpoint() {
        assert!(HttpEmbeddingProvider::new(EmbeddingConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_not_ready_until_warmed_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .mount(&server)
            .await;

        let provider = Arc::new(HttpEmbeddingProvider::new(config_for(&server)).unwrap());
        assert_eq!(provider.readiness(), Readiness::NotReady);

        let readiness = provider.start().await.unwrap();
        assert_eq!(readiness, Readiness::Ready);
        assert!(provider.is_ready());
    }

    #[tokio::test]
    async fn test_failed_warmup_reports_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(config_for(&server)).unwrap();
        let readiness = provider.warm_up().await;
        assert!(matches!(readiness, Readiness::Failed(_)));
        assert!(matches!(provider.readiness(), Readiness::Failed(_)));
    }

    #[tokio::test]
    async fn test_generate_normalises_vector() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "healthy"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"embedding": [0.0, 3.0, 4.0]})),
            )
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(config_for(&server)).unwrap();
        provider.warm_up().await;

        let vector = provider.generate_embedding("payment processing").await.unwrap();
        assert_eq!(vector.len(), 3);
        assert!((vector[1] - 0.6).abs() < 1e-6);
        assert!((vector[2] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_rejects_blank_text() {
        let server = MockServer::start().await;
        let provider = HttpEmbeddingProvider::new(config_for(&server)).unwrap();
        assert!(matches!(
            provider.generate_embedding("   ").await,
            Err(EmbeddingError::EmptyText)
        ));
    }

    #[tokio::test]
    async fn test_server_errors_surface_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let provider = HttpEmbeddingProvider::new(config_for(&server)).unwrap();
        provider.warm_up().await;
        assert!(matches!(
            provider.generate_embedding("text").await,
            Err(EmbeddingError::Http(_))
        ));
    }
}
