//! 임베딩 모듈 - 문서/질의 텍스트 벡터화
//!
//! 임베딩 백엔드는 선택 사항입니다. API 키가 없으면 `NullEmbedding`이
//! 선택되고, 지식 저장소는 위치 기반 검색으로 동작합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&Config::from_env());
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::BackendError;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 같은 모델 인스턴스에 대해 결정적이며, 차원은 인스턴스마다 고정입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩 (문서용)
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError>;

    /// 검색 질의 임베딩 (기본 구현: `embed`와 동일)
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, BackendError> {
        self.embed(query).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;

    /// 실제 임베딩이 가능한지 여부
    fn is_available(&self) -> bool {
        true
    }
}

// ============================================================================
// Null Embedding
// ============================================================================

/// 임베딩 백엔드가 없을 때 사용하는 구현체
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEmbedding;

#[async_trait]
impl EmbeddingProvider for NullEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
        Err(BackendError::Unavailable("embedding"))
    }

    fn dimension(&self) -> usize {
        0
    }

    fn name(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini API 베이스 URL
/// ref: https://ai.google.dev/gemini-api/docs/embeddings
pub(crate) const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이
const MIN_DELAY_MS: u64 = 1000;
/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// 임베딩 용도 (Gemini `taskType`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// 저장할 문서
    RetrievalDocument,
    /// 검색 질의
    RetrievalQuery,
}

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
    max_workers: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay: Duration::from_millis(MIN_DELAY_MS),
            last_request: None,
        }
    }

    /// 요청 가능할 때까지 대기
    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

impl GeminiEmbedding {
    /// 설정에서 생성
    ///
    /// API 키가 없거나 차원이 지원되지 않으면 에러를 반환합니다.
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let api_key = config.require_api_key()?.to_string();
        Self::with_dimension(api_key, &config.embedding_model, config.embedding_dimension)
            .map(|embedder| embedder.with_max_workers(config.max_workers))
    }

    /// 차원을 지정하여 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 임베딩 모델 ID
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    pub fn with_dimension(
        api_key: String,
        model: &str,
        dimension: usize,
    ) -> Result<Self, BackendError> {
        if ![768, 1536, 3072].contains(&dimension) {
            return Err(BackendError::InvalidConfig(format!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
        )));

        Ok(Self {
            api_key,
            model: model.to_string(),
            client,
            dimension,
            max_workers: 1,
            rate_limiter,
        })
    }

    /// 배치 임베딩 동시 요청 수 지정
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:embedContent", GEMINI_API_BASE, self.model)
    }
}

/// Gemini API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: TaskType,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct GeminiError {
    pub(crate) error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorDetail {
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) status: String,
}

/// 에러 응답 본문을 BackendError로 변환
pub(crate) fn api_error(status: reqwest::StatusCode, body: &str) -> BackendError {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(error) => BackendError::Api {
            provider: "Gemini",
            status: error.error.status,
            message: error.error.message,
        },
        Err(_) => BackendError::Api {
            provider: "Gemini",
            status: status.to_string(),
            message: body.to_string(),
        },
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
}

impl GeminiEmbedding {
    fn build_request(&self, text: &str, task_type: TaskType) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type,
            output_dimensionality: Some(self.dimension),
        }
    }

    /// 용도를 지정하여 임베딩 (429 재시도 포함)
    pub async fn embed_with_task(
        &self,
        text: &str,
        task_type: TaskType,
    ) -> Result<Vec<f32>, BackendError> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = self.build_request(text, task_type);

        let mut last_error: Option<BackendError> = None;

        // 재시도 루프 (429 에러 시 지수 백오프)
        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let response = match self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(BackendError::Request(format!(
                        "Failed to send embedding request: {}",
                        e
                    )));
                    if attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff(attempt),
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response.text().await?;

            if status.is_success() {
                let embed_response: EmbedResponse = serde_json::from_str(&body)
                    .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
                let values = embed_response.embedding.values;
                if values.len() != self.dimension {
                    return Err(BackendError::DimensionMismatch {
                        expected: self.dimension,
                        actual: values.len(),
                    });
                }
                return Ok(values);
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff(attempt),
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(BackendError::Request("Rate limit exceeded (429)".into()));

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
            } else {
                return Err(api_error(status, &body));
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BackendError::Request(format!("Embedding failed after {} retries", MAX_RETRIES))
        }))
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        self.embed_with_task(text, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, BackendError> {
        self.embed_with_task(query, TaskType::RetrievalQuery).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        // 순서를 유지하면서 최대 max_workers개씩 동시 요청
        // Rate limiter가 실제 호출 간격을 조절함
        let total = texts.len();
        let requests: Vec<_> = texts
            .iter()
            .cloned()
            .enumerate()
            .map(move |(i, text)| async move {
                tracing::debug!("Embedding batch {}/{}", i + 1, total);
                self.embed(&text).await
            })
            .collect();

        stream::iter(requests)
            .buffered(self.max_workers)
            .try_collect()
            .await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 선택
///
/// Gemini 초기화에 실패하면 경고를 남기고 `NullEmbedding`을 반환합니다.
pub fn create_embedder(config: &Config) -> Arc<dyn EmbeddingProvider> {
    match GeminiEmbedding::from_config(config) {
        Ok(embedder) => {
            tracing::info!(
                "Using Gemini embedding {} (dimension: {})",
                embedder.name(),
                embedder.dimension()
            );
            Arc::new(embedder)
        }
        Err(e) => {
            tracing::warn!("Embedding backend unavailable, using positional retrieval: {}", e);
            Arc::new(NullEmbedding)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimension() {
        let result =
            GeminiEmbedding::with_dimension("fake_key".to_string(), "gemini-embedding-001", 999);
        let err = result.err();
        assert!(err
            .as_ref()
            .map(|e| e.to_string().contains("Invalid dimension"))
            .unwrap_or(false));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            let result =
                GeminiEmbedding::with_dimension("fake_key".to_string(), "gemini-embedding-001", dim);
            assert!(result.is_ok());
        }
    }

    #[test]
    fn test_endpoint_uses_model() {
        let embedder =
            GeminiEmbedding::with_dimension("fake_key".to_string(), "text-embedding-004", 768)
                .unwrap();
        assert!(embedder
            .endpoint()
            .ends_with("/models/text-embedding-004:embedContent"));
    }

    #[test]
    fn test_request_task_type() {
        let embedder =
            GeminiEmbedding::with_dimension("fake_key".to_string(), "gemini-embedding-001", 768)
                .unwrap();

        let document = serde_json::to_value(
            embedder.build_request("a stored document", TaskType::RetrievalDocument),
        )
        .unwrap();
        assert_eq!(document["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(document["outputDimensionality"], 768);
        assert_eq!(document["model"], "models/gemini-embedding-001");

        let query =
            serde_json::to_value(embedder.build_request("what is ml", TaskType::RetrievalQuery))
                .unwrap();
        assert_eq!(query["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(query["content"]["parts"][0]["text"], "what is ml");
    }

    #[tokio::test]
    async fn test_batch_of_blank_texts_keeps_order_without_requests() {
        let embedder =
            GeminiEmbedding::with_dimension("fake_key".to_string(), "gemini-embedding-001", 768)
                .unwrap()
                .with_max_workers(4);
        let texts = vec![String::new(), "   ".to_string(), "\n".to_string()];

        let embeddings = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        assert!(embeddings.iter().all(|e| e.len() == 768));
    }

    #[tokio::test]
    async fn test_default_embed_query_uses_embed() {
        let result = NullEmbedding.embed_query("what is ml").await;
        assert!(matches!(result, Err(BackendError::Unavailable("embedding"))));
    }

    #[test]
    fn test_from_config_without_key() {
        let result = GeminiEmbedding::from_config(&Config::default());
        assert!(matches!(result, Err(BackendError::MissingApiKey)));
    }

    #[test]
    fn test_create_embedder_falls_back_to_null() {
        let embedder = create_embedder(&Config::default());
        assert!(!embedder.is_available());
        assert_eq!(embedder.name(), "none");
    }

    #[test]
    fn test_api_error_parses_gemini_body() {
        let body = r#"{"error": {"message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        let err = api_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(
            err.to_string(),
            "Gemini API error (INVALID_ARGUMENT): API key not valid"
        );
    }

    #[tokio::test]
    async fn test_null_embedding_is_unavailable() {
        let result = NullEmbedding.embed("hello world").await;
        assert!(matches!(result, Err(BackendError::Unavailable("embedding"))));
    }
}
