//! 텍스트 생성 모듈
//!
//! Gemini `generateContent` API로 답변 후보를 생성합니다.
//! API 키가 없으면 `NullGenerator`가 선택되고, 엔진은 검색된 문서를
//! 그대로 반환합니다.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::embedding::{api_error, GEMINI_API_BASE};
use crate::error::BackendError;

// ============================================================================
// Types
// ============================================================================

/// 생성 파라미터
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// 최대 출력 토큰 수
    pub max_length: usize,
    /// 샘플링 temperature
    pub temperature: f32,
}

impl GenerationParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_length: config.max_length,
            temperature: config.temperature,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// ============================================================================
// TextGenerator Trait
// ============================================================================

/// 텍스트 생성기 트레이트
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 프롬프트에 대한 응답 텍스트 생성 (샘플링 1회)
    async fn generate(&self, prompt: &str, params: &GenerationParams)
        -> Result<String, BackendError>;

    /// 생성기 이름
    fn name(&self) -> &str;

    /// 실제 생성이 가능한지 여부
    fn is_available(&self) -> bool {
        true
    }
}

/// 생성 백엔드가 없을 때 사용하는 구현체
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGenerator;

#[async_trait]
impl TextGenerator for NullGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, BackendError> {
        Err(BackendError::Unavailable("generation"))
    }

    fn name(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }
}

// ============================================================================
// Gemini Generator
// ============================================================================

/// Gemini 텍스트 생성기
#[derive(Debug)]
pub struct GeminiGenerator {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    /// 설정에서 생성
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let api_key = config.require_api_key()?.to_string();
        Self::new(api_key, &config.generator_model)
    }

    pub fn new(api_key: String, model: &str) -> Result<Self, BackendError> {
        if model.trim().is_empty() {
            return Err(BackendError::InvalidConfig("generator model is empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            api_key,
            model: model.to_string(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_API_BASE, self.model)
    }

    fn build_request(prompt: &str, params: &GenerationParams) -> GenerateRequest {
        GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_length,
                candidate_count: 1,
            },
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, BackendError> {
        let request = Self::build_request(prompt, params);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        let text = parsed.first_text();
        if text.is_empty() {
            tracing::warn!("Generator {} returned an empty candidate", self.model);
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// 설정에 맞는 생성기 선택
///
/// 초기화에 실패하면 경고를 남기고 `NullGenerator`를 반환합니다.
pub fn create_generator(config: &Config) -> Arc<dyn TextGenerator> {
    match GeminiGenerator::from_config(config) {
        Ok(generator) => {
            tracing::info!("Using Gemini generator {}", generator.name());
            Arc::new(generator)
        }
        Err(e) => {
            tracing::warn!("Generator unavailable, responses may be limited: {}", e);
            Arc::new(NullGenerator)
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: usize,
    #[serde(rename = "candidateCount")]
    candidate_count: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// 첫 번째 후보의 텍스트 파트를 이어붙임
    fn first_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    text: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
