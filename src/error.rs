//! 에러 타입
//!
//! 코어 로직은 `thiserror` 기반의 명시적 에러를 반환하고,
//! CLI 경계에서만 `anyhow`로 감쌉니다.

use std::path::PathBuf;

use thiserror::Error;

use crate::tools::ToolError;

/// 임베딩/생성 백엔드 에러
#[derive(Debug, Error)]
pub enum BackendError {
    /// 백엔드가 구성되지 않음 (API 키 없음 등)
    #[error("{0} backend is not available")]
    Unavailable(&'static str),

    /// API 키 누락
    #[error(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )]
    MissingApiKey,

    /// 잘못된 설정값
    #[error("invalid backend configuration: {0}")]
    InvalidConfig(String),

    /// HTTP 요청 실패
    #[error("request failed: {0}")]
    Request(String),

    /// API가 에러 응답을 반환
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: String,
        message: String,
    },

    /// 응답 파싱 실패
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// 임베딩 차원 불일치
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Request(err.to_string())
    }
}

/// 지식 저장소 에러
#[derive(Debug, Error)]
pub enum StoreError {
    /// 문서 파일 읽기 실패
    #[error("failed to read knowledge base {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 문서 파일이 JSON 문자열 배열이 아님
    #[error("knowledge base {path:?} is not a JSON array of strings: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// 임베딩 백엔드 실패
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// 엔진 초기화 에러
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to initialize tools: {0}")]
    Tools(#[from] ToolError),
}
