//! 설정 모듈
//!
//! 프로세스 시작 시 한 번 생성되어 각 컴포넌트 생성자에 전달됩니다.
//! 코어 로직은 환경변수를 직접 읽지 않습니다.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::BackendError;

/// 기본 임베딩 모델 (Gemini MRL 지원 모델)
pub const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// 기본 생성 모델
pub const DEFAULT_GENERATOR_MODEL: &str = "gemini-2.0-flash";

/// 세션 동안 변하지 않는 설정값
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API 키 (없으면 임베딩/생성 백엔드 비활성화)
    pub api_key: Option<String>,
    /// 임베딩 모델 ID
    pub embedding_model: String,
    /// 임베딩 차원 (768, 1536, 3072)
    pub embedding_dimension: usize,
    /// 생성 모델 ID
    pub generator_model: String,
    /// 데이터셋 디렉토리
    pub dataset_dir: PathBuf,
    /// 지식베이스 파일 이름 (dataset_dir 기준)
    pub knowledge_base_file: PathBuf,
    /// 검색할 문서 수
    pub top_k: usize,
    /// 생성 루프 최대 반복 횟수
    pub max_iterations: usize,
    /// 생성 최대 토큰 수
    pub max_length: usize,
    /// 샘플링 temperature
    pub temperature: f32,
    /// 배치 임베딩 동시 요청 수
    pub max_workers: usize,
    /// 요약 조회 타임아웃
    pub lookup_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            generator_model: DEFAULT_GENERATOR_MODEL.to_string(),
            dataset_dir: PathBuf::from("datasets"),
            knowledge_base_file: PathBuf::from("knowledge_base.json"),
            top_k: 3,
            max_iterations: 3,
            max_length: 150,
            temperature: 0.7,
            max_workers: 5,
            lookup_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 키-값 조회 함수에서 설정 로드
    ///
    /// 정수 파싱에 실패하면 경고를 남기고 기본값을 사용합니다.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("GEMINI_API_KEY").or_else(|| non_empty("GOOGLE_AI_API_KEY"));

        Self {
            api_key,
            embedding_model: non_empty("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_or(
                "EMBEDDING_DIMENSION",
                non_empty("EMBEDDING_DIMENSION"),
                defaults.embedding_dimension,
            ),
            generator_model: non_empty("GENERATOR_MODEL").unwrap_or(defaults.generator_model),
            dataset_dir: non_empty("DATASET_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.dataset_dir),
            knowledge_base_file: non_empty("KNOWLEDGE_BASE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.knowledge_base_file),
            top_k: parse_or("TOP_K_RETRIEVAL", non_empty("TOP_K_RETRIEVAL"), defaults.top_k),
            max_iterations: parse_or(
                "MAX_ITERATIONS",
                non_empty("MAX_ITERATIONS"),
                defaults.max_iterations,
            ),
            max_length: parse_or("MAX_LENGTH", non_empty("MAX_LENGTH"), defaults.max_length),
            temperature: parse_or("TEMPERATURE", non_empty("TEMPERATURE"), defaults.temperature),
            max_workers: parse_or("MAX_WORKERS", non_empty("MAX_WORKERS"), defaults.max_workers)
                .max(1),
            lookup_timeout: Duration::from_secs(parse_or(
                "LOOKUP_TIMEOUT_SECS",
                non_empty("LOOKUP_TIMEOUT_SECS"),
                defaults.lookup_timeout.as_secs(),
            )),
        }
    }

    /// 지식베이스 파일 전체 경로
    pub fn knowledge_base_path(&self) -> PathBuf {
        self.dataset_dir.join(&self.knowledge_base_file)
    }

    /// API 키 존재 여부
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// API 키 반환 (없으면 에러)
    pub fn require_api_key(&self) -> Result<&str, BackendError> {
        self.api_key.as_deref().ok_or(BackendError::MissingApiKey)
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {:?}, defaulting to {}", key, raw, default);
            default
        }),
    }
}
