//! 백과사전 요약 조회
//!
//! Wikipedia REST API의 페이지 요약 엔드포인트를 사용합니다.
//! ref: https://en.wikipedia.org/api/rest_v1/#/Page%20content/get_page_summary__title_

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::ToolError;

/// 요약 API 베이스 URL
pub const WIKIPEDIA_SUMMARY_URL: &str = "https://en.wikipedia.org/api/rest_v1/page/summary/";

/// 페이지 요약 응답
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PageSummary {
    #[serde(default)]
    pub extract: Option<String>,
}

/// 요약 조회 서비스 트레이트
#[async_trait]
pub trait SummaryClient: Send + Sync {
    /// 주제 키로 요약 조회
    ///
    /// 200이 아닌 응답은 `Ok(None)`, 전송/파싱 실패는 `Err`입니다.
    async fn summary(&self, topic: &str) -> Result<Option<PageSummary>, ToolError>;
}

/// Wikipedia 요약 클라이언트
pub struct WikipediaClient {
    client: reqwest::Client,
    base_url: Url,
}

impl WikipediaClient {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `timeout` - 요청 타임아웃
    pub fn new(timeout: Duration) -> Result<Self, ToolError> {
        Self::with_base_url(WIKIPEDIA_SUMMARY_URL, timeout)
    }

    /// 베이스 URL을 지정하여 생성
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ToolError> {
        let base_url = Url::parse(base_url).map_err(|e| ToolError::Lookup(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ToolError::Lookup(format!("invalid base URL: {}", base_url)));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("rag-transformer/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Lookup(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// 주제 키를 경로 세그먼트로 인코딩한 요청 URL
    pub fn summary_url(&self, topic: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(topic);
        }
        url
    }
}

#[async_trait]
impl SummaryClient for WikipediaClient {
    async fn summary(&self, topic: &str) -> Result<Option<PageSummary>, ToolError> {
        let url = self.summary_url(topic);
        tracing::debug!("Fetching summary: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Lookup(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::debug!("Summary lookup for {:?} returned {}", topic, status);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Lookup(e.to_string()))?;

        parse_summary(status, &body)
    }
}

/// 응답 상태/본문을 요약으로 변환
///
/// 200이 아니면 본문과 무관하게 `Ok(None)`, 200인데 JSON이 아니면 `Err`입니다.
pub fn parse_summary(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<Option<PageSummary>, ToolError> {
    if status != reqwest::StatusCode::OK {
        return Ok(None);
    }

    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| ToolError::Lookup(e.to_string()))
}
