//! 도구 실행기 - 계산기, 백과사전 조회, 시계
//!
//! 도구 호출 문법 (접두사는 대소문자 무시):
//! - `CALC: <expr>`
//! - `WIKI: <topic>`
//! - `TIME:` (뒤 내용은 무시)
//!
//! `execute_tool`은 항상 문자열을 반환합니다. 도구 실패는 에러 메시지
//! 문자열로 변환되어 호출자에게 전달됩니다.

pub mod calc;
pub mod wiki;

use std::sync::Arc;

use chrono::Local;
use thiserror::Error;

pub use calc::{evaluate, CalcError, Number};
pub use wiki::{parse_summary, PageSummary, SummaryClient, WikipediaClient};

/// 도구 접두사 길이 (`CALC:` 등 모두 5바이트)
const PREFIX_LEN: usize = 5;

/// 생성기 프롬프트에 포함되는 도구 설명
pub const AVAILABLE_TOOLS: &str = "Available tools:
CALC: Calculate a mathematical expression (e.g., CALC: 2 + 3 * 4)
WIKI: Search Wikipedia for information (e.g., WIKI: Machine Learning)
TIME: Get current date and time";

// ============================================================================
// Types
// ============================================================================

/// 파싱된 도구 호출
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCommand {
    /// 산술식
    Calc(String),
    /// 백과사전 주제 (공백 포함 원문)
    Wiki(String),
    /// 현재 시각
    Time,
}

impl ToolCommand {
    /// 접두사로 도구 호출 파싱 (해당 없으면 None)
    pub fn parse(call: &str) -> Option<Self> {
        let prefix = call.get(..PREFIX_LEN)?;
        let arg = call[PREFIX_LEN..].trim();

        if prefix.eq_ignore_ascii_case("CALC:") {
            Some(ToolCommand::Calc(arg.to_string()))
        } else if prefix.eq_ignore_ascii_case("WIKI:") {
            Some(ToolCommand::Wiki(arg.to_string()))
        } else if prefix.eq_ignore_ascii_case("TIME:") {
            Some(ToolCommand::Time)
        } else {
            None
        }
    }
}

/// 텍스트가 도구 호출 형태인지 확인
pub fn is_tool_call(text: &str) -> bool {
    ToolCommand::parse(text).is_some()
}

/// 도구 실패
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Unknown tool")]
    UnknownTool,

    #[error("Invalid calculation: {0}")]
    InvalidCalculation(#[from] CalcError),

    #[error("No Wikipedia page found for '{0}'")]
    PageNotFound(String),

    #[error("Error fetching Wikipedia: {0}")]
    Lookup(String),
}

// ============================================================================
// ToolExecutor
// ============================================================================

/// 상태 없는 도구 실행기
#[derive(Clone)]
pub struct ToolExecutor {
    summaries: Arc<dyn SummaryClient>,
}

impl ToolExecutor {
    /// 요약 조회 클라이언트를 지정하여 생성
    pub fn new(summaries: Arc<dyn SummaryClient>) -> Self {
        Self { summaries }
    }

    /// 도구 설명 문자열
    pub fn available_tools(&self) -> &'static str {
        AVAILABLE_TOOLS
    }

    /// 도구 호출 문자열 실행 (실패하지 않음)
    pub async fn execute_tool(&self, call: &str) -> String {
        let result = match ToolCommand::parse(call) {
            Some(command) => self.run(command).await,
            None => Err(ToolError::UnknownTool),
        };

        result.unwrap_or_else(|e| {
            tracing::debug!("Tool call {:?} failed: {}", call, e);
            e.to_string()
        })
    }

    /// 파싱된 도구 실행
    pub async fn run(&self, command: ToolCommand) -> Result<String, ToolError> {
        match command {
            ToolCommand::Calc(expr) => calculate(&expr),
            ToolCommand::Wiki(topic) => self.lookup(&topic).await,
            ToolCommand::Time => Ok(current_time()),
        }
    }

    /// `CALC:` 호출 실행
    pub fn execute_calc(&self, call: &str) -> String {
        calculate(argument(call)).unwrap_or_else(|e| e.to_string())
    }

    /// `WIKI:` 호출 실행
    pub async fn execute_wiki(&self, call: &str) -> String {
        self.lookup(argument(call))
            .await
            .unwrap_or_else(|e| e.to_string())
    }

    /// `TIME:` 호출 실행 (인자 무시)
    pub fn execute_time(&self, _call: &str) -> String {
        current_time()
    }

    async fn lookup(&self, topic: &str) -> Result<String, ToolError> {
        let key = topic.replace(' ', "_");
        let display = key.replace('_', " ");

        match self.summaries.summary(&key).await? {
            Some(summary) => Ok(format!(
                "Wikipedia summary for '{}': {}",
                display,
                summary
                    .extract
                    .as_deref()
                    .unwrap_or("No summary available")
            )),
            None => Err(ToolError::PageNotFound(display)),
        }
    }
}

/// 접두사 이후 인자 (접두사보다 짧으면 빈 문자열)
fn argument(call: &str) -> &str {
    call.get(PREFIX_LEN..).unwrap_or_default().trim()
}

fn calculate(expr: &str) -> Result<String, ToolError> {
    let value = evaluate(expr)?;
    Ok(format!("Calculation result: {}", value))
}

fn current_time() -> String {
    format!(
        "Current date and time: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubSummaries;

    fn executor(summaries: StubSummaries) -> ToolExecutor {
        ToolExecutor::new(Arc::new(summaries))
    }

    #[test]
    fn test_parse_prefixes() {
        assert_eq!(
            ToolCommand::parse("CALC: 2 + 3"),
            Some(ToolCommand::Calc("2 + 3".into()))
        );
        assert_eq!(
            ToolCommand::parse("wiki: Machine Learning"),
            Some(ToolCommand::Wiki("Machine Learning".into()))
        );
        assert_eq!(ToolCommand::parse("Time: whenever"), Some(ToolCommand::Time));
        assert_eq!(ToolCommand::parse("CALC"), None);
        assert_eq!(ToolCommand::parse("SEARCH: x"), None);
        assert_eq!(ToolCommand::parse("계산: 1"), None);
    }

    #[test]
    fn test_available_tools() {
        let tools = executor(StubSummaries::NotFound).available_tools();
        assert!(tools.contains("CALC:"));
        assert!(tools.contains("WIKI:"));
        assert!(tools.contains("TIME:"));
    }

    #[tokio::test]
    async fn test_execute_tool_unknown() {
        let tools = executor(StubSummaries::NotFound);
        assert_eq!(tools.execute_tool("UNKNOWN: test").await, "Unknown tool");
        assert_eq!(tools.execute_tool("").await, "Unknown tool");
    }

    #[test]
    fn test_execute_calc() {
        let tools = executor(StubSummaries::NotFound);
        assert_eq!(tools.execute_calc("CALC: 2 + 3"), "Calculation result: 5");
        assert_eq!(tools.execute_calc("CALC: sqrt(4)"), "Calculation result: 2.0");
        assert!(tools
            .execute_calc("CALC: import os")
            .starts_with("Invalid calculation:"));
        assert!(tools
            .execute_calc("CALC: invalid")
            .contains("Invalid calculation"));
    }

    #[tokio::test]
    async fn test_execute_tool_survives_deep_nesting() {
        let tools = executor(StubSummaries::NotFound);
        let call = format!("CALC: {}1{}", "(".repeat(10_000), ")".repeat(10_000));

        assert_eq!(
            tools.execute_tool(&call).await,
            "Invalid calculation: expression is too deeply nested"
        );
    }

    #[tokio::test]
    async fn test_execute_tool_dispatches_calc() {
        let tools = executor(StubSummaries::NotFound);
        assert_eq!(
            tools.execute_tool("calc: 2 * (3 + 4)").await,
            "Calculation result: 14"
        );
    }

    #[tokio::test]
    async fn test_execute_wiki_found() {
        let tools = executor(StubSummaries::Found(Some("Test summary".into())));
        let result = tools.execute_wiki("WIKI: Test Topic").await;

        assert!(result.contains("Wikipedia summary for 'Test Topic'"));
        assert!(result.contains("Test summary"));
    }

    #[tokio::test]
    async fn test_execute_wiki_without_extract() {
        let tools = executor(StubSummaries::Found(None));
        let result = tools.execute_wiki("WIKI: Empty").await;
        assert_eq!(result, "Wikipedia summary for 'Empty': No summary available");
    }

    #[tokio::test]
    async fn test_execute_wiki_not_found() {
        let tools = executor(StubSummaries::NotFound);
        let result = tools.execute_wiki("WIKI: Nonexistent Page").await;
        assert_eq!(result, "No Wikipedia page found for 'Nonexistent Page'");
    }

    #[tokio::test]
    async fn test_execute_wiki_transport_error() {
        let tools = executor(StubSummaries::Broken("timed out".into()));
        let result = tools.execute_tool("WIKI: Rust").await;
        assert_eq!(result, "Error fetching Wikipedia: timed out");
    }

    #[test]
    fn test_execute_time() {
        let tools = executor(StubSummaries::NotFound);
        let result = tools.execute_time("TIME:");
        let stamp = result
            .strip_prefix("Current date and time: ")
            .expect("time prefix");

        assert!(chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").is_ok());
    }
}
