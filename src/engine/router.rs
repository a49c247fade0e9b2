//! 질의 분류기
//!
//! 원문 질의를 네 가지 처리 경로 중 하나로 분류합니다 (먼저 일치하는 쪽이 우선):
//! 1. 인사 → 고정 인사말
//! 2. 명시적 도구 호출 (`CALC:`, `WIKI:`, `TIME:`)
//! 3. 추론된 산술식 → `CALC:` 호출
//! 4. 검색 + 생성

use std::sync::OnceLock;

use regex::Regex;

use crate::tools::is_tool_call;

/// 인사로 취급하는 첫 단어
const GREETINGS: [&str; 4] = ["hi", "hello", "hey", "greetings"];

/// 분류 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// 인사 - 검색/생성 없이 즉시 응답
    Greeting,
    /// 도구 호출 원문
    Tool(String),
    /// 추출된 산술식
    Calculate(String),
    /// 검색 + 생성 대상 질의
    Retrieve(String),
}

/// 앞뒤 공백 제거 후 짝이 맞는 따옴표 한 겹 제거
pub fn normalize_query(raw: &str) -> &str {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].trim();
        }
    }
    trimmed
}

/// 질의 분류
pub fn route(raw: &str) -> Route {
    let query = normalize_query(raw);

    let is_greeting = query
        .split_whitespace()
        .next()
        .map(|first| GREETINGS.contains(&first.to_lowercase().as_str()))
        .unwrap_or(false);
    if is_greeting {
        return Route::Greeting;
    }

    if is_tool_call(query) {
        return Route::Tool(query.to_string());
    }

    if looks_like_arithmetic(query) {
        let expr = extract_expression(query);
        if !expr.is_empty() {
            return Route::Calculate(expr);
        }
    }

    Route::Retrieve(query.to_string())
}

fn binary_op_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\d+\s*[+\-*/]\s*\d+").ok())
        .as_ref()
}

fn calculate_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)calculate\s+(.+)").ok())
        .as_ref()
}

/// "calculate"를 포함하거나 `숫자 연산자 숫자` 형태를 포함하는지 확인
fn looks_like_arithmetic(query: &str) -> bool {
    query.to_lowercase().contains("calculate")
        || binary_op_pattern()
            .map(|re| re.is_match(query))
            .unwrap_or(false)
}

/// 산술식 추출
///
/// "calculate" 뒤의 텍스트를 우선 사용하고, 없으면 숫자/연산자/괄호/공백
/// 외의 문자를 모두 제거합니다.
fn extract_expression(query: &str) -> String {
    if let Some(captures) = calculate_pattern().and_then(|re| re.captures(query)) {
        if let Some(expr) = captures.get(1) {
            return expr.as_str().trim().to_string();
        }
    }

    query
        .chars()
        .filter(|c| c.is_ascii_digit() || "+-*/.()".contains(*c) || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}
