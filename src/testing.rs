//! 테스트용 스텁 백엔드

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::BackendError;
use crate::generation::{GenerationParams, TextGenerator};
use crate::tools::{PageSummary, SummaryClient, ToolError};

/// 알파벳 빈도 26차원 임베더 (결정적)
#[derive(Debug, Default)]
pub struct LetterEmbedder {
    calls: AtomicUsize,
}

impl LetterEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut counts = vec![0.0; 26];
        for c in text.chars().filter(char::is_ascii_alphabetic) {
            counts[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        Ok(counts)
    }

    fn dimension(&self) -> usize {
        26
    }

    fn name(&self) -> &str {
        "letters"
    }
}

/// 텍스트 길이를 차원으로 쓰는 임베더 (차원이 호출마다 달라짐)
#[derive(Debug, Default)]
pub struct LengthEmbedder;

#[async_trait]
impl EmbeddingProvider for LengthEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        Ok(vec![1.0; text.chars().count()])
    }

    fn dimension(&self) -> usize {
        0
    }

    fn name(&self) -> &str {
        "length"
    }
}

/// 항상 실패하는 임베더
#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
        Err(BackendError::Request("connection refused".into()))
    }

    fn dimension(&self) -> usize {
        26
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// 미리 정한 응답을 순서대로 돌려주는 생성기
///
/// 응답이 바닥나면 마지막 응답을 반복합니다.
#[derive(Debug)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            last: Mutex::new(String::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// 항상 실패하는 생성기
#[derive(Debug, Default)]
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, BackendError> {
        Err(BackendError::Request("model crashed".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// 고정 응답 요약 클라이언트
#[derive(Debug)]
pub enum StubSummaries {
    Found(Option<String>),
    NotFound,
    Broken(String),
}

#[async_trait]
impl SummaryClient for StubSummaries {
    async fn summary(&self, _topic: &str) -> Result<Option<PageSummary>, ToolError> {
        match self {
            StubSummaries::Found(extract) => Ok(Some(PageSummary {
                extract: extract.clone(),
            })),
            StubSummaries::NotFound => Ok(None),
            StubSummaries::Broken(reason) => Err(ToolError::Lookup(reason.clone())),
        }
    }
}
