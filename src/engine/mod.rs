//! RAG 엔진 - 분류, 검색, 도구 보강 생성 루프
//!
//! ```text
//! query → route()
//!   ├─ Greeting   → 고정 인사말
//!   ├─ Tool       → ToolExecutor
//!   ├─ Calculate  → ToolExecutor (CALC:)
//!   └─ Retrieve   → KnowledgeStore.retrieve_context → 생성 루프 (최대 max_iterations회)
//! ```
//!
//! 생성 루프에는 내부 취소 지점이 없습니다. 시간 제한이 필요하면 호출자가
//! `generate_response` 전체를 `tokio::time::timeout`으로 감싸야 합니다.

mod router;

use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_embedder, NullEmbedding};
use crate::error::{BackendError, EngineError, StoreError};
use crate::generation::{create_generator, GenerationParams, TextGenerator};
use crate::knowledge::{KnowledgeSource, KnowledgeStore};
use crate::tools::{is_tool_call, ToolExecutor, WikipediaClient};

pub use router::{normalize_query, route, Route};

/// 인사 응답
pub const GREETING_RESPONSE: &str = "Hello! I'm an agentic AI assistant with knowledge about \
     machine learning, sci-fi movies, and cosmos. I can use tools like calculations. \
     How can I help you today?";

/// 생성기도 검색 결과도 없을 때
pub const NO_RESPONSE: &str = "No response available.";

/// 생성 결과가 너무 짧을 때
pub const LOW_CONFIDENCE_RESPONSE: &str = "I couldn't generate a detailed response. \
     Please rephrase your query about machine learning, sci-fi movies, or cosmos.";

/// 생성기가 계속 도구만 호출해 반복 횟수를 모두 소진했을 때
pub const TOOLS_EXHAUSTED_RESPONSE: &str =
    "I used tools but couldn't finalize a response. Try a different query.";

/// 최종 답변으로 인정하는 최소 단어 수
const MIN_ANSWER_WORDS: usize = 3;

// ============================================================================
// RagEngine
// ============================================================================

/// RAG 엔진
pub struct RagEngine {
    store: KnowledgeStore,
    tools: ToolExecutor,
    generator: Arc<dyn TextGenerator>,
    params: GenerationParams,
    max_iterations: usize,
}

impl RagEngine {
    /// 구성 요소를 직접 지정하여 생성
    pub fn new(
        store: KnowledgeStore,
        tools: ToolExecutor,
        generator: Arc<dyn TextGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            tools,
            generator,
            params: GenerationParams::from_config(config),
            max_iterations: config.max_iterations,
        }
    }

    /// 설정으로 백엔드를 선택하고 지식베이스를 로드
    ///
    /// 임베딩/생성 백엔드를 사용할 수 없으면 null 구현으로 대체됩니다.
    pub async fn from_config(config: &Config) -> Result<Self, EngineError> {
        let embedder = create_embedder(config);
        let generator = create_generator(config);
        let tools = ToolExecutor::new(Arc::new(WikipediaClient::new(config.lookup_timeout)?));

        let mut engine = Self::new(
            KnowledgeStore::new(embedder, config.top_k),
            tools,
            generator,
            config,
        );
        engine.load_knowledge_base(config).await?;

        Ok(engine)
    }

    /// 설정된 경로에서 지식베이스 로드
    ///
    /// 초기 로드 중 임베딩 백엔드가 실패하면 경고를 남기고
    /// `NullEmbedding` 저장소로 다시 로드합니다 (위치 기반 검색).
    pub async fn load_knowledge_base(
        &mut self,
        config: &Config,
    ) -> Result<KnowledgeSource, StoreError> {
        let path = config.knowledge_base_path();

        match self.store.load_or_fallback(&path).await {
            Err(StoreError::Backend(e)) => {
                tracing::warn!(
                    "Embedding backend failed while loading, using positional retrieval: {}",
                    e
                );
                let top_k = self.store.top_k();
                self.store = KnowledgeStore::new(Arc::new(NullEmbedding), top_k);
                self.store.load_or_fallback(&path).await
            }
            result => result,
        }
    }

    /// 문서 추가
    pub async fn add_documents<I, S>(&mut self, documents: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store.add_documents(documents).await
    }

    /// 질의 관련 문서 검색
    pub async fn retrieve_context(&self, query: &str) -> Vec<String> {
        self.store.retrieve_context(query).await
    }

    /// 질의 응답 생성
    ///
    /// 도구 실패와 검색 실패는 응답 문자열로 흡수됩니다.
    /// 생성 백엔드 에러만 호출자에게 전달됩니다.
    pub async fn generate_response(&self, query: &str) -> Result<String, BackendError> {
        match route(query) {
            Route::Greeting => Ok(GREETING_RESPONSE.to_string()),
            Route::Tool(call) => Ok(self.tools.execute_tool(&call).await),
            Route::Calculate(expr) => {
                tracing::debug!("Inferred arithmetic: {:?}", expr);
                Ok(self.tools.execute_tool(&format!("CALC: {}", expr)).await)
            }
            Route::Retrieve(question) => self.answer(&question).await,
        }
    }

    /// 검색 + 도구 보강 생성 루프
    async fn answer(&self, question: &str) -> Result<String, BackendError> {
        let context_docs = self.store.retrieve_context(question).await;

        if !self.generator.is_available() {
            return Ok(context_docs
                .into_iter()
                .next()
                .unwrap_or_else(|| NO_RESPONSE.to_string()));
        }

        let mut context = context_docs.join(" ");

        for iteration in 0..self.max_iterations {
            let prompt = build_prompt(&context, self.tools.available_tools(), question);
            let response = self.generator.generate(&prompt, &self.params).await?;
            let response = response.trim();

            if is_tool_call(response) {
                let tool_result = self.tools.execute_tool(response).await;
                tracing::debug!(
                    "Iteration {}: generator requested {:?} -> {:?}",
                    iteration + 1,
                    response,
                    tool_result
                );
                context.push_str("\nTool result: ");
                context.push_str(&tool_result);
                continue;
            }

            if response.split_whitespace().count() < MIN_ANSWER_WORDS {
                tracing::debug!("Low-confidence generation: {:?}", response);
                return Ok(LOW_CONFIDENCE_RESPONSE.to_string());
            }

            return Ok(response.to_string());
        }

        tracing::warn!(
            "Generator kept requesting tools for {} iterations",
            self.max_iterations
        );
        Ok(TOOLS_EXHAUSTED_RESPONSE.to_string())
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    /// 생성 백엔드 사용 가능 여부
    pub fn has_generator(&self) -> bool {
        self.generator.is_available()
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }
}

/// 생성기 입력 프롬프트
pub fn build_prompt(context: &str, tools: &str, question: &str) -> String {
    format!(
        "Context information: {context}\n\n\
         {tools}\n\n\
         Question: {question}\n\n\
         Answer the question using the context. If you need external\n\
         information, use a tool by responding with the tool\n\
         command. Otherwise, provide a direct answer."
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::generation::NullGenerator;
    use crate::knowledge::FALLBACK_DOCUMENTS;
    use crate::testing::{
        FailingEmbedder, FailingGenerator, LetterEmbedder, ScriptedGenerator, StubSummaries,
    };

    fn test_config(top_k: usize, max_iterations: usize) -> Config {
        Config {
            top_k,
            max_iterations,
            ..Config::default()
        }
    }

    fn stub_tools() -> ToolExecutor {
        ToolExecutor::new(Arc::new(StubSummaries::Found(Some("A planet.".into()))))
    }

    fn engine_with_backends(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
        tools: ToolExecutor,
    ) -> RagEngine {
        RagEngine::new(
            KnowledgeStore::new(embedder, config.top_k),
            tools,
            generator,
            config,
        )
    }

    async fn engine_with(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
        max_iterations: usize,
    ) -> RagEngine {
        let config = test_config(2, max_iterations);
        let mut engine = engine_with_backends(&config, embedder, generator, stub_tools());
        engine.add_documents(FALLBACK_DOCUMENTS).await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_greeting_skips_retrieval_and_generation() {
        let embedder = Arc::new(LetterEmbedder::default());
        let generator = Arc::new(ScriptedGenerator::new(["should not be used"]));
        let engine = engine_with(embedder.clone(), generator.clone(), 3).await;
        let embed_calls = embedder.calls();

        for query in ["hi", "Hello there", "HEY what is up", "greetings friend", "'hello'"] {
            assert_eq!(engine.generate_response(query).await.unwrap(), GREETING_RESPONSE);
        }

        assert_eq!(generator.calls(), 0);
        assert_eq!(embedder.calls(), embed_calls);
        assert_eq!(engine.store().cached_queries(), 0);
    }

    #[tokio::test]
    async fn test_tool_prefix_delegates_verbatim() {
        let generator = Arc::new(ScriptedGenerator::new(["unused answer here"]));
        let engine = engine_with(Arc::new(LetterEmbedder::default()), generator.clone(), 3).await;

        for query in ["CALC: 2 + 3", "calc: sqrt(4)", "WIKI: Mars", "CALC: import os"] {
            let expected = engine.tools().execute_tool(query).await;
            assert_eq!(engine.generate_response(query).await.unwrap(), expected);
        }
        assert_eq!(
            engine.generate_response("CALC: 2 + 3").await.unwrap(),
            "Calculation result: 5"
        );
        assert!(engine
            .generate_response("time: now")
            .await
            .unwrap()
            .starts_with("Current date and time:"));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_inferred_arithmetic() {
        let engine = engine_with(
            Arc::new(LetterEmbedder::default()),
            Arc::new(NullGenerator),
            3,
        )
        .await;

        assert_eq!(
            engine.generate_response("calculate 2+3").await.unwrap(),
            "Calculation result: 5"
        );
        assert_eq!(
            engine.generate_response("What is 12 * 3?").await.unwrap(),
            "Calculation result: 36"
        );

        let nested = format!("calculate {}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(
            engine.generate_response(&nested).await.unwrap(),
            "Invalid calculation: expression is too deeply nested"
        );
    }

    #[tokio::test]
    async fn test_failing_embedder_degrades_to_positional() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            dataset_dir: dir.path().to_path_buf(),
            ..test_config(2, 3)
        };
        let mut engine = engine_with_backends(
            &config,
            Arc::new(FailingEmbedder),
            Arc::new(NullGenerator),
            stub_tools(),
        );

        let source = engine.load_knowledge_base(&config).await.unwrap();

        assert_eq!(source, KnowledgeSource::Fallback { count: 3 });
        assert_eq!(engine.store().document_count(), 3);
        assert!(!engine.store().has_index());
        assert_eq!(
            engine.retrieve_context("what is machine learning").await,
            FALLBACK_DOCUMENTS[..2].to_vec()
        );
        assert_eq!(
            engine.generate_response("what is machine learning").await.unwrap(),
            FALLBACK_DOCUMENTS[0]
        );
    }

    #[tokio::test]
    async fn test_failing_embedder_with_knowledge_base_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            dataset_dir: dir.path().to_path_buf(),
            ..test_config(3, 3)
        };
        std::fs::write(
            config.knowledge_base_path(),
            r#"["Saturn has rings.", "Mars is red."]"#,
        )
        .unwrap();
        let mut engine = engine_with_backends(
            &config,
            Arc::new(FailingEmbedder),
            Arc::new(NullGenerator),
            stub_tools(),
        );

        let source = engine.load_knowledge_base(&config).await.unwrap();

        assert!(matches!(source, KnowledgeSource::File { count: 2, .. }));
        assert_eq!(engine.store().documents(), ["Saturn has rings.", "Mars is red."]);
    }

    #[tokio::test]
    async fn test_without_generator_returns_best_document() {
        let engine = engine_with(Arc::new(NullEmbedding), Arc::new(NullGenerator), 3).await;
        assert_eq!(
            engine.generate_response("tell me about science").await.unwrap(),
            FALLBACK_DOCUMENTS[0]
        );
    }

    #[tokio::test]
    async fn test_without_generator_or_documents() {
        let config = test_config(3, 3);
        let engine = engine_with_backends(
            &config,
            Arc::new(NullEmbedding),
            Arc::new(NullGenerator),
            stub_tools(),
        );
        assert_eq!(
            engine.generate_response("what is deep learning").await.unwrap(),
            NO_RESPONSE
        );
    }

    #[tokio::test]
    async fn test_final_answer_is_returned() {
        let generator = Arc::new(ScriptedGenerator::new([
            "Deep learning stacks many neural network layers.",
        ]));
        let engine = engine_with(Arc::new(LetterEmbedder::default()), generator.clone(), 3).await;

        let answer = engine.generate_response("what is deep learning").await.unwrap();

        assert_eq!(answer, "Deep learning stacks many neural network layers.");
        assert_eq!(generator.calls(), 1);
        let prompt = &generator.prompts()[0];
        assert!(prompt.starts_with("Context information: "));
        assert!(prompt.contains("Available tools:"));
        assert!(prompt.contains("Question: what is deep learning"));
    }

    #[tokio::test]
    async fn test_short_answer_is_low_confidence() {
        for response in ["", "Yes.", "  two words  "] {
            let generator = Arc::new(ScriptedGenerator::new([response]));
            let engine = engine_with(Arc::new(LetterEmbedder::default()), generator, 3).await;
            assert_eq!(
                engine.generate_response("explain neural networks").await.unwrap(),
                LOW_CONFIDENCE_RESPONSE
            );
        }
    }

    #[tokio::test]
    async fn test_tool_result_is_fed_back() {
        let generator = Arc::new(ScriptedGenerator::new([
            "CALC: 6 * 7",
            "The answer to everything is 42.",
        ]));
        let engine = engine_with(Arc::new(LetterEmbedder::default()), generator.clone(), 3).await;

        let answer = engine.generate_response("what is six times seven").await.unwrap();

        assert_eq!(answer, "The answer to everything is 42.");
        assert_eq!(generator.calls(), 2);
        let prompts = generator.prompts();
        assert!(!prompts[0].contains("Tool result:"));
        assert!(prompts[1].contains("\nTool result: Calculation result: 42"));
    }

    #[tokio::test]
    async fn test_tool_loop_terminates() {
        let generator = Arc::new(ScriptedGenerator::new(["WIKI: Mars"]));
        let engine = engine_with(Arc::new(LetterEmbedder::default()), generator.clone(), 3).await;

        let answer = engine.generate_response("tell me about mars").await.unwrap();

        assert_eq!(answer, TOOLS_EXHAUSTED_RESPONSE);
        assert_eq!(generator.calls(), 3);
        assert_eq!(
            generator.prompts()[2]
                .matches("Tool result: Wikipedia summary for 'Mars': A planet.")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_zero_iterations() {
        let generator = Arc::new(ScriptedGenerator::new(["never called"]));
        let engine = engine_with(Arc::new(LetterEmbedder::default()), generator.clone(), 0).await;

        assert_eq!(
            engine.generate_response("anything goes here").await.unwrap(),
            TOOLS_EXHAUSTED_RESPONSE
        );
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_generator_error_propagates() {
        let engine = engine_with(
            Arc::new(LetterEmbedder::default()),
            Arc::new(FailingGenerator),
            3,
        )
        .await;

        let result = engine.generate_response("what is machine learning").await;
        assert!(matches!(result, Err(BackendError::Request(_))));
    }

    #[tokio::test]
    async fn test_from_config_without_api_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            dataset_dir: dir.path().to_path_buf(),
            ..Config::default()
        };

        let engine = RagEngine::from_config(&config).await.unwrap();

        assert!(!engine.has_generator());
        assert!(!engine.store().has_index());
        assert_eq!(engine.store().document_count(), 3);
        assert_eq!(
            engine.generate_response("what is machine learning").await.unwrap(),
            FALLBACK_DOCUMENTS[0]
        );
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt("ctx", "tools", "why?");
        assert!(prompt.starts_with("Context information: ctx\n\ntools\n\nQuestion: why?\n\n"));
        assert!(prompt.ends_with("Otherwise, provide a direct answer."));
    }
}
