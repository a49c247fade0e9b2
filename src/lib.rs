//! rag-transformer - 도구 보강 RAG 어시스턴트
//!
//! 메모리 내 문서 저장소에서 평면 L2 검색으로 문맥을 찾고,
//! 생성 모델이 계산기/백과사전/시계 도구를 호출할 수 있는
//! 제한된 반복 루프로 답변을 만듭니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod knowledge;
pub mod tools;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::Config;
pub use embedding::{create_embedder, EmbeddingProvider, GeminiEmbedding, NullEmbedding};
pub use engine::{route, RagEngine, Route};
pub use error::{BackendError, EngineError, StoreError};
pub use generation::{
    create_generator, GeminiGenerator, GenerationParams, NullGenerator, TextGenerator,
};
pub use knowledge::{FlatL2Index, KnowledgeSource, KnowledgeStore, StoreStats};
pub use tools::{ToolCommand, ToolError, ToolExecutor, WikipediaClient};
