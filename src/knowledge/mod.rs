//! Knowledge 모듈 - 메모리 내 지식 저장소
//!
//! - Store: 문서 목록 + 질의 임베딩 캐시 + 위치 기반 폴백
//! - Index: 평면 L2 최근접 이웃 검색 (전수 비교)

mod index;
mod store;

// Re-exports
pub use index::{FlatL2Index, Neighbor};
pub use store::{
    load_documents, KnowledgeSource, KnowledgeStore, StoreStats, FALLBACK_DOCUMENTS,
};
