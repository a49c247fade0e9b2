//! Knowledge Store - 메모리 내 문서 목록 + 벡터 인덱스
//!
//! 문서는 삽입 순서대로 보관되며 위치가 곧 ID입니다. 삭제는 지원하지 않습니다.
//! 시작 시 JSON 문자열 배열 파일에서 한 번 로드되고(없으면 내장 문서 3개),
//! 이후에는 `add_documents`로만 늘어납니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::error::{BackendError, StoreError};

use super::index::FlatL2Index;

/// 지식베이스 파일이 없을 때 사용하는 문서
pub const FALLBACK_DOCUMENTS: [&str; 3] = [
    "Machine learning is a subset of artificial intelligence.",
    "Deep learning uses neural networks with multiple layers.",
    "Science fiction explores futuristic concepts and advanced technology.",
];

// ============================================================================
// Types
// ============================================================================

/// 문서 로드 출처
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeSource {
    /// 파일에서 로드한 문서 수
    File { path: PathBuf, count: usize },
    /// 내장 문서 사용
    Fallback { count: usize },
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub embedding_count: usize,
    pub dimension: Option<usize>,
    pub cached_queries: usize,
    pub total_content_bytes: usize,
}

// ============================================================================
// KnowledgeStore
// ============================================================================

/// 지식 저장소
///
/// `add_documents`는 `&mut self`, `retrieve_context`는 `&self`를 받으므로
/// 인덱스가 커지는 동안 검색이 동시에 실행될 수 없습니다.
pub struct KnowledgeStore {
    documents: Vec<String>,
    index: Option<FlatL2Index>,
    embedder: Arc<dyn EmbeddingProvider>,
    query_cache: Mutex<HashMap<String, Vec<f32>>>,
    top_k: usize,
}

impl KnowledgeStore {
    /// 빈 저장소 생성
    ///
    /// # Arguments
    /// * `embedder` - 임베딩 백엔드 (`NullEmbedding`이면 인덱스 없이 동작)
    /// * `top_k` - 검색 결과 수
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, top_k: usize) -> Self {
        Self {
            documents: Vec::new(),
            index: None,
            embedder,
            query_cache: Mutex::new(HashMap::new()),
            top_k,
        }
    }

    /// 지식베이스 파일 로드 (없으면 내장 문서)
    pub async fn load_or_fallback(
        &mut self,
        path: &Path,
    ) -> Result<KnowledgeSource, StoreError> {
        match load_documents(path)? {
            Some(documents) => {
                let count = self.add_documents(documents).await?;
                tracing::info!("Loaded {} documents from {:?}", count, path);
                Ok(KnowledgeSource::File {
                    path: path.to_path_buf(),
                    count,
                })
            }
            None => {
                tracing::warn!("Knowledge base not found at {:?}. Using fallback docs.", path);
                let count = self.add_documents(FALLBACK_DOCUMENTS).await?;
                Ok(KnowledgeSource::Fallback { count })
            }
        }
    }

    /// 문서 배치 추가
    ///
    /// 빈 배치는 아무것도 하지 않습니다. 임베딩 백엔드가 있으면 배치 전체를
    /// 임베딩한 뒤 문서와 인덱스를 함께 늘립니다. 임베딩이 실패하면
    /// 저장소는 변경되지 않습니다.
    ///
    /// # Returns
    /// 추가된 문서 수
    pub async fn add_documents<I, S>(&mut self, batch: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let batch: Vec<String> = batch.into_iter().map(Into::into).collect();
        if batch.is_empty() {
            return Ok(0);
        }

        if self.embedder.is_available() {
            let embeddings = self.embedder.embed_batch(&batch).await?;
            if embeddings.len() != batch.len() {
                return Err(BackendError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                ))
                .into());
            }

            match self.index.as_mut() {
                Some(index) => index.add(&embeddings)?,
                None => {
                    // 첫 배치의 차원이 세션의 기준 차원이 됨
                    let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
                    if dimension == 0 {
                        return Err(
                            BackendError::InvalidResponse("empty embedding vector".into()).into(),
                        );
                    }
                    let mut index = FlatL2Index::new(dimension);
                    index.add(&embeddings)?;
                    self.index = Some(index);
                }
            }
        }

        let count = batch.len();
        self.documents.extend(batch);
        tracing::debug!(
            "Added {} documents (total={}, indexed={})",
            count,
            self.documents.len(),
            self.embedding_count()
        );

        Ok(count)
    }

    /// 질의와 가까운 문서 최대 top_k개 검색
    ///
    /// 인덱스가 없거나, 저장소가 비었거나, 질의 토큰이 2개 미만이면
    /// 앞에서부터 top_k개를 그대로 반환합니다. 질의 임베딩에 실패해도
    /// 같은 폴백을 사용하므로 이 함수는 실패하지 않습니다.
    pub async fn retrieve_context(&self, query: &str) -> Vec<String> {
        let index = match &self.index {
            Some(index) if !self.documents.is_empty() => index,
            _ => return self.positional(),
        };

        if query.split_whitespace().count() < 2 {
            return self.positional();
        }

        let embedding = match self.query_embedding(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!("Query embedding failed, using positional retrieval: {}", e);
                return self.positional();
            }
        };

        match index.search(&embedding, self.top_k) {
            Ok(neighbors) => neighbors
                .iter()
                .filter_map(|n| self.documents.get(n.position).cloned())
                .collect(),
            Err(e) => {
                tracing::warn!("Vector search failed, using positional retrieval: {}", e);
                self.positional()
            }
        }
    }

    /// 캐시를 확인하고 없으면 임베딩 후 캐시에 저장
    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>, BackendError> {
        let cached = self.cache().get(query).cloned();
        if let Some(cached) = cached {
            tracing::debug!("Query cache hit: {:?}", query);
            return Ok(cached);
        }

        let embedding = self.embedder.embed_query(query).await?;
        self.cache().insert(query.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Vec<f32>>> {
        self.query_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn positional(&self) -> Vec<String> {
        let k = self.top_k.min(self.documents.len());
        self.documents[..k].to_vec()
    }

    /// 저장된 문서 (삽입 순서)
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// 인덱스에 저장된 임베딩 수 (인덱스가 없으면 0)
    pub fn embedding_count(&self) -> usize {
        self.index.as_ref().map(FlatL2Index::len).unwrap_or(0)
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// 세션 기준 임베딩 차원
    pub fn dimension(&self) -> Option<usize> {
        self.index.as_ref().map(FlatL2Index::dimension)
    }

    /// 캐시된 질의 수
    pub fn cached_queries(&self) -> usize {
        self.cache().len()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// 저장소 통계
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            document_count: self.document_count(),
            embedding_count: self.embedding_count(),
            dimension: self.dimension(),
            cached_queries: self.cached_queries(),
            total_content_bytes: self.documents.iter().map(String::len).sum(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// JSON 문자열 배열 파일에서 문서 읽기
///
/// 파일이 없으면 `Ok(None)`, 형식이 잘못되면 에러입니다.
pub fn load_documents(path: &Path) -> Result<Option<Vec<String>>, StoreError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let documents: Vec<String> =
        serde_json::from_str(&raw).map_err(|source| StoreError::Format {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(Some(documents))
}

// ============================================================================
// Tests
// ============================================================================
