//! Flat L2 Index - 전수 비교 최근접 이웃 검색
//!
//! 모든 문서 임베딩을 하나의 행 우선(row-major) 행렬로 보관하고
//! 질의마다 제곱 유클리드 거리를 전부 계산합니다.

use crate::error::BackendError;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 (문서 위치 + 거리)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 지식 저장소 내 문서 위치
    pub position: usize,
    /// 제곱 L2 거리 (작을수록 가까움)
    pub distance: f32,
}

// ============================================================================
// FlatL2Index
// ============================================================================

/// 메모리 내 flat 인덱스
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dimension: usize,
    vectors: Vec<f32>,
}

impl FlatL2Index {
    /// 빈 인덱스 생성
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// 벡터 차원
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 저장된 벡터 수
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// 차원 검증 (인덱스는 변경하지 않음)
    pub fn check(&self, embeddings: &[Vec<f32>]) -> Result<(), BackendError> {
        match embeddings.iter().find(|e| e.len() != self.dimension) {
            Some(bad) => Err(BackendError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            }),
            None => Ok(()),
        }
    }

    /// 벡터 배치 추가
    ///
    /// 하나라도 차원이 다르면 아무것도 추가하지 않고 에러를 반환합니다.
    pub fn add(&mut self, embeddings: &[Vec<f32>]) -> Result<(), BackendError> {
        self.check(embeddings)?;
        self.vectors.reserve(embeddings.len() * self.dimension);
        for embedding in embeddings {
            self.vectors.extend_from_slice(embedding);
        }
        Ok(())
    }

    /// k개 최근접 이웃 검색
    ///
    /// `k`는 저장된 벡터 수로 잘립니다. 결과는 거리 오름차순이며,
    /// 거리가 같으면 먼저 추가된 위치가 앞에 옵니다.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, BackendError> {
        if query.len() != self.dimension {
            return Err(BackendError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: squared_l2(row, query),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }
}

/// 제곱 유클리드 거리
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

// ============================================================================
// Tests
// ============================================================================
