//! In-memory 인덱스
//!
//! 테스트용 인덱스입니다. namespace 교체는
//! `Arc` 스냅샷을 바꿔 끼우는 방식이라 검색 중인 독자는 이전 스냅샷을 그대로 봅니다.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use super::vector::{
    cosine_distance, Chunk, ChunkFilter, ChunkIndex, Namespace, QaIndex, QaPair, ScoredChunk,
    ScoredQa,
};

/// 메모리 기반 청크 + QA 인덱스
#[derive(Default)]
pub struct MemoryIndex {
    chunks: RwLock<HashMap<Namespace, Arc<Vec<Chunk>>>>,
    qa_pairs: RwLock<Arc<Vec<QaPair>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, namespace: Namespace) -> Result<Arc<Vec<Chunk>>> {
        let map = self
            .chunks
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(map.get(&namespace).cloned().unwrap_or_default())
    }

    fn qa_snapshot(&self) -> Result<Arc<Vec<QaPair>>> {
        let guard = self
            .qa_pairs
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(Arc::clone(&guard))
    }
}

#[async_trait]
impl ChunkIndex for MemoryIndex {
    async fn replace_namespace(
        &self,
        namespace: Namespace,
        chunks: Vec<Chunk>,
        _batch_size: usize,
    ) -> Result<usize> {
        let count = chunks.len();
        let mut map = self
            .chunks
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        map.insert(namespace, Arc::new(chunks));
        Ok(count)
    }

    async fn search(
        &self,
        namespace: Namespace,
        query_embedding: &[f32],
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let snapshot = self.snapshot(namespace)?;

        let mut scored: Vec<ScoredChunk> = snapshot
            .iter()
            .filter(|c| filter.matches(c))
            .map(|c| ScoredChunk {
                distance: cosine_distance(query_embedding, &c.embedding),
                chunk: c.clone(),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn scan(
        &self,
        namespace: Namespace,
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let snapshot = self.snapshot(namespace)?;

        let mut rows: Vec<Chunk> = snapshot
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            a.item_name
                .cmp(&b.item_name)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn count(&self, namespace: Namespace) -> Result<usize> {
        Ok(self.snapshot(namespace)?.len())
    }
}

#[async_trait]
impl QaIndex for MemoryIndex {
    async fn replace_pairs(&self, pairs: Vec<QaPair>, _batch_size: usize) -> Result<usize> {
        let count = pairs.len();
        let mut guard = self
            .qa_pairs
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        *guard = Arc::new(pairs);
        Ok(count)
    }

    async fn search_pairs(
        &self,
        query_embedding: &[f32],
        keyword: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredQa>> {
        let snapshot = self.qa_snapshot()?;

        let mut scored: Vec<ScoredQa> = snapshot
            .iter()
            .filter(|p| match keyword {
                Some(k) => p.question.contains(k) || p.answer.contains(k),
                None => true,
            })
            .map(|p| ScoredQa {
                distance: cosine_distance(query_embedding, &p.embedding),
                pair: p.clone(),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count_pairs(&self) -> Result<usize> {
        Ok(self.qa_snapshot()?.len())
    }
}

// ============================================================================
// Tests
// ============================================================================
