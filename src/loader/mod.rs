//! Loader 모듈 - 원본 JSON/JSONL 을 임베딩해 인덱스에 적재
//!
//! - `drug`: 의약품 설명서 JSON → 섹션별 청크
//! - `health_food`: 건강기능식품 JSON → SQLite 제품 + hf_* 청크
//! - `qa`: 질병 QA JSONL → QA 쌍
//!
//! 모든 로더는 인덱스를 건드리기 전에 원본 파일을 끝까지 읽고 임베딩하며,
//! namespace 교체는 한 번에 일어납니다.

mod drug;
mod health_food;
mod qa;

pub use drug::{build_drug_chunks, load_drugs, DrugRecord};
pub use health_food::{load_health_foods, HealthFoodRecord};
pub use qa::load_qa_pairs;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingProvider;
use crate::error::RagError;

/// 한 번에 임베딩하는 텍스트 수
const EMBED_BATCH: usize = 256;

/// 로더 실행 결과
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub namespace: String,
    /// 적재된 행 수 (청크 또는 QA 쌍)
    pub rows: usize,
    /// 형식 오류로 건너뛴 레코드 수
    pub skipped: usize,
    pub source_sha256: String,
    pub run_id: i64,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 원본 파일 읽기 + SHA-256 (파일이 없으면 `ResourceMissing`)
fn read_source(path: &Path) -> Result<(Vec<u8>, String)> {
    if !path.is_file() {
        return Err(RagError::ResourceMissing(path.display().to_string()).into());
    }
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let digest = format!("{:x}", Sha256::digest(&bytes));
    Ok((bytes, digest))
}

/// JSON 배열의 각 원소를 `T`로 변환 (실패한 원소는 경고 후 건너뜀)
fn parse_records<T: serde::de::DeserializeOwned>(bytes: &[u8], path: &Path) -> Result<(Vec<T>, usize)> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(bytes)
        .with_context(|| format!("Expected a JSON array in {:?}", path))?;

    let mut records = Vec::with_capacity(values.len());
    let mut skipped = 0;
    for (i, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<T>(value) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Skipping record {} in {:?}: {}", i, path, e);
                skipped += 1;
            }
        }
    }
    Ok((records, skipped))
}

/// 텍스트 목록을 배치로 임베딩
async fn embed_all(embedder: &dyn EmbeddingProvider, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(EMBED_BATCH) {
        vectors.extend(
            embedder
                .embed_batch(batch)
                .await
                .context("Failed to embed loader batch")?,
        );
        tracing::info!("Embedded {}/{} texts", vectors.len(), texts.len());
    }
    Ok(vectors)
}

/// 앞뒤 공백 제거 후 비었으면 None
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_source_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_source(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::ResourceMissing(_))
        ));
    }

    #[test]
    fn test_read_source_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.json");
        std::fs::write(&path, b"abc").unwrap();

        let (bytes, sha) = read_source(&path).unwrap();
        assert_eq!(bytes, b"abc");
        assert_eq!(
            sha,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  a ".to_string())), Some("a".to_string()));
        assert_eq!(non_empty(Some("   ".to_string())), None);
        assert_eq!(non_empty(None), None);
    }
}
