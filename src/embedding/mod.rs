//! 임베딩 모듈 - 로컬 문장 임베딩 (all-MiniLM-L6-v2)
//!
//! fastembed(ONNX Runtime)로 384차원 벡터를 만듭니다.
//! 모델은 첫 호출에서 한 번만 로드되고 이후 재사용됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = MiniLmEmbedding::new(cache_dir);
//! let embedding = embedder.embed("타이레놀 부작용").await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;

use crate::knowledge::{l2_normalize, EMBEDDING_DIMENSION};
use crate::text::collapse_whitespace;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 L2 정규화된 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// MiniLM Embedding
// ============================================================================

/// fastembed 배치 크기
const FASTEMBED_BATCH: usize = 64;

/// all-MiniLM-L6-v2 임베딩 구현체
///
/// 모델 핸들은 `OnceCell` 안에서 한 번만 초기화되므로
/// 동시에 들어온 첫 호출들이 가중치를 중복 로드하지 않습니다.
pub struct MiniLmEmbedding {
    cache_dir: PathBuf,
    model: OnceCell<Arc<TextEmbedding>>,
}

impl MiniLmEmbedding {
    /// 새 인스턴스 생성 (모델 로드는 첫 호출 시)
    ///
    /// # Arguments
    /// * `cache_dir` - ONNX 모델 캐시 디렉토리
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            model: OnceCell::new(),
        }
    }

    /// 모델 핸들 (최초 1회 로드)
    async fn model(&self) -> Result<Arc<TextEmbedding>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let cache_dir = self.cache_dir.clone();
                tracing::info!("Loading embedding model (cache: {:?})", cache_dir);

                let model = tokio::task::spawn_blocking(move || {
                    let mut options = InitOptions::default();
                    options.model_name = EmbeddingModel::AllMiniLML6V2;
                    options.cache_dir = cache_dir;
                    options.show_download_progress = false;
                    TextEmbedding::try_new(options)
                })
                .await
                .context("Embedding model loader task failed")?
                .context("Failed to load all-MiniLM-L6-v2")?;

                Ok::<_, anyhow::Error>(Arc::new(model))
            })
            .await?;
        Ok(Arc::clone(model))
    }

    /// 모델을 미리 로드
    pub async fn warmup(&self) -> Result<()> {
        self.model().await.map(|_| ())
    }
}

#[async_trait]
impl EmbeddingProvider for MiniLmEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding model returned no vector"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let model = self.model().await?;
        let inputs: Vec<String> = texts.iter().map(|t| collapse_whitespace(t)).collect();

        let raw = tokio::task::spawn_blocking(move || model.embed(inputs, Some(FASTEMBED_BATCH)))
            .await
            .context("Embedding task failed")?
            .context("Embedding generation failed")?;

        raw.into_iter()
            .map(|v| {
                if v.len() != EMBEDDING_DIMENSION as usize {
                    anyhow::bail!(
                        "Unexpected embedding dimension: expected {}, got {}",
                        EMBEDDING_DIMENSION,
                        v.len()
                    );
                }
                Ok(l2_normalize(v))
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION as usize
    }

    fn name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }
}

// ============================================================================
// Tests
// ============================================================================
