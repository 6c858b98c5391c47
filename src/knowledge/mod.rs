//! Knowledge 모듈 - 의약품 RAG 지식 저장소
//!
//! - LanceDB: 청크/QA 벡터 검색 (코사인 거리)
//! - Memory: 테스트용 메모리 인덱스
//! - SQLite: 건강기능식품 제품 레코드 + 적재 이력
//! - Chunker: 문단 누적 텍스트 분할

mod chunker;
mod lance;
mod memory;
mod store;
mod vector;

// Re-exports
pub use chunker::{ChunkConfig, Chunker, ParagraphChunker};
pub use lance::LanceIndex;
pub use memory::MemoryIndex;
pub use store::{HealthFood, KnowledgeStore, LoadRun, NewHealthFood, StoreStats};
pub use vector::{
    cosine_distance, cosine_similarity, escape_sql, l2_normalize, like_pattern, Chunk, ChunkContext,
    ChunkFilter, ChunkIndex, Namespace, QaIndex, QaPair, ScoredChunk, ScoredQa, DRUG_SECTIONS,
    EMBEDDING_DIMENSION, HF_CAUTION, HF_FUNCTION, HF_SECTION_PREFIX, HF_USAGE,
    SECTION_DOSAGE, SECTION_EFFICACY, SECTION_INTERACTION, SECTION_PRECAUTIONS,
    SECTION_SIDE_EFFECT,
};
