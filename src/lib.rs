//! smartmed-rag - 의약품 설명서 기반 RAG 코어
//!
//! 의약품 설명서, 건강기능식품, 질병 QA 데이터를 LanceDB 에 적재하고
//! 질문 의도에 따라 규칙 기반 답변 또는 로컬 LLM 답변을 만듭니다.
//! HTTP API 는 동기 질의와 task_id 기반 비동기 질의를 모두 지원합니다.

pub mod api;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod loader;
pub mod rag;
pub mod tasks;
pub mod text;

// Re-exports
pub use config::{LlmConfig, RagConfig, RetrievalConfig, ServerConfig};
pub use embedding::{EmbeddingProvider, MiniLmEmbedding};
pub use error::{RagError, RagResult};
pub use knowledge::{
    Chunk, ChunkContext, ChunkIndex, KnowledgeStore, LanceIndex, MemoryIndex, Namespace, QaIndex,
    QaPair,
};
pub use llm::{QwenGenerator, TextGenerator};
pub use loader::LoadReport;
pub use rag::{detect_intent, Intent, RagAnswer, RagPipeline, Retriever};
pub use tasks::{TaskQueue, TaskState, TaskStatus};
