//! RAG 모듈 - 의도 분류, 검색, 의도별 답변 생성
//!
//! ## 흐름
//! ```text
//! question → intent → (QA | drug chunks | symptom scan | health food) → builder / LLM
//! ```
//!
//! [`RagPipeline::answer`]가 유일한 공개 진입점이고, 나머지 모듈은
//! 순수 함수(답변 빌더)와 검색기로 나뉩니다.

pub mod answer;
pub mod disease;
pub mod general;
pub mod health_food;
pub mod intent;
mod pipeline;
pub mod retrieval;
pub mod symptom;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use intent::{detect_intent, extract_med_names, Intent};
pub use pipeline::{RagAnswer, RagPipeline};
pub use retrieval::Retriever;
