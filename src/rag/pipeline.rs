//! 질의 파이프라인
//!
//! 의도 분류 → 검색 → 의도별 답변 생성을 묶은 단일 진입점입니다.
//! 내부 단계는 `anyhow::Result`를 쓰고, 여기서 [`RagError`]로 분류합니다.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{RagError, RagResult};
use crate::knowledge::{Chunk, ChunkContext, ScoredChunk};
use crate::llm::TextGenerator;
use crate::text::{clean_output, short};

use super::answer::{
    build_compare_answer, build_dosage_answer, build_efficacy_answer, build_interaction_answer,
    build_side_effect_answer, build_warning_answer, ensure_clinician_line,
};
use super::disease::{extract_disease_topic, postprocess_qa, DiseaseAnswer};
use super::general::{
    empty_generation_fallback, general_instruction, is_greeting, is_hospital_search,
    is_non_medical, GREETING_RESPONSE, HOSPITAL_GUIDE, NON_MEDICAL_RESPONSE,
};
use super::health_food::build_health_food_answer;
use super::intent::{detect_intent, extract_med_names, has_health_food_keyword, Intent};
use super::retrieval::Retriever;
use super::symptom::{build_symptom_answer, recommend_by_symptom};

/// 로그에 남기는 질문 길이
const LOG_QUESTION_CHARS: usize = 80;

// ============================================================================
// Types
// ============================================================================

/// 파이프라인 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    /// 답변 생성에 쓰인 청크 (LLM 단독 답변이면 비어 있음)
    pub contexts: Vec<ChunkContext>,
}

impl RagAnswer {
    fn text(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            contexts: vec![],
        }
    }

    fn with_chunks<'a>(answer: String, chunks: impl IntoIterator<Item = &'a Chunk>) -> Self {
        Self {
            answer,
            contexts: chunks.into_iter().map(ChunkContext::from).collect(),
        }
    }
}

// ============================================================================
// RagPipeline
// ============================================================================

/// 질의 오케스트레이터
pub struct RagPipeline {
    retriever: Retriever,
    generator: Arc<dyn TextGenerator>,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    /// 질문 하나에 답합니다
    pub async fn answer(&self, question: &str) -> RagResult<RagAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput);
        }

        let intent = detect_intent(question);
        tracing::info!(
            "RAG query: intent={}, q='{}'",
            intent,
            short(question, LOG_QUESTION_CHARS)
        );

        let mut result = match intent {
            Intent::General => self.answer_general(question).await?,
            Intent::Compare => self.answer_compare(question).await?,
            Intent::Symptom => self.answer_symptom(question).await?,
            Intent::Efficacy => self.answer_efficacy(question).await?,
            Intent::SideEffect | Intent::Dosage | Intent::Interaction | Intent::Warning => {
                self.answer_section(question, intent).await?
            }
        };

        result.answer = ensure_clinician_line(&result.answer);
        tracing::debug!(
            "RAG answer: intent={}, contexts={}, chars={}",
            intent,
            result.contexts.len(),
            result.answer.chars().count()
        );
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------------

    /// 질병 QA → 고정 안내 → LLM
    async fn answer_general(&self, question: &str) -> RagResult<RagAnswer> {
        if let Some(query) = extract_disease_topic(question) {
            let hits = self
                .retriever
                .retrieve_qa_pairs(question, Some(&query.disease), Some(&query.topic))
                .await
                .map_err(retrieval_error)?;

            if let Some(hit) = hits.first() {
                tracing::debug!(
                    "QA hit: disease={}, topic={}, qa_id={}, dist={:.4}",
                    query.disease,
                    query.topic,
                    hit.pair.qa_id,
                    hit.distance
                );
                return match postprocess_qa(question, &query, &hit.pair.answer) {
                    DiseaseAnswer::Direct(answer) => Ok(RagAnswer::text(answer)),
                    DiseaseAnswer::NeedsLlm(instruction) => {
                        Ok(RagAnswer::text(self.generate(&instruction).await?))
                    }
                };
            }
        }

        self.general_fallback(question, &[]).await
    }

    async fn answer_compare(&self, question: &str) -> RagResult<RagAnswer> {
        let meds = extract_med_names(question);
        let (Some(first), Some(second)) = (meds.first(), meds.get(1)) else {
            return self.general_fallback(question, &[]).await;
        };

        let a = self
            .retriever
            .drug_profile(first)
            .await
            .map_err(retrieval_error)?;
        let b = self
            .retriever
            .drug_profile(second)
            .await
            .map_err(retrieval_error)?;

        let answer = build_compare_answer(&a, &b);
        Ok(RagAnswer::with_chunks(answer, a.chunks().chain(b.chunks())))
    }

    /// 증상 추천 → 건강기능식품 → 일반 답변
    async fn answer_symptom(&self, question: &str) -> RagResult<RagAnswer> {
        let recs = recommend_by_symptom(
            self.retriever.chunk_index(),
            question,
            self.retriever.config().symptom_top_n,
        )
        .await
        .map_err(retrieval_error)?;
        if !recs.is_empty() {
            let answer = build_symptom_answer(question, &recs);
            return Ok(RagAnswer::with_chunks(answer, recs.iter().map(|r| &r.chunk)));
        }

        if let Some(answer) = self.health_food_answer(question).await? {
            return Ok(answer);
        }
        self.general_fallback(question, &[]).await
    }

    /// 건강기능식품 질문이면 그쪽으로, 아니면 약품 청크 → 건강기능식품 → 일반 답변
    async fn answer_efficacy(&self, question: &str) -> RagResult<RagAnswer> {
        if has_health_food_keyword(question) {
            if let Some(answer) = self.health_food_answer(question).await? {
                return Ok(answer);
            }
            return self.general_fallback(question, &[]).await;
        }

        let chunks = self.drug_chunks(question, Intent::Efficacy).await?;
        if !chunks.is_empty() {
            return Ok(RagAnswer::with_chunks(
                build_efficacy_answer(question, &chunks),
                &chunks,
            ));
        }

        if let Some(answer) = self.health_food_answer(question).await? {
            return Ok(answer);
        }
        self.general_fallback(question, &[]).await
    }

    /// 부작용/용법/상호작용/주의사항
    async fn answer_section(&self, question: &str, intent: Intent) -> RagResult<RagAnswer> {
        let chunks = self.drug_chunks(question, intent).await?;
        if chunks.is_empty() {
            return self.general_fallback(question, &chunks).await;
        }

        let answer = match intent {
            Intent::SideEffect => build_side_effect_answer(question, &chunks),
            Intent::Dosage => build_dosage_answer(question, &chunks),
            Intent::Interaction => build_interaction_answer(question, &chunks),
            _ => build_warning_answer(question, &chunks),
        };
        Ok(RagAnswer::with_chunks(answer, &chunks))
    }

    // ------------------------------------------------------------------------
    // Shared steps
    // ------------------------------------------------------------------------

    async fn drug_chunks(&self, question: &str, intent: Intent) -> RagResult<Vec<Chunk>> {
        let scored: Vec<ScoredChunk> = self
            .retriever
            .retrieve_top_chunks(question, intent)
            .await
            .map_err(retrieval_error)?;
        Ok(scored.into_iter().map(|s| s.chunk).collect())
    }

    async fn health_food_answer(&self, question: &str) -> RagResult<Option<RagAnswer>> {
        let chunks = self
            .retriever
            .search_health_food_chunks(question)
            .await
            .map_err(retrieval_error)?;
        if chunks.is_empty() {
            return Ok(None);
        }

        let products = self
            .retriever
            .health_food_products(&chunks)
            .await
            .map_err(retrieval_error)?;
        let answer = build_health_food_answer(&products);
        Ok(Some(RagAnswer::with_chunks(
            answer,
            chunks.iter().map(|c| &c.chunk),
        )))
    }

    /// 병원 검색 / 인사 / 비의료 질문은 고정 문구, 나머지는 LLM
    async fn general_fallback(&self, question: &str, chunks: &[Chunk]) -> RagResult<RagAnswer> {
        if is_hospital_search(question) {
            return Ok(RagAnswer::text(HOSPITAL_GUIDE));
        }
        if is_greeting(question) {
            return Ok(RagAnswer::text(GREETING_RESPONSE));
        }
        if is_non_medical(question) {
            return Ok(RagAnswer::text(NON_MEDICAL_RESPONSE));
        }

        let answer = self
            .generate(&general_instruction(question, chunks))
            .await?;
        Ok(RagAnswer::with_chunks(answer, chunks))
    }

    /// LLM 호출 + 출력 정리
    async fn generate(&self, instruction: &str) -> RagResult<String> {
        let raw = self
            .generator
            .generate(instruction)
            .await
            .map_err(|e| classify(e, RagError::Generation))?;

        let cleaned = clean_output(&raw);
        if cleaned.is_empty() {
            tracing::warn!("{} returned an empty answer", self.generator.name());
            return Ok(empty_generation_fallback());
        }
        Ok(cleaned)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 이미 분류된 에러는 그대로, 아니면 `wrap`으로 감쌉니다
fn classify(err: anyhow::Error, wrap: fn(anyhow::Error) -> RagError) -> RagError {
    let err = match err.downcast::<RagError>() {
        Ok(rag) => rag,
        Err(other) => wrap(other),
    };
    tracing::error!("RAG pipeline failed ({}): {:?}", err.kind(), err);
    err
}

fn retrieval_error(err: anyhow::Error) -> RagError {
    classify(err, RagError::Retrieval)
}

// ============================================================================
// Tests
// ============================================================================
