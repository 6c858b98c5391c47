//! 검색기
//!
//! 의약품 청크, 질병 QA, 건강기능식품 청크를 임베딩 거리로 찾고
//! 필터/거리 컷오프를 적용합니다.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{
    ChunkFilter, ChunkIndex, Namespace, QaIndex, ScoredChunk, ScoredQa, HF_FUNCTION,
    HF_SECTION_PREFIX,
};
use crate::text::normalize;

use super::answer::DrugProfile;
use super::health_food::{backfill_products, collect_products, extract_specific_keywords, HealthFoodProduct};
use super::intent::{extract_med_names, Intent};

/// 비교 시 후보 제품을 고르기 위해 훑는 최대 청크 수
const PROFILE_SCAN_LIMIT: usize = 50;

// ============================================================================
// Retriever
// ============================================================================

/// 인덱스 + 임베딩 묶음
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    chunks: Arc<dyn ChunkIndex>,
    qa: Arc<dyn QaIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        chunks: Arc<dyn ChunkIndex>,
        qa: Arc<dyn QaIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            chunks,
            qa,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// 청크 인덱스 (증상 추천의 전체 스캔용)
    pub fn chunk_index(&self) -> &dyn ChunkIndex {
        self.chunks.as_ref()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(text)
            .await
            .context("Failed to embed query")
    }

    // ------------------------------------------------------------------------
    // Drug chunks
    // ------------------------------------------------------------------------

    /// 의도별 의약품 청크 검색
    ///
    /// - `General`은 항상 빈 결과
    /// - 약품명이 있으면 item_name 필터를 걸고, 결과가 없으면 필터 없이 재검색
    /// - 약품명이 없고 최상위 거리가 컷오프를 넘으면 빈 결과
    pub async fn retrieve_top_chunks(
        &self,
        question: &str,
        intent: Intent,
    ) -> Result<Vec<ScoredChunk>> {
        if intent == Intent::General {
            return Ok(vec![]);
        }

        let embedding = self.embed(question).await?;
        let meds = extract_med_names(question);
        let base = ChunkFilter::new().sections(intent.section_filter().iter().copied());
        let k = self.config.drug_top_k;

        let mut chunks = Vec::new();
        if !meds.is_empty() {
            let named = base.clone().item_names(meds.iter().cloned());
            chunks = self
                .chunks
                .search(Namespace::Drug, &embedding, &named, k)
                .await?;
        }
        if chunks.is_empty() {
            chunks = self
                .chunks
                .search(Namespace::Drug, &embedding, &base, k)
                .await?;
        }

        if let Some(first) = meds.first() {
            chunks = prioritize_base_brand(first, chunks);
        }

        let Some(top) = chunks.first() else {
            tracing::debug!("No drug chunks (intent={}, meds={:?})", intent, meds);
            return Ok(vec![]);
        };
        tracing::debug!(
            "Drug chunks: intent={}, meds={:?}, top_k={}, first_dist={:.4}",
            intent,
            meds,
            chunks.len(),
            top.distance
        );

        if meds.is_empty() && top.distance > self.config.drug_max_distance {
            tracing::debug!(
                "Drug chunks dropped: distance {:.4} > {}",
                top.distance,
                self.config.drug_max_distance
            );
            return Ok(vec![]);
        }

        Ok(chunks)
    }

    /// 비교용 약품 요약 조회
    ///
    /// 약 이름을 포함하는 제품 중 이름이 그 약으로 시작하는 제품을 우선 고르고,
    /// 그 제품의 섹션별 첫 청크를 가져옵니다.
    pub async fn drug_profile(&self, med: &str) -> Result<DrugProfile> {
        let mut profile = DrugProfile::new(med);

        let mut candidates = self
            .chunks
            .scan(
                Namespace::Drug,
                &ChunkFilter::new().item_names([med]).sections(["효능"]),
                PROFILE_SCAN_LIMIT,
            )
            .await?;
        if candidates.is_empty() {
            candidates = self
                .chunks
                .scan(
                    Namespace::Drug,
                    &ChunkFilter::new().item_names([med]),
                    PROFILE_SCAN_LIMIT,
                )
                .await?;
        }

        let Some(item_name) = pick_product_name(med, candidates.iter().map(|c| c.item_name.as_str()))
        else {
            tracing::debug!("No product found for {}", med);
            return Ok(profile);
        };

        let section_of = |sections: &'static [&'static str]| {
            ChunkFilter::new()
                .exact_items([item_name.clone()])
                .sections(sections.iter().copied())
        };
        profile.efficacy = self.first_chunk(&section_of(&["효능"])).await?;
        profile.side_effect = self.first_chunk(&section_of(&["부작용", "이상반응"])).await?;
        profile.dosage = self.first_chunk(&section_of(&["용법", "용량"])).await?;
        profile.caution = self.first_chunk(&section_of(&["주의", "경고"])).await?;
        profile.item_name = Some(item_name);

        Ok(profile)
    }

    async fn first_chunk(&self, filter: &ChunkFilter) -> Result<Option<crate::knowledge::Chunk>> {
        Ok(self
            .chunks
            .scan(Namespace::Drug, filter, 1)
            .await?
            .into_iter()
            .next())
    }

    // ------------------------------------------------------------------------
    // QA pairs
    // ------------------------------------------------------------------------

    /// 질병 QA 검색
    ///
    /// 벡터 검색 결과가 모두 걸러지면 질병 키워드 필터로 한 번 더 찾습니다.
    pub async fn retrieve_qa_pairs(
        &self,
        question: &str,
        disease: Option<&str>,
        topic: Option<&str>,
    ) -> Result<Vec<ScoredQa>> {
        let embedding = self.embed(question).await?;
        let k = self.config.qa_top_k;

        let hits = self.qa.search_pairs(&embedding, None, k).await?;
        let within = match hits.first() {
            Some(top) if top.distance <= self.config.qa_max_distance => hits,
            Some(top) => {
                tracing::debug!(
                    "QA top distance {:.4} > {}",
                    top.distance,
                    self.config.qa_max_distance
                );
                vec![]
            }
            None => vec![],
        };

        let kept = filter_qa(within, disease, topic);
        if !kept.is_empty() {
            return Ok(kept);
        }

        let Some(disease) = disease else {
            return Ok(vec![]);
        };

        let requery = self.qa.search_pairs(&embedding, Some(disease), k).await?;
        let kept = filter_qa(requery, Some(disease), topic);
        tracing::debug!(
            "QA keyword requery: disease={}, topic={:?}, kept={}",
            disease,
            topic,
            kept.len()
        );
        Ok(kept)
    }

    // ------------------------------------------------------------------------
    // Health food
    // ------------------------------------------------------------------------

    /// 건강기능식품 기능성 청크 검색
    pub async fn search_health_food_chunks(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let embedding = self.embed(question).await?;
        let keywords = extract_specific_keywords(question);
        let k = self.config.health_food_top_k;
        let base = ChunkFilter::new().section_prefix(HF_FUNCTION);

        let mut chunks = Vec::new();
        if !keywords.is_empty() {
            let filtered = base.clone().keywords(keywords.iter().cloned());
            chunks = self
                .chunks
                .search(Namespace::HealthFood, &embedding, &filtered, k)
                .await?;
            if chunks.is_empty() {
                tracing::debug!("No health food chunks for keywords {:?}", keywords);
            }
        }
        if chunks.is_empty() {
            chunks = self
                .chunks
                .search(Namespace::HealthFood, &embedding, &base, k)
                .await?;
        }
        if chunks.is_empty() {
            let any_hf = ChunkFilter::new().section_prefix(HF_SECTION_PREFIX);
            chunks = self
                .chunks
                .search(Namespace::HealthFood, &embedding, &any_hf, k)
                .await?;
        }

        let Some(top) = chunks.first() else {
            return Ok(vec![]);
        };
        tracing::debug!(
            "Health food chunks: top_k={}, first_dist={:.4}, keywords={:?}",
            chunks.len(),
            top.distance,
            keywords
        );
        if top.distance > self.config.health_food_max_distance {
            return Ok(vec![]);
        }
        Ok(chunks)
    }

    /// 검색된 청크를 제품으로 묶고 빠진 필드를 채웁니다
    pub async fn health_food_products(
        &self,
        chunks: &[ScoredChunk],
    ) -> Result<Vec<HealthFoodProduct>> {
        let raw: Vec<_> = chunks.iter().map(|c| c.chunk.clone()).collect();
        let mut products = collect_products(&raw);

        let missing: Vec<String> = products
            .iter()
            .filter(|p| !p.is_complete())
            .map(|p| p.item_name.clone())
            .collect();
        if !missing.is_empty() {
            let filter = ChunkFilter::new()
                .exact_items(missing)
                .section_prefix(HF_SECTION_PREFIX);
            let extra = self
                .chunks
                .scan(Namespace::HealthFood, &filter, usize::MAX)
                .await?;
            backfill_products(&mut products, &extra);
        }

        Ok(products)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 이름이 약 이름으로 시작하는 청크 → 포함하는 청크 → 나머지 순으로 정렬
///
/// 각 그룹 안에서는 기존(거리) 순서를 유지합니다.
pub fn prioritize_base_brand(med: &str, chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    let mut exact = Vec::new();
    let mut contains = Vec::new();
    let mut others = Vec::new();
    for c in chunks {
        let name = c.chunk.item_name.trim();
        if name.starts_with(med) {
            exact.push(c);
        } else if name.contains(med) {
            contains.push(c);
        } else {
            others.push(c);
        }
    }
    exact.extend(contains);
    exact.extend(others);
    exact
}

/// 후보 제품명 중 대표 제품 선택 (약 이름으로 시작하는 것 우선, 그다음 짧은 이름)
fn pick_product_name<'a>(med: &str, names: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut names: Vec<&str> = names.collect();
    names.dedup();
    names.sort_by_key(|n| (!n.starts_with(med), n.chars().count()));
    names.first().map(|n| n.to_string())
}

/// 질병/주제 조건으로 QA 결과를 거릅니다
fn filter_qa(hits: Vec<ScoredQa>, disease: Option<&str>, topic: Option<&str>) -> Vec<ScoredQa> {
    hits.into_iter()
        .filter(|h| match disease {
            Some(d) => mentions_disease(&h.pair.question, &h.pair.answer, d),
            None => true,
        })
        .filter(|h| match topic {
            Some(t) => h.pair.question.contains(t),
            None => true,
        })
        .collect()
}

/// 질문/답변에 질병명이 있고, 질문 앞부분에 그 질병이 나오는지
fn mentions_disease(question: &str, answer: &str, disease: &str) -> bool {
    let kw = normalize(disease);
    if kw.is_empty() {
        return true;
    }
    let q = normalize(question);
    if !q.contains(&kw) && !normalize(answer).contains(&kw) {
        return false;
    }
    let head_len = std::cmp::max(10, 2 * kw.chars().count());
    let head: String = q.chars().take(head_len).collect();
    head.contains(&kw)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Chunk, MemoryIndex, QaPair};
    use crate::rag::testing::KeywordEmbedding;

    fn drug(item: &str, section: &str, idx: i32, text: &str, emb: &KeywordEmbedding) -> Chunk {
        Chunk {
            chunk_id: format!("{}-{}-{}", item, section, idx),
            item_name: item.to_string(),
            section: section.to_string(),
            chunk_index: idx,
            text: text.to_string(),
            embedding: emb.vector(text),
        }
    }

    fn scored(item: &str, distance: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                chunk_id: item.to_string(),
                item_name: item.to_string(),
                section: "부작용".to_string(),
                chunk_index: 0,
                text: String::new(),
                embedding: vec![],
            },
            distance,
        }
    }

    async fn retriever(chunks: Vec<Chunk>, pairs: Vec<QaPair>) -> Retriever {
        let index = Arc::new(MemoryIndex::new());
        let (drugs, hf): (Vec<Chunk>, Vec<Chunk>) = chunks
            .into_iter()
            .partition(|c| c.namespace() == Namespace::Drug);
        index.replace_namespace(Namespace::Drug, drugs, 100).await.unwrap();
        index.replace_namespace(Namespace::HealthFood, hf, 100).await.unwrap();
        index.replace_pairs(pairs, 100).await.unwrap();
        Retriever::new(
            Arc::new(KeywordEmbedding::default()),
            index.clone(),
            index,
            RetrievalConfig::default(),
        )
    }

    #[test]
    fn test_prioritize_base_brand() {
        let ordered = prioritize_base_brand(
            "타이레놀",
            vec![scored("우먼스타이레놀정", 0.1), scored("게보린정", 0.2), scored("타이레놀정500", 0.3)],
        );
        let names: Vec<&str> = ordered.iter().map(|c| c.chunk.item_name.as_str()).collect();
        assert_eq!(names, vec!["타이레놀정500", "우먼스타이레놀정", "게보린정"]);
    }

    #[test]
    fn test_mentions_disease_primary_test() {
        assert!(mentions_disease("폐렴의 증상은 무엇인가요?", "", "폐렴"));
        assert!(!mentions_disease(
            "당뇨병 환자가 겨울철에 조심해야 할 합병증으로 폐렴이 있나요?",
            "",
            "폐렴"
        ));
        assert!(!mentions_disease("감기 증상", "콧물", "폐렴"));
    }

    #[tokio::test]
    async fn test_retrieve_top_chunks_filters_by_section_and_name() {
        let emb = KeywordEmbedding::default();
        let retriever = retriever(
            vec![
                drug("타이레놀정500밀리그람", "부작용", 0, "부작용: 발진, 구역", &emb),
                drug("타이레놀정500밀리그람", "효능효과", 1, "효능효과: 두통, 발열", &emb),
                drug("게보린정", "부작용", 0, "부작용: 구토, 발진", &emb),
            ],
            vec![],
        )
        .await;

        let chunks = retriever
            .retrieve_top_chunks("타이레놀 부작용 알려줘", Intent::SideEffect)
            .await
            .unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chunk.section == "부작용"));
        assert!(chunks[0].chunk.item_name.contains("타이레놀"));

        let general = retriever
            .retrieve_top_chunks("타이레놀 부작용 알려줘", Intent::General)
            .await
            .unwrap();
        assert!(general.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_name_falls_back_to_unfiltered() {
        let emb = KeywordEmbedding::default();
        let retriever = retriever(
            vec![drug("게보린정", "부작용", 0, "부작용: 구토, 발진", &emb)],
            vec![],
        )
        .await;

        let chunks = retriever
            .retrieve_top_chunks("없는약정 부작용", Intent::SideEffect)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk.item_name, "게보린정");
    }

    #[tokio::test]
    async fn test_distance_gate_without_names() {
        let emb = KeywordEmbedding::default();
        let retriever = retriever(
            vec![drug("게보린정", "상호작용", 0, "상호작용: 와파린", &emb)],
            vec![],
        )
        .await;

        // 공유 개념이 없어 거리 1.0
        let chunks = retriever
            .retrieve_top_chunks("술이랑 병용", Intent::Interaction)
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_qa_pairs_with_keyword_requery() {
        let emb = KeywordEmbedding::default();
        let pair = |id: &str, q: &str, a: &str| QaPair {
            qa_id: id.to_string(),
            question: q.to_string(),
            answer: a.to_string(),
            category: None,
            embedding: emb.vector(q),
        };
        let retriever = retriever(
            vec![],
            vec![
                pair("1", "폐렴의 증상은 무엇인가요?", "기침과 발열이 나타납니다."),
                pair("2", "당뇨병 증상은?", "갈증이 납니다."),
            ],
        )
        .await;

        let hits = retriever
            .retrieve_qa_pairs("폐렴 증상", Some("폐렴"), Some("증상"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pair.qa_id, "1");

        let none = retriever
            .retrieve_qa_pairs("결핵 원인", Some("결핵"), Some("원인"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_health_food_search_and_backfill() {
        let emb = KeywordEmbedding::default();
        let hf = |item: &str, section: &str, text: &str| Chunk {
            chunk_id: format!("{}-{}", item, section),
            item_name: item.to_string(),
            section: section.to_string(),
            chunk_index: 0,
            text: text.to_string(),
            embedding: emb.vector(text),
        };
        let retriever = retriever(
            vec![
                hf("A사 - 비타민C 1000", HF_FUNCTION, "제품명: 비타민C 1000\n기능성: 비타민C 항산화 영양제"),
                hf("A사 - 비타민C 1000", "hf_usage", "제품명: 비타민C 1000\n제조사: A사\n섭취 방법: 1일 1회"),
                hf("B사 - 루테인", HF_FUNCTION, "제품명: 루테인\n기능성: 눈 건강 영양제"),
            ],
            vec![],
        )
        .await;

        let chunks = retriever
            .search_health_food_chunks("비타민C 영양제 추천")
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk.item_name, "A사 - 비타민C 1000");

        let products = retriever.health_food_products(&chunks).await.unwrap();
        assert_eq!(products.len(), 1);
        assert!(products[0].usage.is_some());
        assert!(products[0].caution.is_none());
    }

    #[tokio::test]
    async fn test_drug_profile() {
        let emb = KeywordEmbedding::default();
        let retriever = retriever(
            vec![
                drug("우먼스타이레놀정", "효능효과", 0, "효능효과: 생리통", &emb),
                drug("타이레놀정500밀리그람", "효능효과", 0, "효능효과: 두통, 발열", &emb),
                drug("타이레놀정500밀리그람", "부작용", 1, "부작용: 발진", &emb),
                drug("타이레놀정500밀리그람", "사용상 주의사항", 2, "사용상 주의사항: 음주 주의", &emb),
            ],
            vec![],
        )
        .await;

        let profile = retriever.drug_profile("타이레놀").await.unwrap();
        assert_eq!(profile.item_name.as_deref(), Some("타이레놀정500밀리그람"));
        assert!(profile.efficacy.is_some());
        assert!(profile.side_effect.is_some());
        assert!(profile.dosage.is_none());
        assert!(profile.caution.is_some());

        let missing = retriever.drug_profile("없는약").await.unwrap();
        assert!(missing.item_name.is_none());
    }
}
