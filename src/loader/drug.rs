//! 의약품 설명서 로더 (drb_easy_drug.json)

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use uuid::Uuid;

use super::{embed_all, non_empty, parse_records, read_source, LoadReport};
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{
    Chunk, ChunkIndex, Chunker, KnowledgeStore, Namespace, SECTION_DOSAGE, SECTION_EFFICACY,
    SECTION_INTERACTION, SECTION_PRECAUTIONS, SECTION_SIDE_EFFECT,
};

/// 청크 insert 배치 크기
const INSERT_BATCH: usize = 1000;

/// e약은요 원본 레코드
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrugRecord {
    #[serde(rename = "ITEM_NAME", default)]
    pub item_name: Option<String>,
    #[serde(rename = "EFCY_QESITM", default)]
    pub efficacy: Option<String>,
    #[serde(rename = "USE_METHOD_QESITM", default)]
    pub use_method: Option<String>,
    #[serde(rename = "ATPN_WARN_QESITM", default)]
    pub warning: Option<String>,
    #[serde(rename = "ATPN_QESITM", default)]
    pub precautions: Option<String>,
    #[serde(rename = "INTRC_QESITM", default)]
    pub interaction: Option<String>,
    #[serde(rename = "SE_QESITM", default)]
    pub side_effect: Option<String>,
}

impl DrugRecord {
    /// (섹션, 본문) 목록 - 적재 순서대로
    fn sections(&self) -> Vec<(&'static str, String)> {
        [
            (SECTION_EFFICACY, &self.efficacy),
            (SECTION_DOSAGE, &self.use_method),
            (SECTION_SIDE_EFFECT, &self.side_effect),
            (SECTION_PRECAUTIONS, &self.warning),
            (SECTION_PRECAUTIONS, &self.precautions),
            (SECTION_INTERACTION, &self.interaction),
        ]
        .into_iter()
        .filter_map(|(section, body)| non_empty(body.clone()).map(|b| (section, b)))
        .collect()
    }
}

/// 레코드를 청크로 변환 (임베딩은 비어 있음)
///
/// 제품명이 없거나 이미 나온 제품명이면 건너뜁니다.
/// `chunk_index`는 제품 안에서 섹션을 가로질러 0부터 증가합니다.
pub fn build_drug_chunks(records: &[DrugRecord], chunker: &dyn Chunker) -> Vec<Chunk> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut chunks = Vec::new();

    for record in records {
        let Some(item_name) = non_empty(record.item_name.clone()) else {
            continue;
        };
        if !seen.insert(item_name.clone()) {
            tracing::warn!("Duplicate ITEM_NAME skipped: {}", item_name);
            continue;
        }

        let mut chunk_index = 0;
        for (section, body) in record.sections() {
            for piece in chunker.chunk(&body) {
                chunks.push(Chunk {
                    chunk_id: Uuid::new_v4().simple().to_string(),
                    item_name: item_name.clone(),
                    section: section.to_string(),
                    chunk_index,
                    text: format!("{}: {}", section, piece),
                    embedding: vec![],
                });
                chunk_index += 1;
            }
        }
    }

    chunks
}

/// 의약품 JSON 적재 (drug namespace 전체 교체)
pub async fn load_drugs(
    path: &Path,
    chunker: &dyn Chunker,
    embedder: &dyn EmbeddingProvider,
    index: &dyn ChunkIndex,
    store: &KnowledgeStore,
) -> Result<LoadReport> {
    let (bytes, sha) = read_source(path)?;
    let (records, skipped) = parse_records::<DrugRecord>(&bytes, path)?;
    tracing::info!("Loaded {} drug records from {:?}", records.len(), path);

    let mut chunks = build_drug_chunks(&records, chunker);
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embed_all(embedder, &texts).await?;
    for (chunk, vector) in chunks.iter_mut().zip(vectors) {
        chunk.embedding = vector;
    }

    let rows = index
        .replace_namespace(Namespace::Drug, chunks, INSERT_BATCH)
        .await?;
    let run_id = store.record_load_run(Namespace::Drug.as_str(), path, &sha, rows)?;
    tracing::info!("Drug chunks saved: {} (skipped records: {})", rows, skipped);

    Ok(LoadReport {
        namespace: Namespace::Drug.to_string(),
        rows,
        skipped,
        source_sha256: sha,
        run_id,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{ChunkFilter, MemoryIndex, ParagraphChunker};
    use crate::rag::answer::build_side_effect_answer;
    use crate::rag::testing::KeywordEmbedding;
    use tempfile::TempDir;

    fn record(name: &str, efficacy: &str, side_effect: &str) -> DrugRecord {
        DrugRecord {
            item_name: Some(name.to_string()),
            efficacy: Some(efficacy.to_string()),
            side_effect: Some(side_effect.to_string()),
            ..DrugRecord::default()
        }
    }

    #[test]
    fn test_build_chunks_sections_and_indices() {
        let mut r = record("타이레놀정500밀리그람", "두통, 발열", "발진");
        r.warning = Some("경고 문구".to_string());
        r.precautions = Some("  ".to_string());
        r.interaction = Some("와파린".to_string());

        let chunks = build_drug_chunks(&[r], &ParagraphChunker::with_defaults());
        let layout: Vec<(&str, i32)> = chunks
            .iter()
            .map(|c| (c.section.as_str(), c.chunk_index))
            .collect();
        assert_eq!(
            layout,
            vec![
                ("효능효과", 0),
                ("부작용", 1),
                ("사용상 주의사항", 2),
                ("상호작용", 3),
            ]
        );
        assert_eq!(chunks[1].text, "부작용: 발진");
        assert!(chunks.iter().all(|c| c.chunk_id.len() == 32));
    }

    #[test]
    fn test_build_chunks_skips_unnamed_and_duplicates() {
        let chunks = build_drug_chunks(
            &[
                record("게보린정", "두통", "구토"),
                record("게보린정", "다른 효능", "다른 부작용"),
                record(" ", "효능", "부작용"),
            ],
            &ParagraphChunker::with_defaults(),
        );
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.item_name == "게보린정"));
    }

    #[test]
    fn test_multiline_side_effects_become_bullets() {
        let chunks = build_drug_chunks(
            &[record("타이레놀정", "두통", "발진\n구역\n두통")],
            &ParagraphChunker::with_defaults(),
        );
        let side_effects: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| c.section == "부작용")
            .collect();
        assert_eq!(side_effects.len(), 1);
        assert_eq!(side_effects[0].text, "부작용: 발진\n구역\n두통");

        let answer = build_side_effect_answer("타이레놀 부작용", &side_effects);
        assert!(answer.contains("- 발진\n- 구역\n- 두통\n"));
    }

    #[test]
    fn test_long_section_is_split() {
        let body = "가".repeat(1700);
        let chunks = build_drug_chunks(
            &[record("긴약정", &body, "")],
            &ParagraphChunker::with_defaults(),
        );
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_load_drugs_replaces_namespace() {
        let dir = TempDir::new().unwrap();
        let store = KnowledgeStore::open(&dir.path().join("smartmed.db")).unwrap();
        let index = MemoryIndex::new();
        let embedder = KeywordEmbedding::default();
        let chunker = ParagraphChunker::with_defaults();

        let first = dir.path().join("first.json");
        std::fs::write(
            &first,
            r#"[{"ITEM_NAME":"옛날약정","EFCY_QESITM":"두통","SE_QESITM":"발진"}]"#,
        )
        .unwrap();
        load_drugs(&first, &chunker, &embedder, &index, &store)
            .await
            .unwrap();

        let second = dir.path().join("second.json");
        std::fs::write(
            &second,
            r#"[
                {"ITEM_NAME":"타이레놀정500밀리그람","EFCY_QESITM":"두통, 발열","SE_QESITM":null},
                "not an object",
                {"ITEM_NAME":"게보린정","SE_QESITM":"구토"}
            ]"#,
        )
        .unwrap();
        let report = load_drugs(&second, &chunker, &embedder, &index, &store)
            .await
            .unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(index.count(Namespace::Drug).await.unwrap(), 2);

        let old = index
            .scan(Namespace::Drug, &ChunkFilter::new().item_names(["옛날약"]), 10)
            .await
            .unwrap();
        assert!(old.is_empty());

        let all = index
            .scan(Namespace::Drug, &ChunkFilter::new(), 10)
            .await
            .unwrap();
        assert!(all
            .iter()
            .all(|c| c.embedding.len() == embedder.dimension()));

        let runs = store.latest_load_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].namespace, "drug");
        assert_eq!(runs[0].row_count, 2);
        assert_eq!(runs[0].source_sha256, report.source_sha256);
    }

    #[tokio::test]
    async fn test_missing_file_leaves_index_untouched() {
        let dir = TempDir::new().unwrap();
        let store = KnowledgeStore::open(&dir.path().join("smartmed.db")).unwrap();
        let index = MemoryIndex::new();

        let result = load_drugs(
            &dir.path().join("absent.json"),
            &ParagraphChunker::with_defaults(),
            &KeywordEmbedding::default(),
            &index,
            &store,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(index.count(Namespace::Drug).await.unwrap(), 0);
        assert!(store.latest_load_runs().unwrap().is_empty());
    }
}
