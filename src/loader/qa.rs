//! 질병 QA 로더 (JSONL)

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use super::{embed_all, non_empty, read_source, LoadReport};
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{KnowledgeStore, QaIndex, QaPair};

/// QA insert 배치 크기
const INSERT_BATCH: usize = 256;

/// load_runs 에 기록하는 이름
const QA_NAMESPACE: &str = "qa";

#[derive(Debug, Deserialize)]
struct QaLine {
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// 한 줄씩 파싱 (형식 오류와 질문/답변이 빈 줄은 건너뜀)
fn parse_lines(content: &str) -> (Vec<QaPair>, usize) {
    let mut pairs = Vec::new();
    let mut skipped = 0;

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed: QaLine = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("line {}: JSON parse failed: {}", line_no, e);
                skipped += 1;
                continue;
            }
        };

        let (Some(question), Some(answer)) =
            (non_empty(parsed.instruction), non_empty(parsed.output))
        else {
            skipped += 1;
            continue;
        };

        pairs.push(QaPair {
            qa_id: format!("{}:{}", line_no, Uuid::new_v4().simple()),
            question,
            answer,
            category: non_empty(parsed.category),
            embedding: vec![],
        });
    }

    (pairs, skipped)
}

/// QA JSONL 적재 (QA 쌍 전체 교체, 질문 기준 임베딩)
pub async fn load_qa_pairs(
    path: &Path,
    embedder: &dyn EmbeddingProvider,
    index: &dyn QaIndex,
    store: &KnowledgeStore,
) -> Result<LoadReport> {
    let (bytes, sha) = read_source(path)?;
    let content = String::from_utf8(bytes).with_context(|| format!("{:?} is not UTF-8", path))?;

    let (mut pairs, skipped) = parse_lines(&content);
    tracing::info!("Parsed {} QA pairs ({} lines skipped)", pairs.len(), skipped);

    let questions: Vec<String> = pairs.iter().map(|p| p.question.clone()).collect();
    let vectors = embed_all(embedder, &questions).await?;
    for (pair, vector) in pairs.iter_mut().zip(vectors) {
        pair.embedding = vector;
    }

    let rows = index.replace_pairs(pairs, INSERT_BATCH).await?;
    let run_id = store.record_load_run(QA_NAMESPACE, path, &sha, rows)?;
    tracing::info!("QA pairs saved: {}", rows);

    Ok(LoadReport {
        namespace: QA_NAMESPACE.to_string(),
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
    use crate::knowledge::MemoryIndex;
    use crate::rag::testing::KeywordEmbedding;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{"instruction":"폐렴의 증상은?","output":"기침과 발열이 납니다.","category":"호흡기"}

{"instruction":"broken"
{"instruction":"결핵의 원인은?","output":"결핵균 감염입니다."}
{"instruction":"답이 없는 질문","output":"  "}
"#;

    #[test]
    fn test_parse_lines() {
        let (pairs, skipped) = parse_lines(SAMPLE);
        assert_eq!(pairs.len(), 2);
        assert_eq!(skipped, 2);
        assert!(pairs[0].qa_id.starts_with("1:"));
        assert!(pairs[1].qa_id.starts_with("4:"));
        assert_eq!(pairs[0].category.as_deref(), Some("호흡기"));
        assert_eq!(pairs[1].category, None);
    }

    #[tokio::test]
    async fn test_load_qa_pairs() {
        let dir = TempDir::new().unwrap();
        let store = KnowledgeStore::open(&dir.path().join("smartmed.db")).unwrap();
        let index = MemoryIndex::new();
        let path = dir.path().join("qa_pairs.jsonl");
        std::fs::write(&path, SAMPLE).unwrap();

        let report = load_qa_pairs(&path, &KeywordEmbedding::default(), &index, &store)
            .await
            .unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(index.count_pairs().await.unwrap(), 2);
        assert_eq!(store.latest_load_runs().unwrap()[0].namespace, "qa");
    }
}
