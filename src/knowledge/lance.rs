//! LanceDB 인덱스 - 청크/QA 벡터 저장소
//!
//! namespace 마다 테이블 하나(`drug_chunks`, `hf_chunks`)와 `qa_pairs` 테이블을 둡니다.
//! 로더의 전체 교체는 `CreateTableMode::Overwrite` 한 번으로 커밋되므로
//! 검색 쪽은 이전 버전 또는 새 버전 전체만 보게 됩니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::{Connection, CreateTableMode};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;
use lancedb::DistanceType;

use super::vector::{
    like_pattern, Chunk, ChunkFilter, ChunkIndex, Namespace, QaIndex, QaPair, ScoredChunk, ScoredQa,
    EMBEDDING_DIMENSION,
};

/// QA 테이블 이름
const QA_TABLE: &str = "qa_pairs";

// ============================================================================
// LanceIndex
// ============================================================================

/// LanceDB 기반 청크 + QA 인덱스
pub struct LanceIndex {
    db: Connection,
}

impl LanceIndex {
    /// LanceDB 디렉토리 열기 (없으면 생성)
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            tokio::fs::create_dir_all(path)
                .await
                .context("Failed to create LanceDB directory")?;
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db })
    }

    fn embedding_field() -> Field {
        Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                EMBEDDING_DIMENSION,
            ),
            false,
        )
    }

    fn chunk_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("item_name", DataType::Utf8, false),
            Field::new("section", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("text", DataType::Utf8, false),
            Self::embedding_field(),
        ]))
    }

    fn qa_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("qa_id", DataType::Utf8, false),
            Field::new("question", DataType::Utf8, false),
            Field::new("answer", DataType::Utf8, false),
            Field::new("category", DataType::Utf8, true),
            Self::embedding_field(),
        ]))
    }

    /// 임베딩 목록을 FixedSizeList 컬럼으로 변환
    fn embeddings_to_array<'a>(
        embeddings: impl Iterator<Item = &'a Vec<f32>>,
    ) -> Result<FixedSizeListArray> {
        let mut flat: Vec<f32> = Vec::new();
        for embedding in embeddings {
            if embedding.len() != EMBEDDING_DIMENSION as usize {
                anyhow::bail!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    EMBEDDING_DIMENSION,
                    embedding.len()
                );
            }
            flat.extend_from_slice(embedding);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        FixedSizeListArray::try_new(
            field,
            EMBEDDING_DIMENSION,
            Arc::new(Float32Array::from(flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")
    }

    fn chunks_to_batch(chunks: &[Chunk]) -> Result<RecordBatch> {
        let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        let names: Vec<&str> = chunks.iter().map(|c| c.item_name.as_str()).collect();
        let sections: Vec<&str> = chunks.iter().map(|c| c.section.as_str()).collect();
        let indices: Vec<i32> = chunks.iter().map(|c| c.chunk_index).collect();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = Self::embeddings_to_array(chunks.iter().map(|c| &c.embedding))?;

        RecordBatch::try_new(
            Self::chunk_schema(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(names)),
                Arc::new(StringArray::from(sections)),
                Arc::new(Int32Array::from(indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings),
            ],
        )
        .context("Failed to create chunk RecordBatch")
    }

    fn pairs_to_batch(pairs: &[QaPair]) -> Result<RecordBatch> {
        let ids: Vec<&str> = pairs.iter().map(|p| p.qa_id.as_str()).collect();
        let questions: Vec<&str> = pairs.iter().map(|p| p.question.as_str()).collect();
        let answers: Vec<&str> = pairs.iter().map(|p| p.answer.as_str()).collect();
        let categories: Vec<Option<&str>> = pairs.iter().map(|p| p.category.as_deref()).collect();
        let embeddings = Self::embeddings_to_array(pairs.iter().map(|p| &p.embedding))?;

        RecordBatch::try_new(
            Self::qa_schema(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(questions)),
                Arc::new(StringArray::from(answers)),
                Arc::new(StringArray::from(categories)),
                Arc::new(embeddings),
            ],
        )
        .context("Failed to create QA RecordBatch")
    }

    /// 테이블 열기 (없으면 None)
    async fn open_table(&self, name: &str) -> Result<Option<Table>> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")?;

        if !names.iter().any(|n| n == name) {
            return Ok(None);
        }

        let table = self
            .db
            .open_table(name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table {}", name))?;
        Ok(Some(table))
    }

    /// 테이블 전체를 새 배치들로 덮어쓰기 (단일 커밋)
    async fn overwrite(
        &self,
        name: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<()> {
        if batches.is_empty() {
            self.db
                .create_empty_table(name, schema)
                .mode(CreateTableMode::Overwrite)
                .execute()
                .await
                .with_context(|| format!("Failed to reset table {}", name))?;
            return Ok(());
        }

        let batches: Vec<std::result::Result<RecordBatch, ArrowError>> =
            batches.into_iter().map(Ok).collect();
        let reader = RecordBatchIterator::new(batches, schema);
        self.db
            .create_table(name, reader)
            .mode(CreateTableMode::Overwrite)
            .execute()
            .await
            .with_context(|| format!("Failed to overwrite table {}", name))?;
        Ok(())
    }
}

// ============================================================================
// Column Helpers
// ============================================================================

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

fn embedding_at(batch: &RecordBatch, row: usize) -> Result<Vec<f32>> {
    let list = batch
        .column_by_name("embedding")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing embedding column"))?;
    let values = list.value(row);
    let values = values
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| anyhow::anyhow!("Embedding values are not Float32"))?;
    Ok(values.values().to_vec())
}

fn distance_column(batch: &RecordBatch) -> Result<&Float32Array> {
    // _distance 컬럼 (LanceDB가 자동 추가)
    batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))
}

fn batch_to_chunks(batch: &RecordBatch) -> Result<Vec<Chunk>> {
    let ids = string_column(batch, "chunk_id")?;
    let names = string_column(batch, "item_name")?;
    let sections = string_column(batch, "section")?;
    let texts = string_column(batch, "text")?;
    let indices = batch
        .column_by_name("chunk_index")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;

    (0..batch.num_rows())
        .map(|i| {
            Ok(Chunk {
                chunk_id: ids.value(i).to_string(),
                item_name: names.value(i).to_string(),
                section: sections.value(i).to_string(),
                chunk_index: indices.value(i),
                text: texts.value(i).to_string(),
                embedding: embedding_at(batch, i)?,
            })
        })
        .collect()
}

fn batch_to_pairs(batch: &RecordBatch) -> Result<Vec<QaPair>> {
    let ids = string_column(batch, "qa_id")?;
    let questions = string_column(batch, "question")?;
    let answers = string_column(batch, "answer")?;
    let categories = string_column(batch, "category")?;

    (0..batch.num_rows())
        .map(|i| {
            Ok(QaPair {
                qa_id: ids.value(i).to_string(),
                question: questions.value(i).to_string(),
                answer: answers.value(i).to_string(),
                category: (!categories.is_null(i)).then(|| categories.value(i).to_string()),
                embedding: embedding_at(batch, i)?,
            })
        })
        .collect()
}

// ============================================================================
// ChunkIndex
// ============================================================================

#[async_trait]
impl ChunkIndex for LanceIndex {
    async fn replace_namespace(
        &self,
        namespace: Namespace,
        chunks: Vec<Chunk>,
        batch_size: usize,
    ) -> Result<usize> {
        let batches = chunks
            .chunks(batch_size.max(1))
            .map(Self::chunks_to_batch)
            .collect::<Result<Vec<_>>>()?;

        self.overwrite(namespace.table_name(), Self::chunk_schema(), batches)
            .await?;

        tracing::info!(
            "Replaced {} namespace: {} chunks",
            namespace,
            chunks.len()
        );
        Ok(chunks.len())
    }

    async fn search(
        &self,
        namespace: Namespace,
        query_embedding: &[f32],
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let Some(table) = self.open_table(namespace.table_name()).await? else {
            return Ok(vec![]);
        };

        let mut query = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit);
        if let Some(sql) = filter.to_sql() {
            tracing::debug!("Chunk filter: {}", sql);
            query = query.only_if(sql);
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .context("Failed to execute vector search")?
            .try_collect()
            .await?;

        let mut results = Vec::new();
        for batch in &batches {
            let distances = distance_column(batch)?;
            for (i, chunk) in batch_to_chunks(batch)?.into_iter().enumerate() {
                results.push(ScoredChunk {
                    chunk,
                    distance: distances.value(i),
                });
            }
        }
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(results)
    }

    async fn scan(
        &self,
        namespace: Namespace,
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let Some(table) = self.open_table(namespace.table_name()).await? else {
            return Ok(vec![]);
        };

        let mut query = table.query();
        if let Some(sql) = filter.to_sql() {
            query = query.only_if(sql);
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .context("Failed to execute scan")?
            .try_collect()
            .await?;

        let mut rows = Vec::new();
        for batch in &batches {
            rows.extend(batch_to_chunks(batch)?);
        }
        rows.sort_by(|a, b| {
            a.item_name
                .cmp(&b.item_name)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn count(&self, namespace: Namespace) -> Result<usize> {
        let Some(table) = self.open_table(namespace.table_name()).await? else {
            return Ok(0);
        };
        table.count_rows(None).await.context("Failed to count rows")
    }
}

// ============================================================================
// QaIndex
// ============================================================================

#[async_trait]
impl QaIndex for LanceIndex {
    async fn replace_pairs(&self, pairs: Vec<QaPair>, batch_size: usize) -> Result<usize> {
        let batches = pairs
            .chunks(batch_size.max(1))
            .map(Self::pairs_to_batch)
            .collect::<Result<Vec<_>>>()?;

        self.overwrite(QA_TABLE, Self::qa_schema(), batches).await?;

        tracing::info!("Replaced QA pairs: {}", pairs.len());
        Ok(pairs.len())
    }

    async fn search_pairs(
        &self,
        query_embedding: &[f32],
        keyword: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredQa>> {
        let Some(table) = self.open_table(QA_TABLE).await? else {
            return Ok(vec![]);
        };

        let mut query = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create QA vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit);
        if let Some(keyword) = keyword {
            let k = like_pattern(keyword);
            query = query.only_if(format!(
                "question LIKE '%{k}%' ESCAPE '\\' OR answer LIKE '%{k}%' ESCAPE '\\'"
            ));
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .context("Failed to execute QA search")?
            .try_collect()
            .await?;

        let mut results = Vec::new();
        for batch in &batches {
            let distances = distance_column(batch)?;
            for (i, pair) in batch_to_pairs(batch)?.into_iter().enumerate() {
                results.push(ScoredQa {
                    pair,
                    distance: distances.value(i),
                });
            }
        }
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(results)
    }

    async fn count_pairs(&self) -> Result<usize> {
        let Some(table) = self.open_table(QA_TABLE).await? else {
            return Ok(0);
        };
        table.count_rows(None).await.context("Failed to count QA rows")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIMENSION as usize];
        v[axis] = 1.0;
        v
    }

    fn chunk(id: &str, item_name: &str, section: &str, axis: usize) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            item_name: item_name.to_string(),
            section: section.to_string(),
            chunk_index: 0,
            text: format!("{}: 테스트 본문", section),
            embedding: unit(axis),
        }
    }

    #[tokio::test]
    async fn test_lance_replace_and_count() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceIndex::open(&temp_dir.path().join("lance")).await.unwrap();

        assert_eq!(index.count(Namespace::Drug).await.unwrap(), 0);

        let chunks = vec![
            chunk("a", "타이레놀정", "부작용", 0),
            chunk("b", "판콜에이내복액", "효능효과", 1),
        ];
        let inserted = index
            .replace_namespace(Namespace::Drug, chunks, 1)
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(index.count(Namespace::Drug).await.unwrap(), 2);

        // 재적재 시 이전 청크가 남지 않음
        index
            .replace_namespace(Namespace::Drug, vec![chunk("c", "게보린정", "부작용", 2)], 1000)
            .await
            .unwrap();
        let rows = index
            .scan(Namespace::Drug, &ChunkFilter::new(), 100)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].chunk_id, "c");

        // 빈 적재는 테이블을 비움
        index
            .replace_namespace(Namespace::Drug, vec![], 1000)
            .await
            .unwrap();
        assert_eq!(index.count(Namespace::Drug).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lance_search_with_filter() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceIndex::open(&temp_dir.path().join("lance")).await.unwrap();

        index
            .replace_namespace(
                Namespace::Drug,
                vec![
                    chunk("a", "타이레놀정", "부작용", 0),
                    chunk("b", "판콜에이내복액", "부작용", 1),
                    chunk("c", "타이레놀정", "효능효과", 0),
                ],
                1000,
            )
            .await
            .unwrap();

        let results = index
            .search(
                Namespace::Drug,
                &unit(0),
                &ChunkFilter::new().sections(["부작용"]),
                5,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.chunk_id, "a");
        assert!(results[0].distance < 0.01);
        assert!(results.iter().all(|r| r.chunk.section == "부작용"));
    }

    #[tokio::test]
    async fn test_lance_qa_pairs() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceIndex::open(&temp_dir.path().join("lance")).await.unwrap();

        let pairs = vec![
            QaPair {
                qa_id: "1:a".to_string(),
                question: "폐렴의 증상은 무엇인가요?".to_string(),
                answer: "기침과 발열이 나타납니다.".to_string(),
                category: Some("호흡기".to_string()),
                embedding: unit(3),
            },
            QaPair {
                qa_id: "2:b".to_string(),
                question: "독감은 어떻게 예방하나요?".to_string(),
                answer: "백신을 접종합니다.".to_string(),
                category: None,
                embedding: unit(4),
            },
        ];
        assert_eq!(index.replace_pairs(pairs, 256).await.unwrap(), 2);
        assert_eq!(index.count_pairs().await.unwrap(), 2);

        let hits = index.search_pairs(&unit(3), None, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pair.qa_id, "1:a");
        assert_eq!(hits[0].pair.category.as_deref(), Some("호흡기"));

        let hits = index.search_pairs(&unit(3), Some("독감"), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pair.qa_id, "2:b");
        assert!(hits[0].pair.category.is_none());
    }
}
