//! 건강기능식품 로더 (health_food_data.json)
//!
//! 제품 레코드는 SQLite 에 upsert 하고, 비어 있지 않은 필드마다
//! hf_usage / hf_caution / hf_function 청크를 하나씩 만듭니다.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

use super::{embed_all, non_empty, parse_records, read_source, LoadReport};
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{
    Chunk, ChunkIndex, HealthFood, KnowledgeStore, Namespace, NewHealthFood, HF_CAUTION,
    HF_FUNCTION, HF_USAGE,
};

/// 청크 insert 배치 크기
const INSERT_BATCH: usize = 1000;

/// 원본 레코드
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthFoodRecord {
    #[serde(rename = "ENTRPS", default)]
    pub manufacturer: Option<String>,
    #[serde(rename = "PRDUCT", default)]
    pub product: Option<String>,
    #[serde(rename = "SRV_USE", default)]
    pub serve_use: Option<String>,
    #[serde(rename = "INTAKE_HINT1", default)]
    pub intake_hint: Option<String>,
    #[serde(rename = "MAIN_FNCTN", default)]
    pub main_function: Option<String>,
}

/// 제품명이 없는 레코드와 (제조사, 제품명) 중복을 제거
fn dedupe(records: Vec<HealthFoodRecord>) -> Vec<NewHealthFood> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut items = Vec::new();

    for r in records {
        let Some(product_name) = non_empty(r.product) else {
            continue;
        };
        let manufacturer = non_empty(r.manufacturer).unwrap_or_default();
        if !seen.insert((manufacturer.clone(), product_name.clone())) {
            continue;
        }
        items.push(NewHealthFood {
            manufacturer,
            product_name,
            serve_use: non_empty(r.serve_use),
            intake_hint: non_empty(r.intake_hint),
            main_function: non_empty(r.main_function),
        });
    }
    items
}

/// 필드별 청크 (섹션, id 접미사, 본문)
fn field_texts(item: &NewHealthFood) -> Vec<(&'static str, &'static str, String)> {
    let mut out = Vec::new();
    if let Some(srv) = &item.serve_use {
        out.push((
            HF_USAGE,
            "usage",
            format!(
                "제품명: {}\n제조사: {}\n섭취 방법: {}",
                item.product_name, item.manufacturer, srv
            ),
        ));
    }
    if let Some(hint) = &item.intake_hint {
        out.push((
            HF_CAUTION,
            "caution",
            format!("제품명: {}\n주의사항: {}", item.product_name, hint),
        ));
    }
    if let Some(func) = &item.main_function {
        out.push((
            HF_FUNCTION,
            "function",
            format!("제품명: {}\n기능성: {}", item.product_name, func),
        ));
    }
    out
}

/// 건강기능식품 JSON 적재 (health_food namespace 전체 교체)
pub async fn load_health_foods(
    path: &Path,
    embedder: &dyn EmbeddingProvider,
    index: &dyn ChunkIndex,
    store: &KnowledgeStore,
) -> Result<LoadReport> {
    let (bytes, sha) = read_source(path)?;
    let (records, skipped) = parse_records::<HealthFoodRecord>(&bytes, path)?;
    let total = records.len();
    let items = dedupe(records);
    tracing::info!(
        "Health food records: {} read, {} after dedupe",
        total,
        items.len()
    );

    // 임베딩을 먼저 끝내야 실패해도 저장소가 바뀌지 않습니다
    let fields: Vec<Vec<(&'static str, &'static str, String)>> =
        items.iter().map(field_texts).collect();
    let texts: Vec<String> = fields
        .iter()
        .flatten()
        .map(|(_, _, text)| text.clone())
        .collect();
    let mut vectors = embed_all(embedder, &texts).await?.into_iter();

    let saved: Vec<HealthFood> = store.upsert_health_foods(&items)?;

    let mut chunks = Vec::with_capacity(texts.len());
    for (product, product_fields) in saved.iter().zip(fields) {
        let item_name = product.item_name();
        for (section, suffix, text) in product_fields {
            let Some(embedding) = vectors.next() else {
                anyhow::bail!("Embedding count does not match health food chunks");
            };
            chunks.push(Chunk {
                chunk_id: format!("hf_{}_{}", product.id, suffix),
                item_name: item_name.clone(),
                section: section.to_string(),
                chunk_index: 0,
                text,
                embedding,
            });
        }
    }

    let rows = index
        .replace_namespace(Namespace::HealthFood, chunks, INSERT_BATCH)
        .await?;
    let run_id = store.record_load_run(Namespace::HealthFood.as_str(), path, &sha, rows)?;
    tracing::info!(
        "Health food chunks saved: {} ({} products)",
        rows,
        saved.len()
    );

    Ok(LoadReport {
        namespace: Namespace::HealthFood.to_string(),
        rows,
        skipped,
        source_sha256: sha,
        run_id,
    })
}

// ============================================================================
// Tests
// ============================================================================
