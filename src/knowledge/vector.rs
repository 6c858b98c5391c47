//! 벡터 인덱스 - 청크/QA 타입과 검색 트레이트
//!
//! 의약품 설명서 청크와 건강기능식품 청크는 namespace 별 테이블에,
//! 질병 QA 쌍은 별도 테이블에 저장됩니다. 거리는 코사인 거리(1 - cos)입니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 임베딩 차원 (all-MiniLM-L6-v2)
pub const EMBEDDING_DIMENSION: i32 = 384;

// ============================================================================
// Sections
// ============================================================================

pub const SECTION_EFFICACY: &str = "효능효과";
pub const SECTION_DOSAGE: &str = "용법용량";
pub const SECTION_SIDE_EFFECT: &str = "부작용";
pub const SECTION_PRECAUTIONS: &str = "사용상 주의사항";
pub const SECTION_INTERACTION: &str = "상호작용";

pub const DRUG_SECTIONS: [&str; 5] = [
    SECTION_EFFICACY,
    SECTION_DOSAGE,
    SECTION_SIDE_EFFECT,
    SECTION_PRECAUTIONS,
    SECTION_INTERACTION,
];

/// 건강기능식품 섹션 접두사
pub const HF_SECTION_PREFIX: &str = "hf_";
pub const HF_FUNCTION: &str = "hf_function";
pub const HF_USAGE: &str = "hf_usage";
pub const HF_CAUTION: &str = "hf_caution";

/// 청크 저장 구역
///
/// 로더는 namespace 단위로 전체 교체합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Drug,
    HealthFood,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Drug, Namespace::HealthFood];

    /// LanceDB 테이블 이름
    pub fn table_name(self) -> &'static str {
        match self {
            Namespace::Drug => "drug_chunks",
            Namespace::HealthFood => "hf_chunks",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Drug => "drug",
            Namespace::HealthFood => "health_food",
        }
    }

    /// 섹션 이름으로 namespace 판별
    pub fn of_section(section: &str) -> Self {
        if section.starts_with(HF_SECTION_PREFIX) {
            Namespace::HealthFood
        } else {
            Namespace::Drug
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Types
// ============================================================================

/// 검색 단위 청크
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 전역 고유 ID (128자 이하)
    pub chunk_id: String,
    pub item_name: String,
    pub section: String,
    /// (item_name, section) 안에서의 위치 (0-based)
    pub chunk_index: i32,
    pub text: String,
    /// L2 정규화된 임베딩
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn namespace(&self) -> Namespace {
        Namespace::of_section(&self.section)
    }
}

/// 거리와 함께 반환되는 청크
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// 코사인 거리 (0.0 = 동일)
    pub distance: f32,
}

/// 응답에 포함되는 청크 참조
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkContext {
    pub chunk_id: String,
    pub item_name: String,
    pub section: String,
    pub chunk_index: i32,
}

impl From<&Chunk> for ChunkContext {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            item_name: chunk.item_name.clone(),
            section: chunk.section.clone(),
            chunk_index: chunk.chunk_index,
        }
    }
}

/// 질병 QA 쌍
#[derive(Debug, Clone, PartialEq)]
pub struct QaPair {
    pub qa_id: String,
    pub question: String,
    pub answer: String,
    pub category: Option<String>,
    /// question 임베딩
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ScoredQa {
    pub pair: QaPair,
    pub distance: f32,
}

// ============================================================================
// ChunkFilter
// ============================================================================

/// 청크 검색 필터
///
/// 각 조건은 AND로 결합되고, 조건 내부의 목록은 OR로 결합됩니다.
/// 비어 있는 조건은 무시됩니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkFilter {
    /// section이 이 중 하나를 포함
    pub section_contains: Vec<String>,
    /// section이 이 접두사로 시작
    pub section_prefix: Option<String>,
    /// item_name이 이 중 하나를 포함
    pub item_name_contains: Vec<String>,
    /// text 또는 item_name이 이 중 하나를 포함
    pub keywords: Vec<String>,
    /// item_name이 이 중 하나와 정확히 일치
    pub item_name_in: Vec<String>,
}

impl ChunkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sections<I, S>(mut self, sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.section_contains = sections.into_iter().map(Into::into).collect();
        self
    }

    pub fn section_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.section_prefix = Some(prefix.into());
        self
    }

    pub fn item_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.item_name_contains = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn exact_items<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.item_name_in = names.into_iter().map(Into::into).collect();
        self
    }

    /// 메모리 상의 청크에 필터 적용
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if !self.section_contains.is_empty()
            && !self
                .section_contains
                .iter()
                .any(|s| chunk.section.contains(s.as_str()))
        {
            return false;
        }
        if let Some(prefix) = &self.section_prefix {
            if !chunk.section.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if !self.item_name_contains.is_empty()
            && !self
                .item_name_contains
                .iter()
                .any(|n| chunk.item_name.contains(n.as_str()))
        {
            return false;
        }
        if !self.keywords.is_empty()
            && !self.keywords.iter().any(|k| {
                chunk.text.contains(k.as_str()) || chunk.item_name.contains(k.as_str())
            })
        {
            return false;
        }
        if !self.item_name_in.is_empty() && !self.item_name_in.contains(&chunk.item_name) {
            return false;
        }
        true
    }

    /// LanceDB `only_if` 용 SQL 조건식 (조건이 없으면 None)
    pub fn to_sql(&self) -> Option<String> {
        let mut clauses = Vec::new();

        if !self.section_contains.is_empty() {
            clauses.push(any_of(
                self.section_contains
                    .iter()
                    .map(|s| format!("section LIKE '%{}%' ESCAPE '\\'", like_pattern(s))),
            ));
        }
        if let Some(prefix) = &self.section_prefix {
            clauses.push(format!("section LIKE '{}%' ESCAPE '\\'", like_pattern(prefix)));
        }
        if !self.item_name_contains.is_empty() {
            clauses.push(any_of(
                self.item_name_contains
                    .iter()
                    .map(|n| format!("item_name LIKE '%{}%' ESCAPE '\\'", like_pattern(n))),
            ));
        }
        if !self.keywords.is_empty() {
            clauses.push(any_of(self.keywords.iter().map(|k| {
                let k = like_pattern(k);
                format!("text LIKE '%{k}%' ESCAPE '\\' OR item_name LIKE '%{k}%' ESCAPE '\\'")
            })));
        }
        if !self.item_name_in.is_empty() {
            let names: Vec<String> = self
                .item_name_in
                .iter()
                .map(|n| format!("'{}'", escape_sql(n)))
                .collect();
            clauses.push(format!("item_name IN ({})", names.join(", ")));
        }

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        }
    }
}

fn any_of(parts: impl Iterator<Item = String>) -> String {
    let parts: Vec<String> = parts.collect();
    format!("({})", parts.join(" OR "))
}

/// SQL 문자열 리터럴 이스케이프
pub fn escape_sql(value: &str) -> String {
    value.replace('\'', "''")
}

/// `LIKE ... ESCAPE '\'` 패턴용 리터럴 (`%`, `_` 를 문자 그대로 매칭)
pub fn like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    escape_sql(&out)
}

// ============================================================================
// Index Traits
// ============================================================================

/// 청크 인덱스 (async)
#[async_trait]
pub trait ChunkIndex: Send + Sync {
    /// namespace의 기존 청크를 모두 새 청크로 교체
    ///
    /// 독자는 교체 전 또는 교체 후의 전체 상태만 봅니다.
    async fn replace_namespace(
        &self,
        namespace: Namespace,
        chunks: Vec<Chunk>,
        batch_size: usize,
    ) -> Result<usize>;

    /// 코사인 거리 오름차순 검색 (필터는 검색 전에 적용)
    async fn search(
        &self,
        namespace: Namespace,
        query_embedding: &[f32],
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// 필터에 맞는 청크를 (item_name, chunk_index) 순으로 조회
    async fn scan(
        &self,
        namespace: Namespace,
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<Chunk>>;

    async fn count(&self, namespace: Namespace) -> Result<usize>;
}

/// QA 인덱스 (async)
#[async_trait]
pub trait QaIndex: Send + Sync {
    /// 전체 QA 쌍 교체
    async fn replace_pairs(&self, pairs: Vec<QaPair>, batch_size: usize) -> Result<usize>;

    /// 코사인 거리 오름차순 검색
    ///
    /// `keyword`가 있으면 question 또는 answer에 포함된 행만 대상으로 합니다.
    async fn search_pairs(
        &self,
        query_embedding: &[f32],
        keyword: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredQa>>;

    async fn count_pairs(&self) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 (-1.0 ~ 1.0)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 코사인 거리 (0.0 ~ 2.0)
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// L2 정규화 (영벡터는 그대로 반환)
pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(item_name: &str, section: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: "c1".to_string(),
            item_name: item_name.to_string(),
            section: section.to_string(),
            chunk_index: 0,
            text: text.to_string(),
            embedding: vec![],
        }
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
        assert!(cosine_distance(&a, &a).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
        assert!((cosine_distance(&a, &c) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_empty() {
        let a: Vec<f32> = vec![];
        assert_eq!(cosine_similarity(&a, &a), 0.0);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_namespace_of_section() {
        assert_eq!(Namespace::of_section(HF_FUNCTION), Namespace::HealthFood);
        assert_eq!(Namespace::of_section(SECTION_SIDE_EFFECT), Namespace::Drug);
    }

    #[test]
    fn test_filter_matches() {
        let c = chunk("타이레놀정500밀리그람", SECTION_SIDE_EFFECT, "부작용: 발진");

        assert!(ChunkFilter::new().matches(&c));
        assert!(ChunkFilter::new().sections(["부작용", "이상반응"]).matches(&c));
        assert!(!ChunkFilter::new().sections(["효능"]).matches(&c));
        assert!(ChunkFilter::new().item_names(["타이레놀"]).matches(&c));
        assert!(ChunkFilter::new().keywords(["발진"]).matches(&c));
        assert!(!ChunkFilter::new().exact_items(["타이레놀"]).matches(&c));
        assert!(!ChunkFilter::new().section_prefix("hf_").matches(&c));
    }

    #[test]
    fn test_filter_to_sql() {
        assert_eq!(ChunkFilter::new().to_sql(), None);

        let sql = ChunkFilter::new()
            .sections(["부작용", "이상반응"])
            .item_names(["타이레놀"])
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "(section LIKE '%부작용%' ESCAPE '\\' OR section LIKE '%이상반응%' ESCAPE '\\') \
             AND (item_name LIKE '%타이레놀%' ESCAPE '\\')"
        );

        let sql = ChunkFilter::new()
            .section_prefix(HF_FUNCTION)
            .exact_items(["A's"])
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "section LIKE 'hf\\_function%' ESCAPE '\\' AND item_name IN ('A''s')"
        );
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%_A's"), "100\\%\\_A''s");
        assert_eq!(like_pattern("a\\b"), "a\\\\b");

        let sql = ChunkFilter::new().item_names(["50%정"]).to_sql().unwrap();
        assert_eq!(sql, "(item_name LIKE '%50\\%정%' ESCAPE '\\')");
    }
}
