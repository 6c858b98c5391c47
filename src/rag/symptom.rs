//! 증상 기반 약품 추천
//!
//! 질문에서 표준 증상 키를 뽑고, 효능효과 청크를 증상/동의어 출현으로
//! 점수화해 제품 단위로 추천합니다.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::knowledge::{Chunk, ChunkFilter, ChunkIndex, Namespace};
use crate::text::normalize;

use super::answer::CLINICIAN_LINE;

// ============================================================================
// Vocabulary
// ============================================================================

/// 표준 증상 키 → 동의어/관련 카테고리 (공백 없는 형태)
pub const SYMPTOM_VOCABULARY: &[(&str, &[&str])] = &[
    ("두통", &["머리아픔", "머리가아프", "머리가아파", "머리아프", "머리아파", "편두통", "진통"]),
    ("발열", &["열이나", "열나", "열이있", "고열", "미열", "해열"]),
    ("기침", &["잔기침", "마른기침", "진해", "거담"]),
    ("가래", &["객담", "가래끓"]),
    ("콧물", &["콧물감기", "비염", "코흘림"]),
    ("코막힘", &["코막혀", "코가막", "비충혈"]),
    ("인후통", &["목아픔", "목아파", "목이아프", "목통증", "인후염", "목감기"]),
    ("감기", &["감기증상", "종합감기", "감기몸살"]),
    ("몸살", &["몸살기", "오한"]),
    ("근육통", &["근육통증", "근육이아프", "어깨결림", "관절통"]),
    ("생리통", &["월경통", "생리할때", "생리때"]),
    (
        "속쓰림",
        &["속이쓰림", "속이쓰리", "속이쓰려", "속쓰리", "속쓰려", "명치쓰림", "위산과다", "위염", "신트림"],
    ),
    ("소화불량", &["더부룩", "체했", "체기", "소화가안", "위부팽만"]),
    ("메스꺼움", &["매스꺼움", "구역", "오심", "울렁거"]),
    ("구토", &["토할", "토했", "토해"]),
    ("복통", &["배아픔", "배가아프", "배아파", "위경련"]),
    ("설사", &["묽은변", "배탈"]),
    ("변비", &["배변곤란", "변이안"]),
    ("치통", &["이가아프", "잇몸"]),
    ("알레르기", &["알러지", "두드러기", "가려움"]),
    ("멀미", &["차멀미", "뱃멀미"]),
    ("불면", &["잠이안", "수면장애", "불면증"]),
];

/// 증상 추출 시 버리는 토큰
const SYMPTOM_STOPWORDS: &[&str] = &[
    "약이", "약을", "약은", "약좀", "무슨", "어떤", "어느", "무슨약", "어떤약", "좋을까", "좋을까요",
    "추천", "추천해줘", "먹어야", "먹을까", "먹으면", "골라", "골라줘", "정해줘", "있는데", "인데",
    "있어", "나는", "제가", "입니다", "하는데",
];

const CHILD_HINTS: &[&str] = &["아이", "어린이", "소아", "키즈", "초등학생"];
const ADULT_HINTS: &[&str] = &["성인", "어른", "어른용", "성인용"];
const CHILD_PRODUCT_HINTS: &[&str] = &["어린이", "소아", "키즈", "베이비", "키드"];
const ADULT_PRODUCT_HINTS: &[&str] = &["성인", "어른용", "성인용"];

/// 이 나이 미만이면 어린이
const CHILD_AGE_LIMIT: u32 = 12;

static NON_HANGUL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^가-힣]+").unwrap());
static AGE_YEARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*살").unwrap());

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeGroup {
    Child,
    Adult,
    Unknown,
}

/// 제품 단위 추천 결과
#[derive(Debug, Clone)]
pub struct SymptomRecommendation {
    pub item_name: String,
    pub score: i32,
    /// "어린이용" / "성인용"
    pub age_tag: Option<&'static str>,
    /// 최고 점수 청크
    pub chunk: Chunk,
    /// 이 제품의 청크들에서 한 번이라도 맞은 증상 키
    pub matched: BTreeSet<&'static str>,
}

// ============================================================================
// Extraction
// ============================================================================

/// 공백 제거된 텍스트에 증상어(키 또는 동의어)가 있는지
pub fn contains_symptom_term(normalized: &str) -> bool {
    SYMPTOM_VOCABULARY
        .iter()
        .any(|(key, synonyms)| normalized.contains(key) || synonyms.iter().any(|s| normalized.contains(s)))
}

/// 질문에서 표준 증상 키 추출 (첫 출현 순서)
///
/// 한글 토큰(2자 이상)에서 불용어를 빼고 이어 붙인 뒤
/// 키와 동의어를 찾습니다. 동의어로 찾은 경우에도 키를 반환합니다.
pub fn extract_symptoms(question: &str) -> Vec<&'static str> {
    let joined: String = NON_HANGUL
        .split(question)
        .filter(|t| t.chars().count() >= 2)
        .filter(|t| !SYMPTOM_STOPWORDS.contains(t))
        .collect();

    let mut found: Vec<(usize, usize, &'static str)> = Vec::new();
    for (order, (key, synonyms)) in SYMPTOM_VOCABULARY.iter().enumerate() {
        let first = std::iter::once(*key)
            .chain(synonyms.iter().copied())
            .filter_map(|term| joined.find(term))
            .min();
        if let Some(pos) = first {
            found.push((pos, order, *key));
        }
    }

    found.sort();
    found.into_iter().map(|(_, _, key)| key).collect()
}

/// 질문에서 연령대 추정
pub fn detect_age_group(question: &str) -> AgeGroup {
    let q = normalize(question);
    if CHILD_HINTS.iter().any(|h| q.contains(h)) {
        return AgeGroup::Child;
    }
    if ADULT_HINTS.iter().any(|h| q.contains(h)) {
        return AgeGroup::Adult;
    }

    if let Some(age) = AGE_YEARS
        .captures(question)
        .and_then(|caps| caps[1].parse::<u32>().ok())
    {
        return if age < CHILD_AGE_LIMIT {
            AgeGroup::Child
        } else {
            AgeGroup::Adult
        };
    }

    AgeGroup::Unknown
}

/// 제품명으로 대상 연령대 추정
pub fn classify_product_age(item_name: &str) -> AgeGroup {
    let name = normalize(item_name);
    if CHILD_PRODUCT_HINTS.iter().any(|h| name.contains(h)) {
        AgeGroup::Child
    } else if ADULT_PRODUCT_HINTS.iter().any(|h| name.contains(h)) {
        AgeGroup::Adult
    } else {
        AgeGroup::Unknown
    }
}

fn synonyms_of(key: &str) -> &'static [&'static str] {
    SYMPTOM_VOCABULARY
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, s)| *s)
        .unwrap_or(&[])
}

// ============================================================================
// Ranking
// ============================================================================

/// 효능효과 청크를 점수화해 제품별 상위 `top_n`개 반환
///
/// - 증상 키 출현 +2, 동의어 출현마다 +1
/// - 연령대 일치 +1, 불일치 -1
/// - 제품별 최고 점수 청크만 남김
/// - 모든 증상을 맞춘 제품(strict)이 있으면 그것만, 없으면 전체(loose)
pub fn rank_products(
    chunks: &[Chunk],
    symptoms: &[&'static str],
    age_group: AgeGroup,
    top_n: usize,
) -> Vec<SymptomRecommendation> {
    if symptoms.is_empty() {
        return vec![];
    }

    let mut best: HashMap<String, SymptomRecommendation> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for chunk in chunks {
        let text = normalize(&format!("{} {}", chunk.text, chunk.item_name));
        let mut score = 0;
        let mut matched = BTreeSet::new();

        for &symptom in symptoms {
            if text.contains(symptom) {
                score += 2;
                matched.insert(symptom);
            }
            for synonym in synonyms_of(symptom) {
                if text.contains(synonym) {
                    score += 1;
                    matched.insert(symptom);
                }
            }
        }
        if score <= 0 {
            continue;
        }

        let mut age_tag = None;
        match (age_group, classify_product_age(&chunk.item_name)) {
            (AgeGroup::Child, AgeGroup::Child) => {
                score += 1;
                age_tag = Some("어린이용");
            }
            (AgeGroup::Child, AgeGroup::Adult) => score -= 1,
            (AgeGroup::Adult, AgeGroup::Adult) => {
                score += 1;
                age_tag = Some("성인용");
            }
            (AgeGroup::Adult, AgeGroup::Child) => {
                score -= 1;
                age_tag = Some("어린이용");
            }
            _ => {}
        }
        if score <= 0 {
            continue;
        }

        match best.get_mut(&chunk.item_name) {
            Some(existing) => {
                existing.matched.extend(matched);
                if score > existing.score {
                    existing.score = score;
                    existing.age_tag = age_tag;
                    existing.chunk = chunk.clone();
                }
            }
            None => {
                order.push(chunk.item_name.clone());
                best.insert(
                    chunk.item_name.clone(),
                    SymptomRecommendation {
                        item_name: chunk.item_name.clone(),
                        score,
                        age_tag,
                        chunk: chunk.clone(),
                        matched,
                    },
                );
            }
        }
    }

    let candidates: Vec<SymptomRecommendation> =
        order.into_iter().filter_map(|name| best.remove(&name)).collect();

    let strict: Vec<SymptomRecommendation> = candidates
        .iter()
        .filter(|r| symptoms.iter().all(|s| r.matched.contains(s)))
        .cloned()
        .collect();

    let mut picked = if strict.is_empty() { candidates } else { strict };
    // 안정 정렬: 동점이면 스캔 순서(item_name 순) 유지
    picked.sort_by(|a, b| b.score.cmp(&a.score));
    picked.truncate(top_n);
    picked
}

/// 증상 기반 추천
///
/// 증상이 없으면 인덱스를 조회하지 않고 빈 목록을 반환합니다.
pub async fn recommend_by_symptom(
    index: &dyn ChunkIndex,
    question: &str,
    top_n: usize,
) -> Result<Vec<SymptomRecommendation>> {
    let symptoms = extract_symptoms(question);
    if symptoms.is_empty() {
        return Ok(vec![]);
    }

    let age_group = detect_age_group(question);
    let filter = ChunkFilter::new().sections(["효능"]);
    let chunks = index.scan(Namespace::Drug, &filter, usize::MAX).await?;

    let recs = rank_products(&chunks, &symptoms, age_group, top_n);
    tracing::debug!(
        "Symptom recommend: symptoms={:?}, age={:?}, scanned={}, picked={}",
        symptoms,
        age_group,
        chunks.len(),
        recs.len()
    );
    Ok(recs)
}

// ============================================================================
// Answer
// ============================================================================

/// 증상 추천 답변
pub fn build_symptom_answer(question: &str, recs: &[SymptomRecommendation]) -> String {
    if recs.is_empty() {
        return format!(
            "참고 문서에서 해당 증상에 맞는 약을 찾지 못했습니다.\n{}",
            CLINICIAN_LINE
        );
    }

    let symptoms = extract_symptoms(question);
    let symptom_line = if symptoms.is_empty() {
        question.trim().to_string()
    } else {
        symptoms.join(", ")
    };

    let mut lines = vec![
        "1. 증상".to_string(),
        format!("- {}", symptom_line),
        String::new(),
        "2. 추천 약품".to_string(),
    ];
    for rec in recs {
        match rec.age_tag {
            Some(tag) => lines.push(format!("- {} ({})", rec.item_name, tag)),
            None => lines.push(format!("- {}", rec.item_name)),
        }
    }
    lines.push(String::new());
    lines.push("3. 선택 기준 요약".to_string());
    lines.push(
        "- 해당 약품들은 효능·효과에 질문한 증상(또는 관련 카테고리)이 포함되어 있습니다."
            .to_string(),
    );
    lines.push("- 실제 복용 전에는 반드시 의사 또는 약사와 상의해야 합니다.".to_string());

    lines.join("\n")
}

// ============================================================================
// Tests
// ============================================================================
