//! 질의 의도 분류
//!
//! 공백을 제거한 질의를 고정 키워드 집합과 대조해 8개 의도 중 하나를 붙입니다.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::symptom::contains_symptom_term;
use crate::text::normalize;

// ============================================================================
// Keywords
// ============================================================================

pub const SIDE_EFFECT_KEYS: &[&str] = &["부작용", "이상반응"];

pub const EFFICACY_KEYS: &[&str] = &["효능", "효과", "어디에 좋", "무엇에 좋", "뭐에 좋"];

pub const DOSAGE_KEYS: &[&str] = &[
    "용법",
    "용량",
    "복용법",
    "먹는법",
    "먹는 방법",
    "하루 몇 번",
    "몇 번",
    "몇 회",
    "몇 알",
    "언제 먹",
    "언제 복용",
];

pub const INTERACTION_KEYS: &[&str] = &[
    "상호작용",
    "같이 먹어도",
    "같이 복용",
    "함께 먹어도",
    "함께 복용",
    "병용",
];

pub const WARNING_KEYS: &[&str] = &["주의사항", "주의", "경고"];

/// 약품명으로 보이는 토큰의 힌트
pub const MED_NAME_HINTS: &[&str] = &[
    "정", "캡슐", "액", "시럽", "산", "펜", "콜", "타이레놀", "판콜", "콜드",
];

/// "이 증상도 포함돼?" 류의 후속 질문
pub const FOLLOWUP_INCLUDE_KEYS: &[&str] = &[
    "포함돼",
    "포함되",
    "포함 안 돼",
    "포함 안 되",
    "해당돼",
    "해당되",
    "들어가",
    "들어있",
];

/// 건강기능식품 질문 키워드
pub const HEALTH_FOOD_KEYS: &[&str] = &[
    "영양제",
    "건강기능식품",
    "건기식",
    "비타민",
    "오메가3",
    "유산균",
    "프로바이오틱스",
];

static TOKEN_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w가-힣]+").unwrap());

// ============================================================================
// Intent
// ============================================================================

/// 질의 의도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SideEffect,
    Efficacy,
    Dosage,
    Interaction,
    Warning,
    Symptom,
    Compare,
    General,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::SideEffect => "side_effect",
            Intent::Efficacy => "efficacy",
            Intent::Dosage => "dosage",
            Intent::Interaction => "interaction",
            Intent::Warning => "warning",
            Intent::Symptom => "symptom",
            Intent::Compare => "compare",
            Intent::General => "general",
        }
    }

    /// 청크 검색 시 section 부분 문자열 필터 (빈 목록 = 필터 없음)
    pub fn section_filter(self) -> &'static [&'static str] {
        match self {
            Intent::SideEffect => &["부작용", "이상반응"],
            Intent::Efficacy => &["효능"],
            Intent::Dosage => &["용법", "용량"],
            Intent::Interaction => &["상호작용"],
            Intent::Warning => &["주의", "경고"],
            Intent::Symptom | Intent::Compare | Intent::General => &[],
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Detection
// ============================================================================

/// 공백 제거된 텍스트가 키워드(공백 제거 후 비교) 중 하나를 포함하는지
pub fn contains_any(normalized: &str, keys: &[&str]) -> bool {
    keys.iter().any(|k| normalized.contains(normalize(k).as_str()))
}

/// 질의 의도 분류
///
/// 1. 약품명 토큰이 2개 이상이면 `Compare`
/// 2. 부작용 → 효능 → 용법 → 상호작용 → 주의 키워드 순서로 대조
/// 3. 건강기능식품 키워드면 `Efficacy`
/// 4. 증상어 + 포함 여부 후속 질문이면 `Efficacy`
/// 5. 증상어만 있으면 `Symptom`
/// 6. 나머지는 `General`
pub fn detect_intent(question: &str) -> Intent {
    let q = normalize(question);

    if extract_med_names(question).len() >= 2 {
        return Intent::Compare;
    }

    let keyword_sets: [(&[&str], Intent); 5] = [
        (SIDE_EFFECT_KEYS, Intent::SideEffect),
        (EFFICACY_KEYS, Intent::Efficacy),
        (DOSAGE_KEYS, Intent::Dosage),
        (INTERACTION_KEYS, Intent::Interaction),
        (WARNING_KEYS, Intent::Warning),
    ];
    for (keys, intent) in keyword_sets {
        if contains_any(&q, keys) {
            return intent;
        }
    }

    if contains_any(&q, HEALTH_FOOD_KEYS) {
        return Intent::Efficacy;
    }

    if contains_symptom_term(&q) {
        if contains_any(&q, FOLLOWUP_INCLUDE_KEYS) {
            return Intent::Efficacy;
        }
        return Intent::Symptom;
    }

    Intent::General
}

/// 건강기능식품 질문 여부
pub fn has_health_food_keyword(question: &str) -> bool {
    contains_any(&normalize(question), HEALTH_FOOD_KEYS)
}

/// 질의에서 약품명 후보 추출
///
/// 단어가 아닌 문자로 토큰을 나누고, 2자 이상이면서 약품명 힌트를 포함한
/// 토큰을 등장 순서대로 중복 없이 반환합니다.
pub fn extract_med_names(question: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for token in TOKEN_SPLIT.split(question) {
        if token.chars().count() < 2 {
            continue;
        }
        if !MED_NAME_HINTS.iter().any(|h| token.contains(h)) {
            continue;
        }
        if !names.iter().any(|n| n == token) {
            names.push(token.to_string());
        }
    }
    names
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_effect() {
        assert_eq!(detect_intent("타이레놀 부작용 알려줘"), Intent::SideEffect);
        assert_eq!(detect_intent("이상 반응이 있나요"), Intent::SideEffect);
    }

    #[test]
    fn test_compare() {
        assert_eq!(detect_intent("판콜에이 vs 타이레놀"), Intent::Compare);
        assert_eq!(
            detect_intent("게보린정이랑 타이레놀 부작용 차이"),
            Intent::Compare
        );
    }

    #[test]
    fn test_keyword_order() {
        assert_eq!(detect_intent("이 약 효능이 뭐야"), Intent::Efficacy);
        assert_eq!(detect_intent("어디에 좋아요?"), Intent::Efficacy);
        assert_eq!(detect_intent("하루 몇 번 먹어요?"), Intent::Dosage);
        assert_eq!(detect_intent("하루몇번 먹어요?"), Intent::Dosage);
        assert_eq!(detect_intent("술이랑 같이 먹어도 돼?"), Intent::Interaction);
        assert_eq!(detect_intent("임산부 주의사항"), Intent::Warning);
    }

    #[test]
    fn test_health_food_is_efficacy() {
        assert_eq!(detect_intent("비타민C 영양제 추천"), Intent::Efficacy);
        assert_eq!(detect_intent("유산균 뭐가 좋아"), Intent::Efficacy);
    }

    #[test]
    fn test_symptom() {
        assert_eq!(
            detect_intent("속이 쓰리고 두통도 있어요 무슨 약 먹어야 하나요"),
            Intent::Symptom
        );
        assert_eq!(detect_intent("기침이 심해요"), Intent::Symptom);
    }

    #[test]
    fn test_symptom_followup_is_efficacy() {
        assert_eq!(detect_intent("두통도 포함돼?"), Intent::Efficacy);
    }

    #[test]
    fn test_general() {
        assert_eq!(detect_intent("폐렴 증상"), Intent::General);
        assert_eq!(detect_intent("근처 이비인후과 찾는 방법"), Intent::General);
        assert_eq!(detect_intent("안녕하세요"), Intent::General);
    }

    #[test]
    fn test_whitespace_insensitive() {
        let queries = ["타이레놀 부작용", "속이 쓰려요", "하루 몇 번", "폐렴 증상"];
        for q in queries {
            let spaced: String = q.chars().flat_map(|c| [c, ' ']).collect();
            assert_eq!(detect_intent(q), detect_intent(&normalize(q)));
            assert_eq!(detect_intent(q), detect_intent(&format!("\u{3000}{}\t", q)));
            // 글자 사이 공백은 약품명 토큰을 깨뜨리므로 키워드 의도만 비교
            if extract_med_names(q).is_empty() {
                assert_eq!(detect_intent(q), detect_intent(&spaced));
            }
        }
    }

    #[test]
    fn test_extract_med_names() {
        assert_eq!(
            extract_med_names("판콜에이 vs 타이레놀"),
            vec!["판콜에이", "타이레놀"]
        );
        assert_eq!(
            extract_med_names("타이레놀, 타이레놀 또 타이레놀"),
            vec!["타이레놀"]
        );
        assert!(extract_med_names("두통 약 추천").is_empty());
    }

    #[test]
    fn test_section_filter() {
        assert_eq!(Intent::SideEffect.section_filter(), &["부작용", "이상반응"]);
        assert!(Intent::General.section_filter().is_empty());
        assert_eq!(Intent::Compare.to_string(), "compare");
    }
}
