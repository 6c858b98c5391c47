//! 일반 질문 처리
//!
//! 인사말, 비의료 질문, 병원 검색 요청은 고정 문구로 답하고,
//! 나머지는 검색된 청크(또는 질문만)로 LLM instruction 을 만듭니다.

use crate::knowledge::Chunk;
use crate::text::{normalize, take_chars};

use super::answer::CLINICIAN_LINE;
use super::intent::{contains_any, extract_med_names, HEALTH_FOOD_KEYS};
use super::symptom::contains_symptom_term;

/// 컨텍스트에 넣는 청크 본문 최대 길이
pub const MAX_CHUNK_CHARS: usize = 600;

/// 이 길이를 넘는 질문은 인사말로 보지 않습니다
const MAX_GREETING_CHARS: usize = 30;

const GREETING_PATTERNS: &[&str] = &[
    "안녕", "반가워", "반갑", "처음뵙", "헬로", "hello", "좋은아침", "좋은하루",
];

const NON_MEDICAL_KEYWORDS: &[&str] = &[
    "날씨", "주식", "코인", "비트코인", "부동산", "게임", "축구", "야구", "영화", "드라마", "음악",
    "노래", "연예인", "맛집", "여행", "정치", "선거", "코딩", "프로그래밍",
];

const MEDICAL_KEYWORDS: &[&str] = &[
    "약", "병", "증상", "치료", "통증", "아프", "아파", "질환", "의사", "약사", "복용", "처방",
    "건강", "감염", "진단", "검사", "수술", "백신", "혈압", "당뇨", "임신",
];

const FACILITY_KEYWORDS: &[&str] = &[
    "병원", "클리닉", "의원", "이비인후과", "내과", "외과", "소아과", "소아청소년과", "피부과",
    "안과", "치과", "산부인과", "정형외과", "신경과", "비뇨기과", "정신건강의학과", "한의원",
    "보건소", "응급실", "약국",
];

const SEARCH_KEYWORDS: &[&str] = &["검색", "찾"];

pub const GREETING_RESPONSE: &str = "안녕하세요!\n\n\
저는 의약품과 건강 정보를 안내하는 상담 어시스턴트입니다.\n\n\
다음과 같은 질문에 도움을 드릴 수 있습니다:\n\
- 약물의 효능, 용법, 부작용 정보\n\
- 증상에 따른 약 추천\n\
- 약물 상호작용 및 주의사항\n\
- 건강기능식품 정보\n\n\
궁금하신 점을 편하게 물어보세요. 정확한 진단과 복용은 의사 또는 약사와 상담하세요.";

pub const NON_MEDICAL_RESPONSE: &str = "죄송합니다. 저는 의약품과 건강 정보에 특화된 상담 서비스입니다.\n\n\
다음과 같은 질문에 답변할 수 있습니다:\n\
- 약물의 효능, 용법, 부작용\n\
- 증상에 따른 약 추천\n\
- 약물 상호작용 및 주의사항\n\
- 건강기능식품 정보\n\n\
의료/건강 관련 질문을 입력해주세요. 건강 고민은 의사 또는 약사와 상담하세요.";

pub const HOSPITAL_GUIDE: &str = "1. 병원 검색 방법\n\
- 지도 앱(네이버 지도, 카카오맵 등)에서 '지역명 + 진료과'(예: '강남역 이비인후과')로 검색하세요.\n\
- 건강보험심사평가원의 '병원·약국 찾기' 서비스에서 진료과목과 위치로 찾을 수 있습니다.\n\n\
2. 방문 전 확인 사항\n\
- 진료 시간과 휴진일을 전화나 앱으로 미리 확인하세요.\n\
- 복용 중인 약이 있다면 약 이름이나 처방전을 챙겨 가세요.\n\n\
3. 응급 상황\n\
- 호흡곤란, 의식 저하, 심한 흉통이 있으면 즉시 119에 연락하거나 가까운 응급실을 방문하세요.\n\
- 야간이나 휴일에는 응급의료포털(E-Gen)에서 문을 연 병원과 약국을 확인할 수 있습니다.\n\n\
정확한 진단과 치료는 의사 또는 약사와 상담하세요.";

// ============================================================================
// Guards
// ============================================================================

/// 짧은 인사말인지
pub fn is_greeting(question: &str) -> bool {
    let trimmed = question.trim();
    if trimmed.chars().count() > MAX_GREETING_CHARS {
        return false;
    }
    let q = normalize(trimmed).to_lowercase();
    GREETING_PATTERNS.iter().any(|p| q.contains(p))
}

/// 비의료 질문인지 (비의료 키워드가 있고 의료 단서가 하나도 없을 때)
pub fn is_non_medical(question: &str) -> bool {
    let q = normalize(question);
    if !contains_any(&q, NON_MEDICAL_KEYWORDS) {
        return false;
    }
    let medical = contains_any(&q, MEDICAL_KEYWORDS)
        || contains_symptom_term(&q)
        || contains_any(&q, HEALTH_FOOD_KEYS)
        || !extract_med_names(question).is_empty();
    !medical
}

/// 병원/진료과 + 검색 요청인지
pub fn is_hospital_search(question: &str) -> bool {
    let q = normalize(question);
    contains_any(&q, FACILITY_KEYWORDS) && contains_any(&q, SEARCH_KEYWORDS)
}

// ============================================================================
// LLM Instructions
// ============================================================================

/// 청크 목록을 참고 문서 블록으로
pub fn build_context(chunks: &[Chunk]) -> String {
    let mut blocks: Vec<String> = Vec::with_capacity(chunks.len() * 3);
    for (i, c) in chunks.iter().enumerate() {
        blocks.push(format!("[{}] {} / {}#{}", i, c.item_name, c.section, c.chunk_index));
        blocks.push(take_chars(&c.text, MAX_CHUNK_CHARS));
        blocks.push(String::new());
    }
    blocks.join("\n")
}

/// 일반 답변용 instruction
pub fn general_instruction(question: &str, chunks: &[Chunk]) -> String {
    let question = question.trim();
    if chunks.is_empty() {
        return format!(
            "너는 의약품과 일반 건강 정보를 설명하는 한국어 상담 어시스턴트이다.\n\n\
             아래 사용자의 질문에 대해, 네가 이미 학습한 의약·건강 지식을 사용해 \
             안전하고 보수적으로 답변해라.\n\n\
             [질문]\n{}\n\n[답변]\n",
            question
        );
    }

    format!(
        "너는 의약품과 일반 건강 정보를 설명하는 한국어 상담 어시스턴트이다.\n\n\
         [참고 문서]\n{}\n\n\
         [질문]\n{}\n\n\
         [지시]\n\
         1. 위 참고 문서 내용을 우선적으로 활용해 답변해라.\n\
         2. 문서 내용이 부족하면 네가 학습한 의료 지식을 활용해 설명해라.\n\
         3. 확실하지 않은 내용은 추측하지 말고 의료 상담을 권고하라.\n\n\
         [최종 답변]\n",
        build_context(chunks).trim_end(),
        question
    )
}

/// LLM 이 빈 답을 냈을 때의 대체 문구
pub fn empty_generation_fallback() -> String {
    format!(
        "죄송합니다. 지금은 이 질문에 대한 답변을 만들지 못했습니다.\n{}",
        CLINICIAN_LINE
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting() {
        assert!(is_greeting("안녕하세요"));
        assert!(is_greeting("Hello!"));
        assert!(!is_greeting("안녕하세요 타이레놀을 먹었는데 두통이 계속되고 속도 안 좋아서 다른 약을 먹어도 되는지 궁금합니다"));
        assert!(!is_greeting("폐렴 원인"));
    }

    #[test]
    fn test_non_medical() {
        assert!(is_non_medical("내일 서울 날씨 어때?"));
        assert!(!is_non_medical("여행 갈 때 멀미약 뭐가 좋아?"));
        assert!(!is_non_medical("폐렴 원인"));
    }

    #[test]
    fn test_hospital_search() {
        assert!(is_hospital_search("근처 이비인후과 찾는 방법"));
        assert!(is_hospital_search("소아과 병원 검색"));
        assert!(!is_hospital_search("병원 가야 할까요"));
        assert!(!is_hospital_search("두통약 찾아줘"));
    }

    #[test]
    fn test_hospital_guide_sections() {
        for heading in ["1. 병원 검색 방법", "2. 방문 전 확인 사항", "3. 응급 상황"] {
            assert!(HOSPITAL_GUIDE.contains(heading));
        }
        assert!(HOSPITAL_GUIDE.contains("의사 또는 약사"));
    }

    #[test]
    fn test_general_instruction() {
        let bare = general_instruction("폐렴 원인", &[]);
        assert!(bare.contains("[질문]\n폐렴 원인"));
        assert!(!bare.contains("[참고 문서]"));

        let chunk = Chunk {
            chunk_id: "c1".to_string(),
            item_name: "타이레놀정".to_string(),
            section: "효능효과".to_string(),
            chunk_index: 2,
            text: "가".repeat(700),
            embedding: vec![],
        };
        let with_context = general_instruction("타이레놀", &[chunk]);
        assert!(with_context.contains("[0] 타이레놀정 / 효능효과#2"));
        assert_eq!(with_context.matches('가').count(), MAX_CHUNK_CHARS);
    }
}
