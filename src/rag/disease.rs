//! 질병 QA 후처리
//!
//! "폐렴 증상" 같은 질문에서 (질병, 주제)를 뽑고, QA 답변 원문을
//! 주제에 맞게 문장 단위로 걸러냅니다. 증상/합병증은 템플릿으로 끝내고,
//! 나머지 주제는 걸러낸 문장만 LLM에 넘깁니다.

use once_cell::sync::Lazy;
use regex::Regex;

use super::answer::ensure_clinician_line;
use super::symptom::SYMPTOM_VOCABULARY;
use crate::text::{split_sentences, take_chars};

/// LLM에 넘기는 참고 문장 최대 길이
pub const MAX_LLM_CONTEXT_CHARS: usize = 600;

const MAX_BULLETS: usize = 3;

pub const TOPIC_SYMPTOMS: &str = "증상";
pub const TOPIC_COMPLICATIONS: &str = "합병증";

static DISEASE_TOPIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([가-힣A-Za-z0-9]+)\s*(증상|원인|치료|검사|진단|합병증|예방)").unwrap()
});

static DEFINITION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\S+(은|는)\s.*(질환|질병|감염|상태)",
        r"(질환|질병|감염|증후군)\s*(이다|입니다)",
        r"에 의해.*(발생|감염|유발)",
        r"로 인해 발생",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// 질병명 뒤에 붙는 조사
const TRAILING_PARTICLES: &[char] = &['의', '은', '는', '이', '가'];

/// 질병명으로 보지 않는 단어
const NOT_DISEASE: &[&str] = &["무슨", "어떤", "주요", "대표", "일반", "흔한", "약", "질병", "질환"];

const SYMPTOM_CUT_MARKERS: &[&str] = &["치료", "예방", "검사", "진단", "합병증", "X-ray", "X선", "방사선"];
const COMPLICATION_CUT_MARKERS: &[&str] = &["치료", "예방"];

const EXTRA_SYMPTOM_HINTS: &[&str] = &[
    "열", "호흡곤란", "숨", "흉통", "오한", "피로", "통증", "발진", "식욕", "어지러",
];

const SEVERE_COMPLICATIONS: &[&str] = &["패혈증", "농흉", "폐농양", "호흡부전", "쇼크"];

/// 주제별로 남길 문장의 단서
const TOPIC_HINTS: &[(&str, &[&str])] = &[
    ("원인", &["원인", "세균", "바이러스", "감염", "발생", "유발", "때문"]),
    ("치료", &["치료", "약물", "항생제", "수술", "요법", "복용", "투여"]),
    ("예방", &["예방", "백신", "접종", "위생", "손씻기", "금연", "생활"]),
    ("검사", &["검사", "진단", "촬영", "혈액", "X-ray", "X선", "청진"]),
    ("진단", &["진단", "검사", "촬영", "혈액", "X-ray", "X선", "청진"]),
];

// ============================================================================
// Types
// ============================================================================

/// 질병/주제 질의
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiseaseQuery {
    pub disease: String,
    pub topic: String,
}

/// 후처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiseaseAnswer {
    /// 템플릿으로 완성된 답변
    Direct(String),
    /// LLM 에 넘길 instruction
    NeedsLlm(String),
}

// ============================================================================
// Extraction
// ============================================================================

/// 질문에서 (질병, 주제) 추출
///
/// 주제 앞 단어가 "주요" 같은 수식어면 그 앞 단어들을 차례로 봅니다.
pub fn extract_disease_topic(question: &str) -> Option<DiseaseQuery> {
    let caps = DISEASE_TOPIC.captures(question)?;
    let word = caps.get(1)?;
    let topic = caps[2].to_string();

    let preceding = question[..word.start()]
        .split_whitespace()
        .rev()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()));
    let disease = std::iter::once(word.as_str())
        .chain(preceding)
        .map(|w| w.trim_end_matches(TRAILING_PARTICLES))
        .find(|w| is_disease_word(w))?;

    Some(DiseaseQuery {
        disease: disease.to_string(),
        topic,
    })
}

fn is_disease_word(word: &str) -> bool {
    !word.is_empty() && !NOT_DISEASE.contains(&word)
}

/// "X는 ... 질환이다" 류의 정의 문장인지
pub fn is_definition_sentence(sentence: &str) -> bool {
    DEFINITION_PATTERNS.iter().any(|re| re.is_match(sentence))
}

fn cut_at_first<'a>(text: &'a str, markers: &[&str]) -> &'a str {
    let cut = markers.iter().filter_map(|m| text.find(m)).min();
    match cut {
        Some(idx) => &text[..idx],
        None => text,
    }
}

fn has_symptom_hint(sentence: &str) -> bool {
    sentence.contains("증상")
        || SYMPTOM_VOCABULARY.iter().any(|(key, _)| sentence.contains(key))
        || EXTRA_SYMPTOM_HINTS.iter().any(|h| sentence.contains(h))
}

/// 정의가 아니면서 조건에 맞는 문장 최대 3개
fn pick_sentences(text: &str, keep: impl Fn(&str) -> bool) -> Vec<String> {
    split_sentences(text)
        .into_iter()
        .filter(|s| !is_definition_sentence(s) && keep(s))
        .take(MAX_BULLETS)
        .collect()
}

fn bullets(heading: String, sentences: &[String], missing: &str) -> String {
    let mut lines = vec![heading];
    if sentences.is_empty() {
        lines.push(format!("- {}", missing));
    }
    for s in sentences {
        lines.push(format!("- {}", s));
    }
    ensure_clinician_line(&lines.join("\n"))
}

// ============================================================================
// Post-processing
// ============================================================================

/// QA 답변을 주제에 맞게 정리
pub fn postprocess_qa(question: &str, query: &DiseaseQuery, answer: &str) -> DiseaseAnswer {
    match query.topic.as_str() {
        TOPIC_SYMPTOMS => {
            // 잘라낸 앞부분에서만 고릅니다
            let head = cut_at_first(answer, SYMPTOM_CUT_MARKERS);
            let picked = pick_sentences(head, has_symptom_hint);
            DiseaseAnswer::Direct(bullets(
                format!("1. {}의 주요 증상", query.disease),
                &picked,
                "참고 문서에서 증상 정보를 찾지 못했습니다.",
            ))
        }
        TOPIC_COMPLICATIONS => {
            let head = cut_at_first(answer, COMPLICATION_CUT_MARKERS);
            let mut picked = pick_sentences(head, |s| {
                s.contains("합병증") || SEVERE_COMPLICATIONS.iter().any(|c| s.contains(c))
            });
            if picked.is_empty() {
                picked = pick_sentences(head, |_| true);
            }
            DiseaseAnswer::Direct(bullets(
                format!("1. {}의 합병증", query.disease),
                &picked,
                "참고 문서에서 합병증 정보를 찾지 못했습니다.",
            ))
        }
        topic => DiseaseAnswer::NeedsLlm(topic_instruction(question, query, topic, answer)),
    }
}

/// 주제 단서가 있는 문장만 모아 LLM instruction 구성
fn topic_instruction(question: &str, query: &DiseaseQuery, topic: &str, answer: &str) -> String {
    let hints: &[&str] = TOPIC_HINTS
        .iter()
        .find(|(t, _)| *t == topic)
        .map(|(_, h)| *h)
        .unwrap_or(&[]);

    let sentences = split_sentences(answer);
    let matching: Vec<&String> = sentences
        .iter()
        .filter(|s| hints.iter().any(|h| s.contains(h)))
        .collect();
    let reference = if matching.is_empty() {
        sentences.join(" ")
    } else {
        matching
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    };
    let reference = take_chars(&reference, MAX_LLM_CONTEXT_CHARS);

    format!(
        "너는 한국어 의료 상담 어시스턴트이다.\n\
         아래 [참고 내용]만 사용해 '{disease}'의 {topic}에 대해 3~4문장으로 설명해라.\n\
         참고 내용에 없는 내용은 추측하지 말고, 마지막에 의사 또는 약사와 상담하라고 안내해라.\n\n\
         [참고 내용]\n{reference}\n\n\
         [질문]\n{question}\n\n\
         [답변]\n",
        disease = query.disease,
        topic = topic,
        reference = reference,
        question = question.trim(),
    )
}

// ============================================================================
// Tests
// ============================================================================
