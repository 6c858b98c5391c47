//! 의도별 답변 빌더
//!
//! 검색된 청크에서 대상 청크 하나를 고르고, 섹션 라벨을 떼어낸 뒤
//! 번호 붙은 고정 형식으로 답변을 만듭니다. 모든 빌더는 순수 함수입니다.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::knowledge::Chunk;
use crate::text::{normalize, short};

/// 모든 최종 답변에 붙는 상담 권고 문장
pub const CLINICIAN_LINE: &str = "정확한 진단과 복용 여부는 반드시 의사 또는 약사와 상담하세요.";

/// 이미 상담 권고가 들어 있다고 보는 표현
const CONSULT_PHRASES: &[&str] = &["의사 또는 약사", "의사나 약사", "의사·약사", "의사 혹은 약사"];

/// 부작용 답변에서 주의 문장으로 끌어올릴 단어
const CAUTION_MARKERS: &[&str] = &["중지", "악화", "지속", "새로운 증상", "의사", "약사"];

const MAX_SIDE_EFFECTS: usize = 6;
const MAX_SIDE_EFFECT_CAUTIONS: usize = 3;
const COMPARE_FIELD_CHARS: usize = 80;

static LIST_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,，\n]").unwrap());
static NAME_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[()\s]").unwrap());

// ============================================================================
// Helper Functions
// ============================================================================

/// 상담 권고가 없으면 끝에 붙입니다
pub fn ensure_clinician_line(answer: &str) -> String {
    let answer = answer.trim_end();
    if CONSULT_PHRASES.iter().any(|p| answer.contains(p)) {
        return answer.to_string();
    }
    if answer.is_empty() {
        return CLINICIAN_LINE.to_string();
    }
    format!("{}\n\n{}", answer, CLINICIAN_LINE)
}

/// 첫 번째로 발견되는 `라벨:` 이후 본문만 남깁니다
///
/// 라벨 목록 순서대로 찾고, 본문 중간에서 콜론 없이 나온 라벨은 무시합니다.
/// 맨 앞의 라벨은 콜론 없이 공백만 뒤따라도 잘라냅니다.
/// 라벨이 없으면 공백만 정리해 그대로 반환합니다.
pub fn strip_label(text: &str, labels: &[&str]) -> String {
    for label in labels {
        for (idx, _) in text.match_indices(label) {
            let after = &text[idx + label.len()..];
            let rest = after.trim_start();
            if let Some(body) = rest.strip_prefix(':').or_else(|| rest.strip_prefix('：')) {
                return body.trim().to_string();
            }
        }
    }

    let trimmed = text.trim();
    for label in labels {
        if let Some(rest) = trimmed.strip_prefix(label) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return rest.trim().to_string();
            }
        }
    }
    trimmed.to_string()
}

/// 답변 대상 청크 선택
///
/// 1. 제품명 토큰이 질문에 들어 있는 첫 청크
/// 2. 선호 섹션에 해당하는 첫 청크
/// 3. 첫 청크
pub fn pick_target_chunk<'a>(
    question: &str,
    chunks: &'a [Chunk],
    prefer_sections: &[&str],
) -> Option<&'a Chunk> {
    let q = normalize(question);

    let by_name = chunks.iter().find(|c| {
        let name = normalize(&c.item_name);
        NAME_SPLIT
            .split(&name)
            .map(str::trim)
            .any(|tok| !tok.is_empty() && q.contains(tok))
    });
    if by_name.is_some() {
        return by_name;
    }

    for section in prefer_sections {
        if let Some(c) = chunks.iter().find(|c| c.section.contains(section)) {
            return Some(c);
        }
    }

    chunks.first()
}

fn flatten(text: &str) -> String {
    text.replace(['\r', '\n'], " ").trim().to_string()
}

// ============================================================================
// Intent Builders
// ============================================================================

/// 섹션 하나짜리 요약 답변의 형식
struct SingleSection {
    labels: &'static [&'static str],
    prefer_sections: &'static [&'static str],
    heading: &'static str,
    subject: &'static str,
}

const EFFICACY: SingleSection = SingleSection {
    labels: &["효능효과", "효능"],
    prefer_sections: &["효능효과", "효능"],
    heading: "1. 효능·효과",
    subject: "효능·효과",
};

const DOSAGE: SingleSection = SingleSection {
    labels: &["용법용량"],
    prefer_sections: &["용법용량"],
    heading: "1. 용법·용량 요약",
    subject: "용법·용량",
};

const INTERACTION: SingleSection = SingleSection {
    labels: &["상호작용"],
    prefer_sections: &["상호작용"],
    heading: "1. 약물 상호작용 요약",
    subject: "약물 상호작용",
};

const WARNING: SingleSection = SingleSection {
    labels: &["사용상 주의사항", "주의사항", "주의", "경고"],
    prefer_sections: &["사용상 주의사항", "주의사항", "주의", "경고"],
    heading: "1. 주의사항·경고 요약",
    subject: "주의사항·경고",
};

fn not_found(subject: &str) -> String {
    ensure_clinician_line(&format!(
        "참고 문서에서 해당 약의 {} 정보를 찾지 못했습니다.",
        subject
    ))
}

fn build_single_section(question: &str, chunks: &[Chunk], layout: &SingleSection) -> String {
    let Some(chunk) = pick_target_chunk(question, chunks, layout.prefer_sections) else {
        return not_found(layout.subject);
    };

    let core = flatten(&strip_label(&chunk.text, layout.labels));
    let body = if core.is_empty() {
        format!("{} 정보를 추출할 수 없습니다.", layout.subject)
    } else {
        core
    };

    ensure_clinician_line(&format!(
        "{}\n- [{}] {}",
        layout.heading, chunk.item_name, body
    ))
}

/// 부작용 답변: 주요 부작용 + 복용 시 주의사항
pub fn build_side_effect_answer(question: &str, chunks: &[Chunk]) -> String {
    let Some(chunk) = pick_target_chunk(question, chunks, &["부작용", "이상반응"]) else {
        return not_found("부작용");
    };

    let core = strip_label(&chunk.text, &["부작용", "이상반응"]);
    let parts: Vec<&str> = LIST_SPLIT
        .split(&core)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut lines = vec![format!("1. 주요 부작용 ({})", chunk.item_name)];
    if parts.is_empty() {
        lines.push("- 부작용 정보를 추출할 수 없습니다.".to_string());
    }
    for part in parts.iter().take(MAX_SIDE_EFFECTS) {
        lines.push(format!("- {}", part));
    }

    lines.push(String::new());
    lines.push("2. 복용 시 주의사항".to_string());
    let cautions: Vec<&&str> = parts
        .iter()
        .filter(|p| CAUTION_MARKERS.iter().any(|m| p.contains(m)))
        .take(MAX_SIDE_EFFECT_CAUTIONS)
        .collect();
    if cautions.is_empty() {
        lines.push(
            "- 통증이나 발열 등이 지속되거나 악화되거나, 새로운 증상이 나타나면 \
             복용을 중지하고 의사 또는 약사와 상의하십시오."
                .to_string(),
        );
    }
    for caution in cautions {
        lines.push(format!("- {}", caution));
    }

    ensure_clinician_line(&lines.join("\n"))
}

pub fn build_efficacy_answer(question: &str, chunks: &[Chunk]) -> String {
    build_single_section(question, chunks, &EFFICACY)
}

pub fn build_dosage_answer(question: &str, chunks: &[Chunk]) -> String {
    build_single_section(question, chunks, &DOSAGE)
}

pub fn build_interaction_answer(question: &str, chunks: &[Chunk]) -> String {
    build_single_section(question, chunks, &INTERACTION)
}

pub fn build_warning_answer(question: &str, chunks: &[Chunk]) -> String {
    build_single_section(question, chunks, &WARNING)
}

// ============================================================================
// Compare
// ============================================================================

/// 비교용 약품 요약 (섹션별 한 청크)
#[derive(Debug, Clone, Default)]
pub struct DrugProfile {
    /// 질문에 적힌 약 이름
    pub query_name: String,
    /// 인덱스에서 찾은 제품명
    pub item_name: Option<String>,
    pub efficacy: Option<Chunk>,
    pub side_effect: Option<Chunk>,
    pub dosage: Option<Chunk>,
    pub caution: Option<Chunk>,
}

impl DrugProfile {
    pub fn new(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            ..Self::default()
        }
    }

    /// 답변에 쓰인 청크들
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        [&self.efficacy, &self.side_effect, &self.dosage, &self.caution]
            .into_iter()
            .flatten()
    }

    fn field(chunk: &Option<Chunk>, labels: &[&str]) -> String {
        match chunk {
            Some(c) => {
                let body = flatten(&strip_label(&c.text, labels));
                if body.is_empty() {
                    "정보 없음".to_string()
                } else {
                    short(&body, COMPARE_FIELD_CHARS)
                }
            }
            None => "문서에서 찾지 못했습니다".to_string(),
        }
    }
}

/// 두 약품 비교 답변 (6개 섹션)
pub fn build_compare_answer(a: &DrugProfile, b: &DrugProfile) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("1. 기본 정보".to_string());
    for p in [a, b] {
        let found = p
            .item_name
            .as_deref()
            .unwrap_or("참고 문서에서 제품을 찾지 못했습니다");
        lines.push(format!("- {}: {}", p.query_name, found));
    }

    let sections: [(&str, fn(&DrugProfile) -> &Option<Chunk>, &[&str]); 4] = [
        ("2. 효능·효과", |p| &p.efficacy, &["효능효과", "효능"]),
        ("3. 부작용", |p| &p.side_effect, &["부작용", "이상반응"]),
        ("4. 용법·용량", |p| &p.dosage, &["용법용량"]),
        (
            "5. 주의사항",
            |p| &p.caution,
            &["사용상 주의사항", "주의사항", "주의", "경고"],
        ),
    ];
    for (heading, pick, labels) in sections {
        lines.push(String::new());
        lines.push(heading.to_string());
        for p in [a, b] {
            lines.push(format!("- {}: {}", p.query_name, DrugProfile::field(pick(p), labels)));
        }
    }

    lines.push(String::new());
    lines.push("6. 한 줄 요약".to_string());
    lines.push(format!(
        "- {}와(과) {} 중 어떤 약이 맞는지는 증상과 복용 중인 약에 따라 다르므로 \
         의사 또는 약사와 상의하세요.",
        a.query_name, b.query_name
    ));

    lines.join("\n")
}

// ============================================================================
// Tests
// ============================================================================
