//! LLM 모듈 - 로컬 instruction 모델 래퍼
//!
//! Alpaca 형식 프롬프트를 만들고, 생성 결과를 마지막 문장 경계에서 자릅니다.
//! 실제 추론은 [`QwenGenerator`](qwen::QwenGenerator)가 candle로 수행합니다.

mod qwen;

pub use qwen::QwenGenerator;

use anyhow::Result;
use async_trait::async_trait;

use crate::text::take_chars;

/// Alpaca 프롬프트 머리말
pub const PROMPT_PREAMBLE: &str = "Below is an instruction that describes a task. \
Write a response that appropriately completes the request.";

/// 프롬프트 끝부분 (입력 토큰을 자를 때도 항상 보존)
pub const RESPONSE_MARKER: &str = "\n\n### Response:\n";

/// 한국어 문장 끝 패턴 (긴 것부터)
const SENTENCE_ENDERS: [&str; 10] = [
    "습니다.", "ㅂ니다.", "니다.", "세요.", "요.", "다.", "다!", "요!", "다?", "요?",
];

/// 문장 끝이 이 비율 이후에 있어야 그 위치에서 자릅니다
const MIN_KEEP_RATIO: f64 = 0.5;

/// 마지막 문단이 이보다 짧으면 미완성으로 보고 버립니다
const MIN_TAIL_PARAGRAPH_CHARS: usize = 30;

// ============================================================================
// TextGenerator Trait
// ============================================================================

/// 텍스트 생성기 트레이트
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// instruction 하나로 답변 생성 (문장 경계 정리까지 끝난 결과)
    async fn generate(&self, instruction: &str) -> Result<String>;

    /// 생성기 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Prompt
// ============================================================================

/// Alpaca 프롬프트에서 응답 마커 앞부분
pub fn prompt_head(instruction: &str, max_instruction_chars: usize) -> String {
    format!(
        "{}\n\n### Instruction:\n{}",
        PROMPT_PREAMBLE,
        take_chars(instruction.trim(), max_instruction_chars)
    )
}

/// 전체 Alpaca 프롬프트
pub fn build_prompt(instruction: &str, max_instruction_chars: usize) -> String {
    format!("{}{}", prompt_head(instruction, max_instruction_chars), RESPONSE_MARKER)
}

// ============================================================================
// Truncation
// ============================================================================

/// 생성 결과를 마지막 문장 경계에서 자릅니다
///
/// 1. 가장 늦게 끝나는 문장 끝 패턴이 전체 길이의 절반 이후면 거기까지
/// 2. 아니면 마지막 줄이 30자 미만일 때 그 줄을 버림
/// 3. 둘 다 아니면 그대로
pub fn truncate_to_sentence_boundary(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }

    let last_end = SENTENCE_ENDERS
        .iter()
        .filter_map(|ender| text.rfind(ender).map(|pos| pos + ender.len()))
        .max();

    let total_chars = text.chars().count();
    if let Some(end) = last_end {
        let kept_chars = text[..end].chars().count();
        if kept_chars as f64 >= total_chars as f64 * MIN_KEEP_RATIO {
            return text[..end].trim_end().to_string();
        }
    }

    if let Some((head, tail)) = text.rsplit_once('\n') {
        if tail.trim().chars().count() < MIN_TAIL_PARAGRAPH_CHARS && !head.trim().is_empty() {
            return head.trim_end().to_string();
        }
    }

    text.to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt("  폐렴 원인을 설명해줘 ", 2000);
        assert!(prompt.starts_with(PROMPT_PREAMBLE));
        assert!(prompt.contains("### Instruction:\n폐렴 원인을 설명해줘\n\n### Response:\n"));
        assert!(prompt.ends_with(RESPONSE_MARKER));
    }

    #[test]
    fn test_build_prompt_caps_instruction() {
        let long = "가".repeat(3000);
        let prompt = build_prompt(&long, 2000);
        assert_eq!(prompt.matches('가').count(), 2000);
        assert!(prompt.ends_with(RESPONSE_MARKER));
    }

    #[test]
    fn test_truncate_keeps_complete_output() {
        let samples = [
            "충분히 쉬고 수분을 섭취하세요.",
            "폐렴은 세균 감염으로 생깁니다. 고열이 납니다.",
            "의사와 상담해 보시겠어요?",
        ];
        for s in samples {
            assert_eq!(truncate_to_sentence_boundary(s), s);
        }
    }

    #[test]
    fn test_truncate_cuts_dangling_sentence() {
        let text = "폐렴은 폐에 염증이 생기는 질환입니다. 주요 원인은 세균과 바이러스입니다. 치료는 원인에 따라";
        assert_eq!(
            truncate_to_sentence_boundary(text),
            "폐렴은 폐에 염증이 생기는 질환입니다. 주요 원인은 세균과 바이러스입니다."
        );
    }

    #[test]
    fn test_truncate_drops_short_tail_paragraph() {
        let text = "첫 문단은 끝맺음 없이 길게 이어지는 설명으로 구성되어 있고 마침표가 없음\n두 번째 줄";
        assert_eq!(
            truncate_to_sentence_boundary(text),
            "첫 문단은 끝맺음 없이 길게 이어지는 설명으로 구성되어 있고 마침표가 없음"
        );
    }

    #[test]
    fn test_truncate_early_ender_is_ignored() {
        let text = "네 그렇다. 그리고 이어지는 아주 긴 설명이 끝맺음 없이 계속 이어지고 있으며 아직 끝나지 않은 문장";
        assert_eq!(truncate_to_sentence_boundary(text), text);
    }
}
