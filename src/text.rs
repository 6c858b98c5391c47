//! 텍스트 유틸리티
//!
//! 질의 정규화, 길이 제한, 문장 분리, LLM 출력 정리 등
//! 여러 모듈이 공유하는 문자열 처리 함수들입니다.

use once_cell::sync::Lazy;
use regex::Regex;

/// 문장 분리 시 이보다 짧은 조각은 다음 조각과 합칩니다
const MIN_SENTENCE_CHARS: usize = 10;

static SENTENCE_END_NEWLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(다|니다|요)[ \t]*\n").unwrap());

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

// ============================================================================
// Normalization
// ============================================================================

/// 모든 공백 제거 (ASCII + 유니코드 공백, zero-width 문자 포함)
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '\u{200B}' | '\u{FEFF}'))
        .collect()
}

/// 연속 공백을 하나로 줄이고 양끝 공백 제거
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 줄바꿈을 공백으로 펴고 `max_chars`자를 넘으면 말줄임표를 붙입니다.
pub fn short(text: &str, max_chars: usize) -> String {
    let flat = text.replace(['\r', '\n'], " ");
    let flat = flat.trim();

    if flat.chars().count() <= max_chars {
        flat.to_string()
    } else {
        let truncated: String = flat.chars().take(max_chars).collect();
        format!("{}…", truncated.trim_end())
    }
}

/// 문자 수 기준으로 앞부분만 남깁니다 (UTF-8 안전)
pub fn take_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ============================================================================
// Sentence Splitting
// ============================================================================

/// 일반 문장 분리기
///
/// 줄바꿈과 `.` `!` `?` 뒤의 공백에서 자른 뒤,
/// 10자 미만 조각은 뒤따르는 조각과 합칩니다.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut raw: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' || c == '\r' {
            push_fragment(&mut raw, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            match chars.peek() {
                None => push_fragment(&mut raw, &mut current),
                Some(next) if next.is_whitespace() => push_fragment(&mut raw, &mut current),
                _ => {}
            }
        }
    }
    push_fragment(&mut raw, &mut current);

    let mut merged: Vec<String> = Vec::new();
    let mut pending = String::new();
    for fragment in raw {
        if pending.is_empty() {
            pending = fragment;
        } else {
            pending.push(' ');
            pending.push_str(&fragment);
        }
        if pending.chars().count() >= MIN_SENTENCE_CHARS {
            merged.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        match merged.last_mut() {
            Some(last) => {
                last.push(' ');
                last.push_str(&pending);
            }
            None => merged.push(pending),
        }
    }

    merged
}

fn push_fragment(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

// ============================================================================
// Output Cleanup
// ============================================================================

/// 중복 문장 제거
///
/// 완전히 같은 문장, 또는 기존 문장의 앞/뒤 부분 문자열인 문장을 제거하고
/// 더 긴 쪽을 남깁니다.
pub fn dedupe_sentences(text: &str) -> String {
    let t = text.trim();
    if t.is_empty() {
        return String::new();
    }

    let t = SENTENCE_END_NEWLINE.replace_all(t, "$1.\n");

    let mut parts: Vec<&str> = Vec::new();
    let mut start = 0;
    let mut iter = t.char_indices().peekable();
    while let Some((_, c)) = iter.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(j, next)) = iter.peek() {
            if next.is_whitespace() {
                parts.push(&t[start..j]);
                start = j;
            }
        }
    }
    parts.push(&t[start..]);

    let mut out: Vec<String> = Vec::new();
    for part in parts {
        let s = part.trim();
        if s.is_empty() {
            continue;
        }

        let mut skip = false;
        for prev in out.iter_mut() {
            if s == prev.as_str() {
                skip = true;
                break;
            }
            if s.len() > prev.len() && (s.starts_with(prev.as_str()) || s.ends_with(prev.as_str())) {
                *prev = s.to_string();
                skip = true;
                break;
            }
            if prev.len() > s.len() && (prev.starts_with(s) || prev.ends_with(s)) {
                skip = true;
                break;
            }
        }

        if !skip {
            out.push(s.to_string());
        }
    }

    out.join(" ")
}

/// LLM 출력 정리
///
/// 절반이 그대로 반복된 출력, 중복 단락, 중복 문장, 깨진 문자(U+FFFD)를 제거합니다.
pub fn clean_output(text: &str) -> String {
    let mut t = text.trim().to_string();
    if t.is_empty() {
        return t;
    }

    let chars: Vec<char> = t.chars().collect();
    let n = chars.len();
    if n % 2 == 0 && chars[..n / 2] == chars[n / 2..] {
        t = chars[..n / 2].iter().collect::<String>().trim().to_string();
    }

    let mut paragraphs: Vec<&str> = Vec::new();
    for p in PARAGRAPH_BREAK.split(&t) {
        let p = p.trim();
        if p.is_empty() || paragraphs.contains(&p) {
            continue;
        }
        paragraphs.push(p);
    }
    let joined = paragraphs.join("\n\n");

    dedupe_sentences(&joined)
        .replace('\u{FFFD}', "")
        .trim()
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================
