//! Text Chunking Module
//!
//! 의약품 설명서 섹션을 검색 단위 청크로 나눕니다.
//! 줄 경계를 살려 문단을 탐욕적으로 모으고, 한 문단이 너무 길면
//! `다.` 문장 끝에서, 그래도 길면 글자 수로 자릅니다.

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub max_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_characters: 800,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// ParagraphChunker
// ============================================================================

/// 문단 누적 청커
///
/// - 줄 단위로 읽어 최대 크기까지 줄바꿈을 유지한 채 이어 붙임
/// - 한 줄이 최대 크기를 넘으면 `다.` 뒤에서 문장 분리
/// - 문장 하나도 넘으면 글자 수로 자름
pub struct ParagraphChunker {
    config: ChunkConfig,
}

impl ParagraphChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// 조각들을 최대 크기 안에서 `sep`으로 이어 붙임 (구분자는 1자로 계산)
    fn accumulate<'a>(&self, pieces: impl Iterator<Item = &'a str>, sep: char) -> Vec<String> {
        let max = self.config.max_characters;
        let mut out = Vec::new();
        let mut buf = String::new();
        let mut buf_len = 0usize;

        for piece in pieces {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            let piece_len = piece.chars().count();

            if buf.is_empty() {
                buf.push_str(piece);
                buf_len = piece_len;
            } else if buf_len + 1 + piece_len <= max {
                buf.push(sep);
                buf.push_str(piece);
                buf_len += 1 + piece_len;
            } else {
                out.push(std::mem::take(&mut buf));
                buf.push_str(piece);
                buf_len = piece_len;
            }
        }

        if !buf.is_empty() {
            out.push(buf);
        }
        out
    }

    /// 긴 문단을 `다.` 문장 경계에서 분할
    fn split_long(&self, paragraph: &str) -> Vec<String> {
        let sentences = split_after_da(paragraph);
        let mut out = Vec::new();
        for segment in self.accumulate(sentences.iter().map(String::as_str), ' ') {
            if segment.chars().count() <= self.config.max_characters {
                out.push(segment);
            } else {
                out.extend(hard_cut(&segment, self.config.max_characters));
            }
        }
        out
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let text = text.replace("\\n", "\n");
        if text.trim().is_empty() {
            return vec![];
        }

        self.accumulate(text.lines(), '\n')
            .into_iter()
            .flat_map(|p| {
                if p.chars().count() <= self.config.max_characters {
                    vec![p]
                } else {
                    self.split_long(&p)
                }
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "ParagraphChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `다.` 뒤에서 문장 분리
fn split_after_da(text: &str) -> Vec<String> {
    text.replace("다.", "다.\n")
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 글자 수 기준 강제 분할 (UTF-8 안전)
fn hard_cut(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
