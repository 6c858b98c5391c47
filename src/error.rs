//! 파이프라인 경계 에러 타입
//!
//! 내부 모듈은 `anyhow::Result`를 쓰고, 질의 파이프라인 경계에서
//! 이 타입으로 분류합니다. `Display`는 클라이언트에 그대로 나가도 되는
//! 한 줄 메시지만 담습니다.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// 질문 누락 등 잘못된 입력
    #[error("question 필드가 필요합니다.")]
    InvalidInput,

    /// 인덱스/임베딩 조회 실패
    #[error("문서 검색 중 오류가 발생했습니다.")]
    Retrieval(#[source] anyhow::Error),

    /// 언어 모델 생성 실패
    #[error("답변 생성 중 오류가 발생했습니다.")]
    Generation(#[source] anyhow::Error),

    /// 모델 가중치/데이터 파일 없음
    #[error("필요한 리소스를 찾을 수 없습니다: {0}")]
    ResourceMissing(String),

    #[error("내부 오류가 발생했습니다.")]
    Internal(#[source] anyhow::Error),
}

impl RagError {
    /// 로그/응답용 에러 종류
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::InvalidInput => "input_invalid",
            RagError::Retrieval(_) => "retrieval_failed",
            RagError::Generation(_) => "llm_generation_failed",
            RagError::ResourceMissing(_) => "resource_missing",
            RagError::Internal(_) => "internal",
        }
    }

    /// 클라이언트에 노출 가능한 메시지 (원인 체인 제외)
    pub fn public_message(&self) -> String {
        self.to_string()
    }
}

pub type RagResult<T> = std::result::Result<T, RagError>;

// ============================================================================
// Tests
// ============================================================================
