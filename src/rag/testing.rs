//! 테스트용 임베딩/생성기
//!
//! 키워드 하나당 차원 하나를 쓰는 결정적 임베딩과, 받은 instruction 을
//! 기록하고 고정 답을 돌려주는 생성기입니다.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use super::{RagPipeline, Retriever};
use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{l2_normalize, MemoryIndex};
use crate::llm::TextGenerator;

const TERMS: &[&str] = &[
    "타이레놀", "게보린", "판콜", "부작용", "효능", "용법", "상호작용", "주의", "발진", "두통",
    "발열", "속쓰림", "비타민", "영양제", "루테인", "폐렴", "증상", "원인", "치료", "당뇨",
    "결핵", "감기", "기침", "이비인후과", "병원",
];

/// 키워드가 하나도 없을 때 쓰는 해시 차원 수
const FALLBACK_DIMS: usize = 16;

/// 키워드 포함 여부로 만드는 임베딩
#[derive(Default)]
pub struct KeywordEmbedding;

impl KeywordEmbedding {
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; TERMS.len() + FALLBACK_DIMS];
        for (i, term) in TERMS.iter().enumerate() {
            if text.contains(term) {
                v[i] = 1.0;
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            v[TERMS.len() + (hasher.finish() as usize % FALLBACK_DIMS)] = 1.0;
        }
        l2_normalize(v)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dimension(&self) -> usize {
        TERMS.len() + FALLBACK_DIMS
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// instruction 을 기록하는 생성기
pub struct MockGenerator {
    response: Result<String, String>,
    pub calls: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn replying(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_instruction(&self) -> Option<String> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, instruction: &str) -> Result<String> {
        self.calls.lock().unwrap().push(instruction.to_string());
        self.response.clone().map_err(anyhow::Error::msg)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 빈 인메모리 인덱스 위의 파이프라인
pub fn empty_pipeline(generator: Arc<MockGenerator>) -> RagPipeline {
    let index = Arc::new(MemoryIndex::new());
    let retriever = Retriever::new(
        Arc::new(KeywordEmbedding::default()),
        index.clone(),
        index,
        RetrievalConfig::default(),
    );
    RagPipeline::new(retriever, generator)
}
