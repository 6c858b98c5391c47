//! 설정 모듈
//!
//! 환경변수(`SMARTMED_*`)와 기본 데이터 디렉토리로 런타임 설정을 구성합니다.
//! CLI 플래그가 있으면 그 값이 우선합니다.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

// ============================================================================
// Data Directory
// ============================================================================

/// 기본 데이터 디렉토리 (<data_local_dir>/smartmed-rag)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smartmed-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 검색 파라미터
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub drug_top_k: usize,
    /// 약품명이 없을 때 이 거리를 넘으면 근거 부족으로 버림
    pub drug_max_distance: f32,
    pub qa_top_k: usize,
    pub qa_max_distance: f32,
    pub health_food_top_k: usize,
    pub health_food_max_distance: f32,
    pub symptom_top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            drug_top_k: 5,
            drug_max_distance: 0.5,
            qa_top_k: 5,
            qa_max_distance: 0.45,
            health_food_top_k: 10,
            health_food_max_distance: 0.6,
            symptom_top_n: 5,
        }
    }
}

/// 로컬 LLM 설정
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    /// config.json, tokenizer.json, *.safetensors 가 있는 디렉토리
    pub model_dir: PathBuf,
    pub max_instruction_chars: usize,
    pub max_input_tokens: usize,
    pub max_new_tokens: usize,
}

impl LlmConfig {
    pub fn new(model_dir: PathBuf) -> Self {
        Self {
            model_dir,
            max_instruction_chars: 2000,
            max_input_tokens: 512,
            max_new_tokens: 320,
        }
    }
}

/// HTTP 서버 / 비동기 작업 설정
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 비동기 결과 보관 시간
    pub task_ttl: Duration,
    /// 동시에 실행되는 비동기 파이프라인 수
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            task_ttl: Duration::from_secs(3600),
            workers: 2,
        }
    }
}

/// 전체 런타임 설정
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    pub embed_cache_dir: PathBuf,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

impl RagConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정 구성 (빈 값은 미설정으로 취급)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = get("SMARTMED_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let model_dir = get("SMARTMED_LLM_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("models").join("qwen2.5-3b-med"));
        let embed_cache_dir = get("SMARTMED_EMBED_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("models").join("fastembed"));

        let defaults = ServerConfig::default();
        let server = ServerConfig {
            host: get("SMARTMED_HOST").unwrap_or(defaults.host),
            port: parse_or(get("SMARTMED_PORT"), "SMARTMED_PORT", defaults.port)?,
            task_ttl: Duration::from_secs(parse_or(
                get("SMARTMED_TASK_TTL_SECS"),
                "SMARTMED_TASK_TTL_SECS",
                defaults.task_ttl.as_secs(),
            )?),
            workers: parse_or(get("SMARTMED_WORKERS"), "SMARTMED_WORKERS", defaults.workers)?
                .max(1),
        };

        Ok(Self {
            data_dir,
            embed_cache_dir,
            llm: LlmConfig::new(model_dir),
            retrieval: RetrievalConfig::default(),
            server,
        })
    }

    /// LanceDB 디렉토리
    pub fn lance_dir(&self) -> PathBuf {
        self.data_dir.join("lance")
    }

    /// SQLite 파일 경로
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("smartmed.db")
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, v)),
        None => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RagConfig::from_lookup(lookup(&[("SMARTMED_DATA_DIR", "/tmp/smartmed")]))
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/smartmed"));
        assert_eq!(config.lance_dir(), PathBuf::from("/tmp/smartmed/lance"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/smartmed/smartmed.db"));
        assert_eq!(
            config.llm.model_dir,
            PathBuf::from("/tmp/smartmed/models/qwen2.5-3b-med")
        );
        assert_eq!(config.llm.max_new_tokens, 320);
        assert_eq!(config.llm.max_input_tokens, 512);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.retrieval, RetrievalConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = RagConfig::from_lookup(lookup(&[
            ("SMARTMED_DATA_DIR", "/data"),
            ("SMARTMED_LLM_MODEL_DIR", "/models/qwen"),
            ("SMARTMED_PORT", "9000"),
            ("SMARTMED_TASK_TTL_SECS", "60"),
            ("SMARTMED_WORKERS", "0"),
            ("SMARTMED_HOST", " "),
        ]))
        .unwrap();

        assert_eq!(config.llm.model_dir, PathBuf::from("/models/qwen"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.task_ttl, Duration::from_secs(60));
        assert_eq!(config.server.workers, 1);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_invalid_number() {
        let result = RagConfig::from_lookup(lookup(&[("SMARTMED_PORT", "eighty")]));
        assert!(result.is_err());
        assert!(result
            .err()
            .map(|e| e.to_string().contains("SMARTMED_PORT"))
            .unwrap_or(false));
    }
}
