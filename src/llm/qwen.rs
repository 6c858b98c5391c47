//! Qwen2.5 causal LM (candle)
//!
//! 로컬 디렉토리의 config.json / tokenizer.json / *.safetensors 만 읽습니다.
//! 네트워크로 가중치를 받지 않습니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::qwen2::{Config as Qwen2Config, ModelForCausalLM};
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;

use super::{prompt_head, truncate_to_sentence_boundary, TextGenerator, RESPONSE_MARKER};
use crate::config::LlmConfig;
use crate::error::RagError;

/// generation_config.json 이 없을 때 쓰는 종료 토큰
const FALLBACK_EOS_TOKENS: [&str; 2] = ["<|endoftext|>", "<|im_end|>"];

// ============================================================================
// Loaded Model
// ============================================================================

/// 로드된 토크나이저 + 모델
struct QwenModel {
    tokenizer: Tokenizer,
    /// forward 가 KV 캐시를 갱신하므로 &mut 필요
    model: Mutex<ModelForCausalLM>,
    device: Device,
    eos_ids: Vec<u32>,
}

impl QwenModel {
    fn load(model_dir: &Path) -> Result<Self> {
        let config_path = require_file(model_dir, "config.json")?;
        let tokenizer_path = require_file(model_dir, "tokenizer.json")?;
        let weight_files = weight_files(model_dir)?;

        let device = select_device();
        let dtype = if device.is_cuda() { DType::F16 } else { DType::F32 };
        tracing::info!(
            "Loading Qwen model from {:?} ({} weight files, {:?})",
            model_dir,
            weight_files.len(),
            dtype
        );

        let config: Qwen2Config = serde_json::from_slice(
            &std::fs::read(&config_path).context("Failed to read config.json")?,
        )
        .context("Failed to parse config.json")?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(anyhow::Error::msg)?;
        let eos_ids = eos_token_ids(model_dir, &tokenizer);
        if eos_ids.is_empty() {
            anyhow::bail!("No EOS token found in {:?}", model_dir);
        }

        // SAFETY: 가중치 파일은 로드 이후 수정되지 않는 로컬 파일입니다
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weight_files, dtype, &device)? };
        let model = ModelForCausalLM::new(&config, vb).context("Failed to build Qwen2 model")?;

        Ok(Self {
            tokenizer,
            model: Mutex::new(model),
            device,
            eos_ids,
        })
    }

    /// 프롬프트 토큰화 (응답 마커는 항상 끝에 남김)
    fn encode_prompt(&self, head: &str, max_tokens: usize) -> Result<Vec<u32>> {
        let head_ids = self
            .tokenizer
            .encode(head, false)
            .map_err(anyhow::Error::msg)?
            .get_ids()
            .to_vec();
        let tail_ids = self
            .tokenizer
            .encode(RESPONSE_MARKER, false)
            .map_err(anyhow::Error::msg)?
            .get_ids()
            .to_vec();

        let head_budget = max_tokens.saturating_sub(tail_ids.len());
        let mut ids: Vec<u32> = head_ids.into_iter().take(head_budget).collect();
        ids.extend(tail_ids);
        Ok(ids)
    }

    /// greedy 디코딩 (blocking)
    fn generate(&self, prompt_ids: Vec<u32>, max_new_tokens: usize) -> Result<String> {
        let mut model = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        model.clear_kv_cache();

        let mut processor = LogitsProcessor::from_sampling(0, Sampling::ArgMax);
        let mut tokens = prompt_ids;
        let mut generated: Vec<u32> = Vec::new();

        for step in 0..max_new_tokens {
            let (context, offset) = if step == 0 {
                (&tokens[..], 0)
            } else {
                (&tokens[tokens.len() - 1..], tokens.len() - 1)
            };

            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = model
                .forward(&input, offset)?
                .squeeze(0)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;
            let next = processor.sample(&logits)?;

            if self.eos_ids.contains(&next) {
                break;
            }
            tokens.push(next);
            generated.push(next);
        }

        tracing::debug!("Generated {} tokens", generated.len());
        self.tokenizer
            .decode(&generated, true)
            .map_err(anyhow::Error::msg)
    }
}

// ============================================================================
// QwenGenerator
// ============================================================================

/// 로컬 Qwen2.5 생성기
///
/// 모델은 첫 `generate` 호출에서 한 번만 로드됩니다.
pub struct QwenGenerator {
    config: LlmConfig,
    model: OnceCell<Arc<QwenModel>>,
}

impl QwenGenerator {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            model: OnceCell::new(),
        }
    }

    async fn model(&self) -> Result<Arc<QwenModel>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let dir = self.config.model_dir.clone();
                let loaded = tokio::task::spawn_blocking(move || QwenModel::load(&dir))
                    .await
                    .context("LLM loader task failed")??;
                Ok::<_, anyhow::Error>(Arc::new(loaded))
            })
            .await?;
        Ok(Arc::clone(model))
    }

    /// 모델을 미리 로드
    pub async fn warmup(&self) -> Result<()> {
        self.model().await.map(|_| ())
    }
}

#[async_trait]
impl TextGenerator for QwenGenerator {
    async fn generate(&self, instruction: &str) -> Result<String> {
        let model = self.model().await?;
        let head = prompt_head(instruction, self.config.max_instruction_chars);
        let max_input = self.config.max_input_tokens;
        let max_new = self.config.max_new_tokens;

        let raw = tokio::task::spawn_blocking(move || {
            let ids = model.encode_prompt(&head, max_input)?;
            model.generate(ids, max_new)
        })
        .await
        .context("LLM generation task failed")??;

        Ok(truncate_to_sentence_boundary(&raw))
    }

    fn name(&self) -> &str {
        "qwen2.5-3b-med"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// CUDA 가 있으면 GPU, 아니면 CPU
fn select_device() -> Device {
    match Device::cuda_if_available(0) {
        Ok(device) => device,
        Err(e) => {
            tracing::warn!("CUDA unavailable: {}. Falling back to CPU.", e);
            Device::Cpu
        }
    }
}

fn require_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(RagError::ResourceMissing(path.display().to_string()).into());
    }
    Ok(path)
}

/// 샤딩 인덱스가 있으면 그 파일 목록, 없으면 model.safetensors
fn weight_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let index_path = dir.join("model.safetensors.index.json");
    if !index_path.is_file() {
        return Ok(vec![require_file(dir, "model.safetensors")?]);
    }

    let index: serde_json::Value = serde_json::from_slice(
        &std::fs::read(&index_path).context("Failed to read safetensors index")?,
    )
    .context("Failed to parse safetensors index")?;
    let weight_map = index
        .get("weight_map")
        .and_then(|m| m.as_object())
        .ok_or_else(|| anyhow::anyhow!("weight_map missing in {:?}", index_path))?;

    let mut names: Vec<&str> = weight_map.values().filter_map(|v| v.as_str()).collect();
    names.sort_unstable();
    names.dedup();

    names.into_iter().map(|name| require_file(dir, name)).collect()
}

/// generation_config.json 의 eos_token_id (숫자 또는 배열), 없으면 특수 토큰 조회
fn eos_token_ids(dir: &Path, tokenizer: &Tokenizer) -> Vec<u32> {
    let from_config = std::fs::read(dir.join("generation_config.json"))
        .ok()
        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
        .and_then(|v| v.get("eos_token_id").cloned())
        .map(|v| parse_token_ids(&v))
        .unwrap_or_default();
    if !from_config.is_empty() {
        return from_config;
    }

    FALLBACK_EOS_TOKENS
        .iter()
        .filter_map(|t| tokenizer.token_to_id(t))
        .collect()
}

fn parse_token_ids(value: &serde_json::Value) -> Vec<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(|id| vec![id as u32]).unwrap_or_default(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_u64())
            .map(|id| id as u32)
            .collect(),
        _ => vec![],
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_token_ids() {
        assert_eq!(parse_token_ids(&serde_json::json!(151643)), vec![151643]);
        assert_eq!(
            parse_token_ids(&serde_json::json!([151645, 151643])),
            vec![151645, 151643]
        );
        assert!(parse_token_ids(&serde_json::json!("eos")).is_empty());
    }

    #[test]
    fn test_weight_files_from_index() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("model.safetensors.index.json"),
            r#"{"weight_map":{"a":"model-00002-of-00002.safetensors","b":"model-00001-of-00002.safetensors","c":"model-00001-of-00002.safetensors"}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("model-00001-of-00002.safetensors"), b"").unwrap();
        std::fs::write(dir.path().join("model-00002-of-00002.safetensors"), b"").unwrap();

        let files = weight_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("model-00001-of-00002.safetensors"));
    }

    #[tokio::test]
    async fn test_missing_model_dir_is_resource_missing() {
        let dir = TempDir::new().unwrap();
        let generator = QwenGenerator::new(LlmConfig::new(dir.path().join("absent")));

        let err = generator.generate("폐렴 원인").await.unwrap_err();
        let rag = err.downcast_ref::<RagError>();
        assert!(matches!(rag, Some(RagError::ResourceMissing(p)) if p.ends_with("config.json")));
    }
}
