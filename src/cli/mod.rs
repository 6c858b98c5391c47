//! CLI 모듈
//!
//! smartmed-rag CLI 명령어 정의 및 구현

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::api::{self, AppState};
use crate::config::RagConfig;
use crate::embedding::MiniLmEmbedding;
use crate::knowledge::{
    ChunkIndex, KnowledgeStore, LanceIndex, Namespace, ParagraphChunker, QaIndex,
};
use crate::llm::QwenGenerator;
use crate::loader::{self, LoadReport};
use crate::rag::{RagPipeline, Retriever};
use crate::tasks::TaskQueue;
use crate::text::short;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "smartmed-rag")]
#[command(version, about = "의약품 설명서 기반 RAG 서버", long_about = None)]
pub struct Cli {
    /// 디버그 로그 출력
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 데이터 디렉토리 (기본: SMARTMED_DATA_DIR 또는 로컬 데이터 디렉토리)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTP API 서버 실행
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// 첫 요청 전에 모델을 미리 로드
        #[arg(long)]
        warmup: bool,
    },

    /// 질문 하나에 답변 (동기 실행)
    Ask {
        question: String,

        /// 근거 청크 목록 출력
        #[arg(long)]
        show_contexts: bool,
    },

    /// 의약품 설명서 JSON 적재 (drug namespace 전체 교체)
    LoadDrugs { path: PathBuf },

    /// 건강기능식품 JSON 적재 (health_food namespace 전체 교체)
    LoadHealthFood { path: PathBuf },

    /// 질병 QA JSONL 적재 (QA 쌍 전체 교체)
    LoadQa { path: PathBuf },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    // --data-dir 는 SMARTMED_DATA_DIR 보다 우선하고, 모델 경로 기본값에도 반영됩니다
    let data_dir = cli.data_dir.map(|d| d.to_string_lossy().into_owned());
    let config = RagConfig::from_lookup(|key| match (key, &data_dir) {
        ("SMARTMED_DATA_DIR", Some(dir)) => Some(dir.clone()),
        _ => std::env::var(key).ok(),
    })
    .context("Invalid SMARTMED_* environment")?;

    match cli.command {
        Commands::Serve { host, port, warmup } => cmd_serve(config, host, port, warmup).await,
        Commands::Ask {
            question,
            show_contexts,
        } => cmd_ask(config, &question, show_contexts).await,
        Commands::LoadDrugs { path } => cmd_load(config, LoadKind::Drugs, &path).await,
        Commands::LoadHealthFood { path } => cmd_load(config, LoadKind::HealthFood, &path).await,
        Commands::LoadQa { path } => cmd_load(config, LoadKind::Qa, &path).await,
        Commands::Status => cmd_status(config).await,
    }
}

// ============================================================================
// Components
// ============================================================================

/// 명령어들이 공유하는 구성요소
struct Components {
    embedder: Arc<MiniLmEmbedding>,
    index: Arc<LanceIndex>,
}

impl Components {
    async fn open(config: &RagConfig) -> Result<Self> {
        let index = LanceIndex::open(&config.lance_dir())
            .await
            .context("LanceDB 열기 실패")?;
        Ok(Self {
            embedder: Arc::new(MiniLmEmbedding::new(config.embed_cache_dir.clone())),
            index: Arc::new(index),
        })
    }

    fn pipeline(&self, config: &RagConfig) -> (RagPipeline, Arc<QwenGenerator>) {
        let generator = Arc::new(QwenGenerator::new(config.llm.clone()));
        let retriever = Retriever::new(
            self.embedder.clone(),
            self.index.clone(),
            self.index.clone(),
            config.retrieval.clone(),
        );
        (RagPipeline::new(retriever, generator.clone()), generator)
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 서버 실행 명령어 (serve)
async fn cmd_serve(
    mut config: RagConfig,
    host: Option<String>,
    port: Option<u16>,
    warmup: bool,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let components = Components::open(&config).await?;
    let (pipeline, generator) = components.pipeline(&config);

    if warmup {
        println!("[*] 모델 로드 중...");
        components
            .embedder
            .warmup()
            .await
            .context("임베딩 모델 로드 실패")?;
        generator.warmup().await.context("LLM 로드 실패")?;
        println!("[OK] 모델 로드 완료");
    }

    let pipeline = Arc::new(pipeline);
    let state = AppState {
        tasks: TaskQueue::new(
            Arc::clone(&pipeline),
            config.server.workers,
            config.server.task_ttl,
        ),
        pipeline,
        chunks: components.index.clone(),
        qa: components.index.clone(),
    };

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!(
        "[OK] http://{} (workers: {}, task ttl: {}s)",
        addr,
        config.server.workers,
        config.server.task_ttl.as_secs()
    );

    api::serve(state, addr).await
}

/// 질의 명령어 (ask)
async fn cmd_ask(config: RagConfig, question: &str, show_contexts: bool) -> Result<()> {
    let components = Components::open(&config).await?;
    let (pipeline, _) = components.pipeline(&config);

    println!("[*] 질문: {}", question);
    println!();

    let result = pipeline
        .answer(question)
        .await
        .map_err(|e| anyhow::anyhow!("{} ({})", e.public_message(), e.kind()))?;

    println!("{}", result.answer);

    if show_contexts {
        println!();
        if result.contexts.is_empty() {
            println!("[*] 근거 청크 없음");
        }
        for (i, ctx) in result.contexts.iter().enumerate() {
            println!(
                "[{}] {} / {}#{} ({})",
                i + 1,
                short(&ctx.item_name, 40),
                ctx.section,
                ctx.chunk_index,
                ctx.chunk_id
            );
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum LoadKind {
    Drugs,
    HealthFood,
    Qa,
}

/// 적재 명령어 (load-drugs / load-health-food / load-qa)
async fn cmd_load(config: RagConfig, kind: LoadKind, path: &Path) -> Result<()> {
    let components = Components::open(&config).await?;
    let store = KnowledgeStore::open(&config.db_path()).context("KnowledgeStore 열기 실패")?;
    let embedder = components.embedder.as_ref();
    let index = components.index.as_ref();

    println!("[*] 적재 중: {}", path.display());

    let report = match kind {
        LoadKind::Drugs => {
            let chunker = ParagraphChunker::with_defaults();
            loader::load_drugs(path, &chunker, embedder, index, &store).await?
        }
        LoadKind::HealthFood => loader::load_health_foods(path, embedder, index, &store).await?,
        LoadKind::Qa => loader::load_qa_pairs(path, embedder, index, &store).await?,
    };

    print_report(&report);
    Ok(())
}

/// 상태 확인 명령어 (status)
async fn cmd_status(config: RagConfig) -> Result<()> {
    println!("smartmed-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());

    if config.llm.model_dir.exists() {
        println!("[OK] LLM 모델: {}", config.llm.model_dir.display());
    } else {
        println!("[!] LLM 모델 없음: {}", config.llm.model_dir.display());
        println!("    설정: export SMARTMED_LLM_MODEL_DIR=/path/to/model");
    }

    match LanceIndex::open(&config.lance_dir()).await {
        Ok(index) => {
            for namespace in Namespace::ALL {
                match index.count(namespace).await {
                    Ok(n) => println!("[OK] {} 청크: {} 건", namespace, n),
                    Err(e) => println!("[!] {} 청크 조회 실패: {}", namespace, e),
                }
            }
            match index.count_pairs().await {
                Ok(n) => println!("[OK] QA 쌍: {} 건", n),
                Err(e) => println!("[!] QA 조회 실패: {}", e),
            }
        }
        Err(e) => println!("[!] LanceDB 열기 실패: {}", e),
    }

    match KnowledgeStore::open(&config.db_path()) {
        Ok(store) => {
            match store.stats() {
                Ok(stats) => {
                    println!("[OK] SQLite: {}", stats.db_path.display());
                    println!("[OK] 건강기능식품 제품: {} 건", stats.health_food_count);
                }
                Err(e) => println!("[!] 통계 조회 실패: {}", e),
            }
            match store.latest_load_runs() {
                Ok(runs) if runs.is_empty() => println!("[!] 적재 이력 없음"),
                Ok(runs) => {
                    println!();
                    println!("최근 적재:");
                    for run in runs {
                        println!(
                            "  {:<12} {:>7} 건  {}  {}",
                            run.namespace,
                            run.row_count,
                            run.loaded_at.format("%Y-%m-%d %H:%M"),
                            short(&run.source_path, 60)
                        );
                    }
                }
                Err(e) => println!("[!] 적재 이력 조회 실패: {}", e),
            }
        }
        Err(e) => println!("[!] KnowledgeStore 열기 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_report(report: &LoadReport) {
    println!("[OK] {} 적재 완료: {} 건", report.namespace, report.rows);
    if report.skipped > 0 {
        println!("[!] 건너뛴 레코드: {} 건", report.skipped);
    }
    println!("     sha256: {}", short_hash(&report.source_sha256));
    println!("     run id: {}", report.run_id);
}

/// 해시 앞 12자리
fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn test_parse_load_command() {
        let cli = Cli::parse_from(["smartmed-rag", "load-drugs", "data/drugs.json"]);
        match cli.command {
            Commands::LoadDrugs { path } => assert_eq!(path, PathBuf::from("data/drugs.json")),
            _ => panic!("expected load-drugs"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::parse_from([
            "smartmed-rag",
            "--verbose",
            "serve",
            "--port",
            "9000",
            "--data-dir",
            "/tmp/smartmed",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/smartmed")));
        match cli.command {
            Commands::Serve { host, port, warmup } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(9000));
                assert!(!warmup);
            }
            _ => panic!("expected serve"),
        }
    }
}
