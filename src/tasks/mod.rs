//! 비동기 질의 작업 큐
//!
//! `submit`은 task_id 를 바로 돌려주고, 파이프라인은 백그라운드에서
//! 최대 `workers`개까지 동시에 실행됩니다. 결과는 TTL 이 있는 moka 캐시에
//! 보관되며, 만료되었거나 모르는 id 는 `pending`으로 보입니다.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::rag::{RagAnswer, RagPipeline};
use crate::text::short;

/// 보관할 최대 작업 수
const MAX_TASKS: u64 = 10_000;

// ============================================================================
// Types
// ============================================================================

/// 작업 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Processing,
    Done { result: RagAnswer },
    Failed { error: String },
}

/// 폴링 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    pub task_id: String,
    #[serde(flatten)]
    pub state: TaskState,
}

// ============================================================================
// TaskQueue
// ============================================================================

/// 인프로세스 작업 큐
#[derive(Clone)]
pub struct TaskQueue {
    pipeline: Arc<RagPipeline>,
    results: Cache<String, TaskState>,
    permits: Arc<Semaphore>,
}

impl TaskQueue {
    pub fn new(pipeline: Arc<RagPipeline>, workers: usize, ttl: Duration) -> Self {
        Self {
            pipeline,
            results: Cache::builder()
                .max_capacity(MAX_TASKS)
                .time_to_live(ttl)
                .build(),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// 질문을 큐에 넣고 task_id 반환
    pub async fn submit(&self, question: String) -> String {
        let task_id = Uuid::new_v4().to_string();
        self.results
            .insert(task_id.clone(), TaskState::Pending)
            .await;

        let queue = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            queue.run(id, question).await;
        });

        tracing::info!("Task submitted: {}", task_id);
        task_id
    }

    async fn run(&self, task_id: String, question: String) {
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            tracing::warn!("Task queue closed before {} started", task_id);
            return;
        };

        self.results
            .insert(task_id.clone(), TaskState::Processing)
            .await;
        tracing::debug!("Task {} processing: '{}'", task_id, short(&question, 80));

        let state = match self.pipeline.answer(&question).await {
            Ok(result) => TaskState::Done { result },
            Err(e) => {
                tracing::warn!("Task {} failed ({})", task_id, e.kind());
                TaskState::Failed {
                    error: e.public_message(),
                }
            }
        };

        tracing::info!("Task finished: {}", task_id);
        self.results.insert(task_id, state).await;
    }

    /// 작업 상태 조회
    pub async fn poll(&self, task_id: &str) -> TaskStatus {
        let state = self
            .results
            .get(task_id)
            .await
            .unwrap_or(TaskState::Pending);
        TaskStatus {
            task_id: task_id.to_string(),
            state,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
