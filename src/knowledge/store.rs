//! Knowledge Store - rusqlite 기반 건강기능식품/적재 이력 저장소
//!
//! 건강기능식품 제품 레코드는 (제조사, 제품명) 단위로 upsert 되고,
//! 로더 실행 이력(원본 파일 해시, 행 수)은 `load_runs` 테이블에 남습니다.
//! 저장 위치: <data_dir>/smartmed.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// 저장된 건강기능식품 제품
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthFood {
    pub id: i64,
    pub manufacturer: String,
    pub product_name: String,
    /// 섭취 방법
    pub serve_use: Option<String>,
    /// 섭취 시 주의사항
    pub intake_hint: Option<String>,
    /// 주된 기능성
    pub main_function: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl HealthFood {
    /// 검색용 제품 표시명 ("제조사 - 제품명")
    pub fn item_name(&self) -> String {
        if self.manufacturer.is_empty() {
            self.product_name.clone()
        } else {
            format!("{} - {}", self.manufacturer, self.product_name)
        }
    }
}

/// 새 건강기능식품 입력용 구조체
#[derive(Debug, Clone, PartialEq)]
pub struct NewHealthFood {
    pub manufacturer: String,
    pub product_name: String,
    pub serve_use: Option<String>,
    pub intake_hint: Option<String>,
    pub main_function: Option<String>,
}

/// 로더 실행 이력
#[derive(Debug, Clone, Serialize)]
pub struct LoadRun {
    pub id: i64,
    pub namespace: String,
    pub source_path: String,
    pub source_sha256: String,
    pub row_count: usize,
    pub loaded_at: DateTime<Utc>,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub health_food_count: usize,
    pub load_run_count: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// KnowledgeStore
// ============================================================================

/// Knowledge Store - 동기 SQLite 저장소
pub struct KnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl KnowledgeStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS health_foods (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                manufacturer TEXT NOT NULL,
                product_name TEXT NOT NULL,
                serve_use TEXT,
                intake_hint TEXT,
                main_function TEXT,
                updated_at TEXT NOT NULL,
                UNIQUE (manufacturer, product_name)
            );

            CREATE TABLE IF NOT EXISTS load_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL,
                source_path TEXT NOT NULL,
                source_sha256 TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                loaded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_load_runs_namespace ON load_runs(namespace);
            "#,
        )
        .context("Failed to create tables")?;

        tracing::debug!("Knowledge store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 건강기능식품 일괄 upsert (단일 트랜잭션)
    ///
    /// 입력 순서대로 저장된 레코드를 반환합니다.
    pub fn upsert_health_foods(&self, items: &[NewHealthFood]) -> Result<Vec<HealthFood>> {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let now = Utc::now();

        let mut saved = Vec::with_capacity(items.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO health_foods
                    (manufacturer, product_name, serve_use, intake_hint, main_function, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(manufacturer, product_name) DO UPDATE SET
                    serve_use = excluded.serve_use,
                    intake_hint = excluded.intake_hint,
                    main_function = excluded.main_function,
                    updated_at = excluded.updated_at
                 RETURNING id",
            )?;

            for item in items {
                let id: i64 = stmt
                    .query_row(
                        params![
                            item.manufacturer,
                            item.product_name,
                            item.serve_use,
                            item.intake_hint,
                            item.main_function,
                            now.to_rfc3339(),
                        ],
                        |row| row.get(0),
                    )
                    .with_context(|| {
                        format!("Failed to upsert health food {}", item.product_name)
                    })?;

                saved.push(HealthFood {
                    id,
                    manufacturer: item.manufacturer.clone(),
                    product_name: item.product_name.clone(),
                    serve_use: item.serve_use.clone(),
                    intake_hint: item.intake_hint.clone(),
                    main_function: item.main_function.clone(),
                    updated_at: now,
                });
            }
        }
        tx.commit().context("Failed to commit health food upsert")?;

        tracing::info!("Upserted {} health food records", saved.len());
        Ok(saved)
    }

    /// 로더 실행 이력 기록
    pub fn record_load_run(
        &self,
        namespace: &str,
        source_path: &Path,
        source_sha256: &str,
        row_count: usize,
    ) -> Result<i64> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "INSERT INTO load_runs (namespace, source_path, source_sha256, row_count, loaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                namespace,
                source_path.display().to_string(),
                source_sha256,
                row_count as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to record load run")?;

        Ok(conn.last_insert_rowid())
    }

    /// namespace 별 가장 최근 실행 이력
    pub fn latest_load_runs(&self) -> Result<Vec<LoadRun>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, namespace, source_path, source_sha256, row_count, loaded_at
             FROM load_runs
             WHERE id IN (SELECT MAX(id) FROM load_runs GROUP BY namespace)
             ORDER BY namespace",
        )?;

        let runs = stmt
            .query_map([], |row| {
                Ok(LoadRun {
                    id: row.get(0)?,
                    namespace: row.get(1)?,
                    source_path: row.get(2)?,
                    source_sha256: row.get(3)?,
                    row_count: row.get::<_, i64>(4)? as usize,
                    loaded_at: parse_datetime(row.get::<_, String>(5)?),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(runs)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let health_food_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM health_foods", [], |row| row.get(0))
            .unwrap_or(0);
        let load_run_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM load_runs", [], |row| row.get(0))
            .unwrap_or(0);

        Ok(StoreStats {
            health_food_count: health_food_count as usize,
            load_run_count: load_run_count as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, KnowledgeStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = KnowledgeStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn item(manufacturer: &str, product: &str, function: Option<&str>) -> NewHealthFood {
        NewHealthFood {
            manufacturer: manufacturer.to_string(),
            product_name: product.to_string(),
            serve_use: Some("1일 1회, 1회 1정".to_string()),
            intake_hint: None,
            main_function: function.map(str::to_string),
        }
    }

    #[test]
    fn test_upsert_returns_saved_rows() {
        let (_dir, store) = create_test_store();

        let saved = store
            .upsert_health_foods(&[item("종근당", "비타민C 1000", Some("항산화"))])
            .unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].item_name(), "종근당 - 비타민C 1000");

        assert_eq!(saved[0].main_function.as_deref(), Some("항산화"));
        assert_eq!(saved[0].intake_hint, None);
    }

    #[test]
    fn test_upsert_updates_existing_row() {
        let (_dir, store) = create_test_store();

        let first = store
            .upsert_health_foods(&[item("종근당", "비타민C 1000", Some("항산화"))])
            .unwrap();
        let second = store
            .upsert_health_foods(&[item("종근당", "비타민C 1000", Some("면역 기능"))])
            .unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_eq!(store.stats().unwrap().health_food_count, 1);

        assert_eq!(second[0].main_function.as_deref(), Some("면역 기능"));
    }

    #[test]
    fn test_item_name_without_manufacturer() {
        let (_dir, store) = create_test_store();
        let saved = store
            .upsert_health_foods(&[item("", "유산균 골드", None)])
            .unwrap();
        assert_eq!(saved[0].item_name(), "유산균 골드");
    }

    #[test]
    fn test_latest_load_runs() {
        let (_dir, store) = create_test_store();

        store
            .record_load_run("drug", Path::new("a.json"), "aaa", 10)
            .unwrap();
        store
            .record_load_run("drug", Path::new("b.json"), "bbb", 20)
            .unwrap();
        store
            .record_load_run("qa", Path::new("qa.jsonl"), "ccc", 5)
            .unwrap();

        let runs = store.latest_load_runs().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].namespace, "drug");
        assert_eq!(runs[0].source_sha256, "bbb");
        assert_eq!(runs[0].row_count, 20);
        assert_eq!(runs[1].namespace, "qa");
        assert_eq!(store.stats().unwrap().load_run_count, 3);
    }
}
