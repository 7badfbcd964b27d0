#![allow(dead_code)]

use filestore::{
    db,
    services::{
        storage_service::{ServiceSettings, StorageService},
        upload::IncomingFile,
    },
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};
use tempfile::TempDir;

/// Owner rows every test database starts with.
pub const ORDER_ID: i64 = 100;
pub const OTHER_ORDER_ID: i64 = 200;
pub const PRICE_ID: i64 = 7;
pub const CLAIM_ID: i64 = 5;

pub struct TestEnv {
    pub service: StorageService,
    pub pool: Arc<SqlitePool>,
    pub blob_dir: PathBuf,
    _dir: TempDir,
}

pub async fn env() -> TestEnv {
    env_with(ServiceSettings::default()).await
}

pub async fn env_with(settings: ServiceSettings) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("meta/filestore.db").display());
    let pool = Arc::new(db::connect(&url).await.unwrap());
    db::run_migrations(&pool).await.unwrap();

    for sql in [
        format!("INSERT INTO t_order (id) VALUES ({ORDER_ID})"),
        format!("INSERT INTO t_order (id) VALUES ({OTHER_ORDER_ID})"),
        format!("INSERT INTO t_price (id) VALUES ({PRICE_ID})"),
        format!("INSERT INTO t_report_claims (id) VALUES ({CLAIM_ID})"),
    ] {
        sqlx::query(&sql).execute(&*pool).await.unwrap();
    }

    let blob_dir = dir.path().join("blobs");
    let service = StorageService::new(pool.clone(), blob_dir.clone(), settings);
    TestEnv {
        service,
        pool,
        blob_dir,
        _dir: dir,
    }
}

pub fn file(name: &str, data: &[u8]) -> IncomingFile {
    IncomingFile::new(name, data.to_vec())
}

impl TestEnv {
    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&*self.pool)
            .await
            .unwrap()
    }

    pub async fn raw_column(&self, table: &str, column: &str, id: i64) -> Option<String> {
        let sql = format!("SELECT {column} FROM {table} WHERE id = ?");
        sqlx::query_scalar::<_, Option<String>>(&sql)
            .bind(id)
            .fetch_one(&*self.pool)
            .await
            .unwrap()
    }

    pub fn blob_files(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(&self.blob_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}
