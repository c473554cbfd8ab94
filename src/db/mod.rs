pub mod models;
pub mod repository;

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Error as SqlxError;

use crate::config::RetryPolicy;
use crate::error::{LedgerError, Result};

/// SQLite 데이터베이스 초기화 및 연결
pub async fn init_database(database_url: &str, max_connections: u32) -> std::result::Result<SqlitePool, SqlxError> {
    info!("🗄️  SQLite 데이터베이스 초기화 중... ({})", database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    // 연결 풀 생성
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    // 테이블 생성
    create_tables(&pool).await?;

    info!("✅ 데이터베이스 초기화 완료");

    Ok(pool)
}

/// 필요한 테이블 생성
async fn create_tables(pool: &SqlitePool) -> std::result::Result<(), SqlxError> {
    // 원장 테이블 (append-only)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ledger_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            direction TEXT NOT NULL DEFAULT 'increase',
            amount INTEGER NOT NULL CHECK (amount >= 0),
            currency TEXT NOT NULL,
            reference_type TEXT,
            reference_id TEXT,
            notes TEXT,
            created_at DATETIME NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 원장 행은 수정/삭제 불가
    sqlx::query(
        "CREATE TRIGGER IF NOT EXISTS ledger_entries_no_update
         BEFORE UPDATE ON ledger_entries
         BEGIN
            SELECT RAISE(ABORT, 'ledger entries are immutable');
         END"
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TRIGGER IF NOT EXISTS ledger_entries_no_delete
         BEFORE DELETE ON ledger_entries
         BEGIN
            SELECT RAISE(ABORT, 'ledger entries are immutable');
         END"
    )
    .execute(pool)
    .await?;

    // 출금 요청 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS payout_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            method TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount >= 0),
            denomination INTEGER,
            phone TEXT,
            email TEXT,
            status TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 클릭 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS clicks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            offer_id INTEGER NOT NULL,
            token TEXT NOT NULL UNIQUE,
            partner_click_id TEXT UNIQUE,
            target_url TEXT,
            source_slot TEXT,
            created_at DATETIME NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 전환 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS conversions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            offer_id INTEGER NOT NULL,
            click_id INTEGER NOT NULL REFERENCES clicks(id),
            external_id TEXT UNIQUE,
            status TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount >= 0),
            currency TEXT NOT NULL,
            raw_payload TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 직렬화 키 테이블 (사용자/요청/전환 단위 쓰기 잠금)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS serialization_keys (
            scope TEXT NOT NULL,
            key TEXT NOT NULL,
            version INTEGER NOT NULL,
            PRIMARY KEY (scope, key)
        )"
    )
    .execute(pool)
    .await?;

    // 일별 리더보드 스냅샷
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS leaderboard_snapshots (
            snapshot_date TEXT PRIMARY KEY,
            entries TEXT NOT NULL,
            created_at DATETIME NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 감사 로그 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS audit_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            details TEXT,
            timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
        )"
    )
    .execute(pool)
    .await?;

    // 인덱스 생성
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger_entries(user_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ledger_reference ON ledger_entries(reference_type, reference_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_payouts_user ON payout_requests(user_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_conversions_click ON conversions(click_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_conversions_user ON conversions(user_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_logs(entity_type, entity_id)")
        .execute(pool)
        .await?;

    info!("📋 테이블 생성 완료");

    Ok(())
}

/// 잠금 경합으로 인한 일시적 저장소 에러인지 판별 (SQLITE_BUSY / SQLITE_LOCKED 계열)
pub fn is_retryable(err: &LedgerError) -> bool {
    match err {
        LedgerError::Storage(SqlxError::Database(db_err)) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, 5 | 6))
            .unwrap_or(false),
        LedgerError::Storage(SqlxError::PoolTimedOut) => true,
        _ => false,
    }
}

/// 트랜잭션 단위 작업을 재시도 정책에 따라 실행
///
/// 재시도 대상은 잠금 경합뿐이며, 검증/잔고 부족 에러는 즉시 반환합니다.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Err(err) if is_retryable(&err) && attempt < policy.max_attempts => {
                warn!("{} 잠금 경합, 재시도 {}/{}: {}", operation, attempt, policy.max_attempts, err);
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
