use log::debug;
use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::db::models::LedgerEntry;
use crate::db::repository::LedgerRepository;
use crate::error::Result;
use crate::ledger::model::{Direction, EntryKind, NewLedgerEntry, Reference};

/// 원장 저장소 (append-only)
///
/// 쓰기는 항상 호출자의 트랜잭션 연결을 받아 수행되므로 하나의 원인 이벤트에 속한
/// 엔트리들은 함께 커밋되거나 함께 롤백됩니다. 수정/삭제 연산은 없습니다.
#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 엔트리 추가 후 ID 반환
    pub async fn append(conn: &mut SqliteConnection, entry: &NewLedgerEntry) -> Result<i64> {
        entry.validate()?;
        let id = LedgerRepository::new(conn).insert(entry).await?;
        debug!(
            "원장 추가 #{}: user={} {:?}/{:?} {} {} ({})",
            id, entry.user_id, entry.kind, entry.direction, entry.amount, entry.currency, entry.reference
        );
        Ok(id)
    }

    /// 여러 엔트리를 순서대로 추가
    pub async fn append_all(conn: &mut SqliteConnection, entries: &[NewLedgerEntry]) -> Result<Vec<i64>> {
        // 하나라도 잘못되면 아무것도 쓰지 않음
        for entry in entries {
            entry.validate()?;
        }
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(Self::append(conn, entry).await?);
        }
        Ok(ids)
    }

    /// 참조 객체에 귀속된 특정 종류 엔트리의 순합계 (증가 − 감소)
    pub async fn net_for_reference(
        conn: &mut SqliteConnection,
        reference: Reference,
        kind: EntryKind,
    ) -> Result<i64> {
        let totals = LedgerRepository::new(conn).totals_for_reference(reference).await?;
        Ok(totals
            .into_iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, direction, amount)| match direction {
                Direction::Increase => amount,
                Direction::Decrease => -amount,
            })
            .sum())
    }

    /// 사용자 원장 조회 (최신순)
    pub async fn entries_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<LedgerEntry>> {
        let mut conn = self.pool.acquire().await?;
        Ok(LedgerRepository::new(&mut conn).find_by_user(user_id, limit).await?)
    }

    /// 참조 객체별 원장 조회 (기록순)
    pub async fn entries_for_reference(&self, reference: Reference) -> Result<Vec<LedgerEntry>> {
        let mut conn = self.pool.acquire().await?;
        Ok(LedgerRepository::new(&mut conn).find_by_reference(reference).await?)
    }
}
