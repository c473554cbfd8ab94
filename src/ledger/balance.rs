//! 잔고 집계
//!
//! 잔고는 저장하지 않고 항상 원장을 접어서(fold) 계산합니다.
//! - available = Σcredit − Σdebit + Σunlock − Σlock
//! - locked    = Σlock − Σunlock
//! - pending   = Σadjust(증가) − Σadjust(감소)

use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::db::models::{LeaderboardSnapshot, LedgerEntry};
use crate::db::repository::{LeaderboardSnapshotRepository, LedgerRepository, SerializationKeyRepository};
use crate::error::{LedgerError, Result};
use crate::ledger::model::{Direction, EntryKind};

/// 사용자 잔고 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub available: i64,
    pub pending: i64,
    pub locked: i64,
}

impl BalanceSnapshot {
    /// 엔트리 하나(또는 같은 종류의 합계)를 반영
    pub fn apply(&mut self, kind: EntryKind, direction: Direction, amount: i64) {
        match (kind, direction) {
            (EntryKind::Credit, _) => self.available += amount,
            (EntryKind::Debit, _) => self.available -= amount,
            (EntryKind::Lock, _) => {
                self.available -= amount;
                self.locked += amount;
            }
            (EntryKind::Unlock, _) => {
                self.available += amount;
                self.locked -= amount;
            }
            (EntryKind::Adjust, Direction::Increase) => self.pending += amount,
            (EntryKind::Adjust, Direction::Decrease) => self.pending -= amount,
        }
    }

    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a LedgerEntry>,
    {
        entries.into_iter().fold(Self::default(), |mut snapshot, entry| {
            snapshot.apply(entry.kind, entry.direction, entry.amount);
            snapshot
        })
    }
}

/// 리더보드 한 줄. 점수는 사용 가능 잔고와 같은 식으로 계산합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: i64,
    pub score: i64,
}

/// 잔고 집계기 (읽기 전용 프로젝션)
#[derive(Clone)]
pub struct BalanceAggregator {
    pool: SqlitePool,
}

impl BalanceAggregator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 자체 연결로 스냅샷 조회 (보고용)
    pub async fn snapshot(&self, user_id: i64) -> Result<BalanceSnapshot> {
        let mut conn = self.pool.acquire().await?;
        Self::snapshot_in(&mut conn, user_id).await
    }

    /// 호출자의 트랜잭션 안에서 스냅샷 조회
    ///
    /// 결과에 따라 쓰기를 수행하는 호출자는 반드시 이 함수를 같은 트랜잭션으로 호출해야 합니다.
    pub async fn snapshot_in(conn: &mut SqliteConnection, user_id: i64) -> Result<BalanceSnapshot> {
        let totals = LedgerRepository::new(conn).totals_by_kind(user_id).await?;
        let mut snapshot = BalanceSnapshot::default();
        for (kind, direction, amount) in totals {
            snapshot.apply(kind, direction, amount);
        }
        Ok(snapshot)
    }

    /// 점수 상위 사용자 (동점이면 user_id 오름차순)
    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let mut conn = self.pool.acquire().await?;
        Self::leaderboard_in(&mut conn, limit).await
    }

    async fn leaderboard_in(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        if limit <= 0 {
            return Err(LedgerError::validation(format!("리더보드 크기는 양수여야 합니다: {}", limit)));
        }

        let rows = LedgerRepository::new(conn).leaderboard(limit).await?;
        Ok(rows
            .into_iter()
            .map(|(user_id, score)| LeaderboardEntry { user_id, score })
            .collect())
    }

    /// 해당 날짜의 리더보드 스냅샷. 없으면 지금 원장으로 만들어 저장합니다.
    pub async fn daily_leaderboard(&self, snapshot_date: NaiveDate, limit: i64) -> Result<LeaderboardSnapshot> {
        let mut tx = self.pool.begin().await?;

        SerializationKeyRepository::new(&mut tx)
            .acquire("leaderboard", &snapshot_date.to_string())
            .await?;

        let existing = LeaderboardSnapshotRepository::new(&mut tx).find(snapshot_date).await?;
        if let Some(existing) = existing {
            tx.commit().await?;
            return Ok(existing);
        }

        let entries = Self::leaderboard_in(&mut tx, limit).await?;
        let mut repo = LeaderboardSnapshotRepository::new(&mut tx);
        repo.insert_if_absent(snapshot_date, &entries).await?;
        let stored = repo
            .find(snapshot_date)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("리더보드 스냅샷 {}", snapshot_date)))?;
        tx.commit().await?;

        info!("🏆 리더보드 스냅샷 생성: {} ({}명)", snapshot_date, stored.entries.len());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;
    use crate::ledger::model::{NewLedgerEntry, Reference};
    use crate::ledger::store::LedgerStore;

    async fn append(pool: &SqlitePool, user_id: i64, kind: EntryKind, amount: i64) {
        let mut conn = pool.acquire().await.unwrap();
        let entry = NewLedgerEntry::new(user_id, kind, amount, "RUB", Reference::Conversion(user_id));
        LedgerStore::append(&mut conn, &entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_leaderboard_scores_spendable_balance() {
        let pool = test_pool().await;
        append(&pool, 1, EntryKind::Credit, 1000).await;
        append(&pool, 1, EntryKind::Lock, 700).await;
        append(&pool, 2, EntryKind::Credit, 500).await;
        append(&pool, 3, EntryKind::Credit, 500).await;
        // 임시 적립은 점수에 포함되지 않음
        append(&pool, 4, EntryKind::Adjust, 10_000).await;

        let aggregator = BalanceAggregator::new(pool);
        let board = aggregator.leaderboard(3).await.unwrap();
        assert_eq!(
            board,
            vec![
                LeaderboardEntry { user_id: 2, score: 500 },
                LeaderboardEntry { user_id: 3, score: 500 },
                LeaderboardEntry { user_id: 1, score: 300 },
            ]
        );

        let snapshot = aggregator.snapshot(1).await.unwrap();
        assert_eq!(board[2].score, snapshot.available);

        assert!(matches!(aggregator.leaderboard(0).await, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_daily_leaderboard_is_frozen_per_date() {
        let pool = test_pool().await;
        append(&pool, 1, EntryKind::Credit, 100).await;
        let aggregator = BalanceAggregator::new(pool.clone());
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let first = aggregator.daily_leaderboard(day, 50).await.unwrap();
        assert_eq!(first.snapshot_date, day);
        assert_eq!(first.entries.0, vec![LeaderboardEntry { user_id: 1, score: 100 }]);

        // 같은 날짜는 이후 원장 변화와 무관하게 저장된 스냅샷을 돌려줌
        append(&pool, 2, EntryKind::Credit, 900).await;
        let again = aggregator.daily_leaderboard(day, 50).await.unwrap();
        assert_eq!(again.entries.0, first.entries.0);

        let next_day = day.succ_opt().unwrap();
        let next = aggregator.daily_leaderboard(next_day, 50).await.unwrap();
        assert_eq!(next.entries[0], LeaderboardEntry { user_id: 2, score: 900 });
    }

    #[test]
    fn test_apply_formulas() {
        let mut snapshot = BalanceSnapshot::default();
        snapshot.apply(EntryKind::Credit, Direction::Increase, 1000);
        snapshot.apply(EntryKind::Lock, Direction::Increase, 700);
        snapshot.apply(EntryKind::Adjust, Direction::Increase, 300);

        assert_eq!(
            snapshot,
            BalanceSnapshot { available: 300, pending: 300, locked: 700 }
        );

        snapshot.apply(EntryKind::Unlock, Direction::Increase, 700);
        snapshot.apply(EntryKind::Debit, Direction::Increase, 700);
        snapshot.apply(EntryKind::Adjust, Direction::Decrease, 300);

        assert_eq!(
            snapshot,
            BalanceSnapshot { available: 300, pending: 0, locked: 0 }
        );
    }

    #[test]
    fn test_spendable_total_changes_only_through_credit_debit() {
        // available + locked 는 lock/unlock/adjust 로는 변하지 않음
        let mut snapshot = BalanceSnapshot::default();
        snapshot.apply(EntryKind::Credit, Direction::Increase, 500);
        let total = snapshot.available + snapshot.locked;

        for (kind, direction) in [
            (EntryKind::Lock, Direction::Increase),
            (EntryKind::Unlock, Direction::Increase),
            (EntryKind::Adjust, Direction::Increase),
            (EntryKind::Adjust, Direction::Decrease),
        ] {
            snapshot.apply(kind, direction, 200);
            assert_eq!(snapshot.available + snapshot.locked, total);
        }

        snapshot.apply(EntryKind::Debit, Direction::Increase, 100);
        assert_eq!(snapshot.available + snapshot.locked, total - 100);
    }
}
