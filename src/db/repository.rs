//! 테이블별 저장소
//!
//! 모든 저장소는 호출자가 넘겨준 연결(보통 트랜잭션) 위에서 동작합니다.

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::types::Json;
use sqlx::Error as SqlxError;

use super::models::{
    AuditLog, Click, Conversion, LeaderboardSnapshot, LedgerEntry, NewConversionRecord, PayoutRequest,
};
use crate::click::NewClick;
use crate::conversion::model::ConversionStatus;
use crate::ledger::balance::LeaderboardEntry;
use crate::ledger::model::{Direction, EntryKind, NewLedgerEntry, Reference};
use crate::payout::model::{NewPayoutRequest, PayoutStatus};

const LEDGER_COLUMNS: &str =
    "id, user_id, kind, direction, amount, currency, reference_type, reference_id, notes, created_at";
const PAYOUT_COLUMNS: &str =
    "id, user_id, method, amount, denomination, phone, email, status, created_at, updated_at";
const CLICK_COLUMNS: &str =
    "id, user_id, offer_id, token, partner_click_id, target_url, source_slot, created_at";
const CONVERSION_COLUMNS: &str =
    "id, user_id, offer_id, click_id, external_id, status, amount, currency, raw_payload, created_at, updated_at";

/// 원장 저장소 (insert/select 만 존재)
pub struct LedgerRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> LedgerRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// 엔트리 저장
    pub async fn insert(&mut self, entry: &NewLedgerEntry) -> Result<i64, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO ledger_entries
             (user_id, kind, direction, amount, currency, reference_type, reference_id, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(entry.user_id)
        .bind(entry.kind)
        .bind(entry.direction)
        .bind(entry.amount)
        .bind(&entry.currency)
        .bind(entry.reference.kind())
        .bind(entry.reference.id().to_string())
        .bind(&entry.notes)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 사용자별 (종류, 방향) 합계
    pub async fn totals_by_kind(&mut self, user_id: i64) -> Result<Vec<(EntryKind, Direction, i64)>, SqlxError> {
        sqlx::query_as::<_, (EntryKind, Direction, i64)>(
            "SELECT kind, direction, SUM(amount)
             FROM ledger_entries
             WHERE user_id = ?
             GROUP BY kind, direction"
        )
        .bind(user_id)
        .fetch_all(&mut *self.conn)
        .await
    }

    /// 참조 객체별 (종류, 방향) 합계
    pub async fn totals_for_reference(
        &mut self,
        reference: Reference,
    ) -> Result<Vec<(EntryKind, Direction, i64)>, SqlxError> {
        sqlx::query_as::<_, (EntryKind, Direction, i64)>(
            "SELECT kind, direction, SUM(amount)
             FROM ledger_entries
             WHERE reference_type = ? AND reference_id = ?
             GROUP BY kind, direction"
        )
        .bind(reference.kind())
        .bind(reference.id().to_string())
        .fetch_all(&mut *self.conn)
        .await
    }

    /// 사용자별 원장 조회
    pub async fn find_by_user(&mut self, user_id: i64, limit: i64) -> Result<Vec<LedgerEntry>, SqlxError> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {} FROM ledger_entries WHERE user_id = ? ORDER BY id DESC LIMIT ?",
            LEDGER_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await
    }

    /// 사용자별 점수 상위 목록 (점수 = credit − debit + unlock − lock)
    pub async fn leaderboard(&mut self, limit: i64) -> Result<Vec<(i64, i64)>, SqlxError> {
        sqlx::query_as::<_, (i64, i64)>(
            "SELECT user_id,
                    SUM(CASE kind
                            WHEN 'credit' THEN amount
                            WHEN 'unlock' THEN amount
                            WHEN 'debit' THEN -amount
                            WHEN 'lock' THEN -amount
                            ELSE 0
                        END) AS score
             FROM ledger_entries
             GROUP BY user_id
             ORDER BY score DESC, user_id ASC
             LIMIT ?"
        )
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await
    }

    /// 참조 객체별 원장 조회
    pub async fn find_by_reference(&mut self, reference: Reference) -> Result<Vec<LedgerEntry>, SqlxError> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {} FROM ledger_entries WHERE reference_type = ? AND reference_id = ? ORDER BY id ASC",
            LEDGER_COLUMNS
        ))
        .bind(reference.kind())
        .bind(reference.id().to_string())
        .fetch_all(&mut *self.conn)
        .await
    }
}

/// 출금 요청 저장소
pub struct PayoutRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PayoutRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// 출금 요청 저장 후 ID 반환
    pub async fn insert(&mut self, request: &NewPayoutRequest, status: PayoutStatus) -> Result<i64, SqlxError> {
        let now = Utc::now();
        let denomination = request.method.denominations().map(|_| request.amount);

        let result = sqlx::query(
            "INSERT INTO payout_requests
             (user_id, method, amount, denomination, phone, email, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(request.user_id)
        .bind(request.method)
        .bind(request.amount)
        .bind(denomination)
        .bind(request.contact_phone())
        .bind(request.contact_email())
        .bind(status)
        .bind(now)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find(&mut self, id: i64) -> Result<Option<PayoutRequest>, SqlxError> {
        sqlx::query_as::<_, PayoutRequest>(&format!(
            "SELECT {} FROM payout_requests WHERE id = ?",
            PAYOUT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await
    }

    /// 상태 업데이트
    pub async fn update_status(&mut self, id: i64, status: PayoutStatus) -> Result<(), SqlxError> {
        sqlx::query(
            "UPDATE payout_requests
             SET status = ?, updated_at = ?
             WHERE id = ?"
        )
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// 사용자별 출금 요청 조회
    pub async fn find_by_user(&mut self, user_id: i64) -> Result<Vec<PayoutRequest>, SqlxError> {
        sqlx::query_as::<_, PayoutRequest>(&format!(
            "SELECT {} FROM payout_requests WHERE user_id = ? ORDER BY id DESC",
            PAYOUT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&mut *self.conn)
        .await
    }
}

/// 클릭 저장소
pub struct ClickRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ClickRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&mut self, click: &NewClick, token: &str) -> Result<i64, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO clicks
             (user_id, offer_id, token, partner_click_id, target_url, source_slot, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(click.user_id)
        .bind(click.offer_id)
        .bind(token)
        .bind(&click.partner_click_id)
        .bind(&click.target_url)
        .bind(&click.source_slot)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find(&mut self, id: i64) -> Result<Option<Click>, SqlxError> {
        sqlx::query_as::<_, Click>(&format!("SELECT {} FROM clicks WHERE id = ?", CLICK_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await
    }

    pub async fn find_by_token(&mut self, token: &str) -> Result<Option<Click>, SqlxError> {
        sqlx::query_as::<_, Click>(&format!("SELECT {} FROM clicks WHERE token = ?", CLICK_COLUMNS))
            .bind(token)
            .fetch_optional(&mut *self.conn)
            .await
    }

    /// 파트너 측 클릭 ID로 조회
    pub async fn find_by_partner_click_id(&mut self, partner_click_id: &str) -> Result<Option<Click>, SqlxError> {
        sqlx::query_as::<_, Click>(&format!(
            "SELECT {} FROM clicks WHERE partner_click_id = ?",
            CLICK_COLUMNS
        ))
        .bind(partner_click_id)
        .fetch_optional(&mut *self.conn)
        .await
    }
}

/// 전환 저장소
pub struct ConversionRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ConversionRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&mut self, record: &NewConversionRecord<'_>) -> Result<i64, SqlxError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO conversions
             (user_id, offer_id, click_id, external_id, status, amount, currency, raw_payload, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(record.user_id)
        .bind(record.offer_id)
        .bind(record.click_id)
        .bind(record.external_id)
        .bind(record.status)
        .bind(record.amount)
        .bind(record.currency)
        .bind(Json(record.raw_payload))
        .bind(now)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find(&mut self, id: i64) -> Result<Option<Conversion>, SqlxError> {
        sqlx::query_as::<_, Conversion>(&format!(
            "SELECT {} FROM conversions WHERE id = ?",
            CONVERSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await
    }

    pub async fn find_by_external_id(&mut self, external_id: &str) -> Result<Option<Conversion>, SqlxError> {
        sqlx::query_as::<_, Conversion>(&format!(
            "SELECT {} FROM conversions WHERE external_id = ?",
            CONVERSION_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&mut *self.conn)
        .await
    }

    /// 클릭 기준 조회 (가장 오래된 전환)
    pub async fn find_by_click(&mut self, click_id: i64) -> Result<Option<Conversion>, SqlxError> {
        sqlx::query_as::<_, Conversion>(&format!(
            "SELECT {} FROM conversions WHERE click_id = ? ORDER BY id ASC LIMIT 1",
            CONVERSION_COLUMNS
        ))
        .bind(click_id)
        .fetch_optional(&mut *self.conn)
        .await
    }

    /// 상태 및 부가 정보 갱신
    pub async fn update(
        &mut self,
        id: i64,
        status: ConversionStatus,
        amount: i64,
        raw_payload: &serde_json::Value,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            "UPDATE conversions
             SET status = ?, amount = ?, raw_payload = ?, updated_at = ?
             WHERE id = ?"
        )
        .bind(status)
        .bind(amount)
        .bind(Json(raw_payload))
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn find_by_user(&mut self, user_id: i64) -> Result<Vec<Conversion>, SqlxError> {
        sqlx::query_as::<_, Conversion>(&format!(
            "SELECT {} FROM conversions WHERE user_id = ? ORDER BY id DESC",
            CONVERSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&mut *self.conn)
        .await
    }
}

/// 직렬화 키 저장소
///
/// 트랜잭션의 첫 문장으로 키 버전을 올려 쓰기 잠금을 먼저 잡습니다
/// (행 잠금 DB의 `SELECT ... FOR UPDATE` 에 해당).
pub struct SerializationKeyRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SerializationKeyRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// 키 잠금 획득 후 새 버전 반환
    pub async fn acquire(&mut self, scope: &str, key: &str) -> Result<i64, SqlxError> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO serialization_keys (scope, key, version)
             VALUES (?, ?, 1)
             ON CONFLICT(scope, key) DO UPDATE SET version = version + 1
             RETURNING version"
        )
        .bind(scope)
        .bind(key)
        .fetch_one(&mut *self.conn)
        .await
    }
}

/// 리더보드 스냅샷 저장소
pub struct LeaderboardSnapshotRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> LeaderboardSnapshotRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// 날짜별 스냅샷 조회
    pub async fn find(&mut self, snapshot_date: NaiveDate) -> Result<Option<LeaderboardSnapshot>, SqlxError> {
        sqlx::query_as::<_, LeaderboardSnapshot>(
            "SELECT snapshot_date, entries, created_at
             FROM leaderboard_snapshots
             WHERE snapshot_date = ?"
        )
        .bind(snapshot_date)
        .fetch_optional(&mut *self.conn)
        .await
    }

    /// 스냅샷 저장 (같은 날짜가 있으면 무시)
    pub async fn insert_if_absent(
        &mut self,
        snapshot_date: NaiveDate,
        entries: &[LeaderboardEntry],
    ) -> Result<bool, SqlxError> {
        let result = sqlx::query(
            "INSERT INTO leaderboard_snapshots (snapshot_date, entries, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(snapshot_date) DO NOTHING"
        )
        .bind(snapshot_date)
        .bind(Json(entries))
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// 감사 로그 저장소
pub struct AuditLogRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> AuditLogRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// 로그 기록
    pub async fn log(
        &mut self,
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        details: Option<&str>,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            "INSERT INTO audit_logs (event_type, entity_type, entity_id, details)
             VALUES (?, ?, ?, ?)"
        )
        .bind(event_type)
        .bind(entity_type)
        .bind(entity_id)
        .bind(details)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// 엔티티별 로그 조회
    pub async fn find_by_entity(&mut self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLog>, SqlxError> {
        sqlx::query_as::<_, AuditLog>(
            "SELECT id, event_type, entity_type, entity_id, details
             FROM audit_logs
             WHERE entity_type = ? AND entity_id = ?
             ORDER BY id ASC"
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&mut *self.conn)
        .await
    }
}
