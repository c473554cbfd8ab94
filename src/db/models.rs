use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::conversion::model::ConversionStatus;
use crate::ledger::balance::LeaderboardEntry;
use crate::ledger::model::{Direction, EntryKind};
use crate::payout::model::{PayoutMethod, PayoutStatus};

/// 원장 엔트리 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub kind: EntryKind,
    pub direction: Direction,
    pub amount: i64,
    pub currency: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// "kind:id" 형태의 참조 문자열
    pub fn reference(&self) -> Option<String> {
        match (&self.reference_type, &self.reference_id) {
            (Some(kind), Some(id)) => Some(format!("{}:{}", kind, id)),
            _ => None,
        }
    }
}

/// 출금 요청 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayoutRequest {
    pub id: i64,
    pub user_id: i64,
    pub method: PayoutMethod,
    pub amount: i64,
    pub denomination: Option<i64>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub status: PayoutStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 클릭 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Click {
    pub id: i64,
    pub user_id: i64,
    pub offer_id: i64,
    pub token: String,
    pub partner_click_id: Option<String>,
    pub target_url: Option<String>,
    pub source_slot: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 전환 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversion {
    pub id: i64,
    pub user_id: i64,
    pub offer_id: i64,
    pub click_id: i64,
    pub external_id: Option<String>,
    pub status: ConversionStatus,
    pub amount: i64,
    pub currency: String,
    pub raw_payload: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 전환 생성용 레코드
#[derive(Debug, Clone)]
pub struct NewConversionRecord<'a> {
    pub user_id: i64,
    pub offer_id: i64,
    pub click_id: i64,
    pub external_id: Option<&'a str>,
    pub status: ConversionStatus,
    pub amount: i64,
    pub currency: &'a str,
    pub raw_payload: &'a serde_json::Value,
}

/// 감사 로그 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Option<i64>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Option<String>,
}

/// 일별 리더보드 스냅샷 DB 모델
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeaderboardSnapshot {
    pub snapshot_date: NaiveDate,
    pub entries: Json<Vec<LeaderboardEntry>>,
    pub created_at: DateTime<Utc>,
}
