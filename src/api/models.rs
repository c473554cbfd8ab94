use serde::{Deserialize, Serialize};

use crate::db::models::{Click, LedgerEntry};

/// 헬스 체크 응답
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// 잔고 조회 응답
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: i64,
    pub available: i64,
    pub pending: i64,
    pub locked: i64,
    pub currency: String,
}

/// 원장 조회 응답
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub user_id: i64,
    pub entries: Vec<LedgerEntry>,
}

/// 출금 상태 변경 요청
#[derive(Debug, Deserialize)]
pub struct PayoutStatusRequest {
    pub status: String,
}

/// 클릭 등록 응답
#[derive(Debug, Serialize)]
pub struct ClickResponse {
    pub click: Click,
    pub tracking_link: String,
}

/// 포스트백 처리 응답
#[derive(Debug, Serialize)]
pub struct PostbackResponse {
    pub conversion_id: i64,
    pub status: String,
    pub applied: bool,
    pub message: String,
}

/// API 오류 응답
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
