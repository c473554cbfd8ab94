use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::*;
use crate::server::ServerState;

/// API 라우터 생성
pub fn create_api_router() -> Router<ServerState> {
    Router::new()
        .route("/health", get(health))

        // 파트너 포스트백 (공유 시크릿 필요)
        .route("/webhooks/postback", post(receive_postback))

        // 운영자 출금 API (공유 시크릿 필요)
        .route("/admin/payouts", post(create_payout))
        .route("/admin/payouts/:id/status", post(update_payout_status))

        // 사용자 조회 API
        .route("/v1/users/:user_id/balance", get(get_balance))
        .route("/v1/users/:user_id/ledger", get(get_ledger))
        .route("/v1/users/:user_id/payouts", get(get_payouts))
        .route("/v1/users/:user_id/conversions", get(get_conversions))

        // 일별 리더보드
        .route("/leaderboard", get(get_leaderboard))

        // 클릭 추적 (등록은 공유 시크릿 필요)
        .route("/v1/clicks", post(register_click))
        .route("/r/:token", get(follow_tracking_link))
}
