use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, RawQuery, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{Json, Redirect},
};
use chrono::Utc;
use log::{error, warn};
use serde_json::{Map, Value};
use std::collections::HashMap;
use url::form_urlencoded;

use crate::api::models::*;
use crate::click::NewClick;
use crate::conversion::{ConversionCallback, IngestOutcome};
use crate::db::models::{Conversion, LeaderboardSnapshot, PayoutRequest};
use crate::error::LedgerError;
use crate::payout::{NewPayoutRequest, PayoutResult, PayoutStatus, StatusUpdate};
use crate::server::ServerState;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

/// 공유 시크릿 헤더
pub const SECRET_HEADER: &str = "x-webhook-secret";

const DEFAULT_LEDGER_LIMIT: i64 = 100;
const MAX_LEDGER_LIMIT: i64 = 1000;

/// 도메인 에러를 HTTP 응답으로 변환
pub fn error_response(err: LedgerError) -> ApiError {
    let status = if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        match &err {
            LedgerError::InsufficientFunds { .. } => StatusCode::CONFLICT,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Serialization(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("저장소 오류: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: err.code().to_string(),
            message: err.to_string(),
        }),
    )
}

fn require_secret(state: &ServerState, headers: &HeaderMap) -> Result<(), ApiError> {
    if let Some(provided) = headers.get(SECRET_HEADER) {
        // 해시 비교는 상수 시간
        if blake3::hash(provided.as_bytes()) == blake3::hash(state.webhook_secret.as_bytes()) {
            return Ok(());
        }
    }

    warn!("공유 시크릿 불일치 요청 거절");
    Err((
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "FORBIDDEN".to_string(),
            message: "공유 시크릿이 올바르지 않습니다".to_string(),
        }),
    ))
}

/// 시크릿 확인 후 JSON 본문 추출. 본문 오류는 VALIDATION_ERROR 로 응답합니다.
fn authorized_body<T>(
    state: &ServerState,
    headers: &HeaderMap,
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    require_secret(state, headers)?;
    let Json(payload) =
        payload.map_err(|rejection| error_response(LedgerError::validation(rejection.body_text())))?;
    Ok(payload)
}

/// 헬스 체크 핸들러
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// 포스트백 페이로드 구성 (쿼리 문자열 + JSON 또는 form 본문, 본문 값 우선)
fn postback_payload(
    headers: &HeaderMap,
    query: Option<&str>,
    body: &[u8],
) -> Result<Map<String, Value>, LedgerError> {
    let mut payload = Map::new();
    if let Some(query) = query {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            payload.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    }

    if body.is_empty() {
        return Ok(payload);
    }

    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        for (key, value) in form_urlencoded::parse(body) {
            payload.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    } else {
        match serde_json::from_slice::<Value>(body)? {
            Value::Object(map) => payload.extend(map),
            _ => return Err(LedgerError::validation("포스트백 본문은 JSON 객체여야 합니다")),
        }
    }

    Ok(payload)
}

/// 파트너 포스트백 핸들러
pub async fn receive_postback(
    State(state): State<ServerState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> ApiResult<PostbackResponse> {
    require_secret(&state, &headers)?;

    let payload = postback_payload(&headers, query.as_deref(), &body).map_err(error_response)?;
    let callback = ConversionCallback::from_payload(payload).map_err(error_response)?;
    let IngestOutcome { conversion, applied, .. } = state
        .conversions
        .ingest(&callback)
        .await
        .map_err(error_response)?;

    let message = if applied {
        "전환이 반영되었습니다"
    } else {
        "이미 반영된 포스트백입니다"
    };

    Ok(Json(PostbackResponse {
        conversion_id: conversion.id,
        status: conversion.status.as_str().to_string(),
        applied,
        message: message.to_string(),
    }))
}

/// 출금 요청 생성 핸들러
pub async fn create_payout(
    State(state): State<ServerState>,
    headers: HeaderMap,
    payload: Result<Json<NewPayoutRequest>, JsonRejection>,
) -> ApiResult<PayoutResult> {
    let payload = authorized_body(&state, &headers, payload)?;

    let result = state
        .payouts
        .create_request(&payload)
        .await
        .map_err(error_response)?;
    Ok(Json(result))
}

/// 출금 상태 변경 핸들러
pub async fn update_payout_status(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<PayoutStatusRequest>, JsonRejection>,
) -> ApiResult<StatusUpdate> {
    let payload = authorized_body(&state, &headers, payload)?;

    let status: PayoutStatus = payload
        .status
        .parse()
        .map_err(|msg: String| error_response(LedgerError::Validation(msg)))?;
    let update = state
        .payouts
        .mark_status(id, status)
        .await
        .map_err(error_response)?;
    Ok(Json(update))
}

/// 잔고 조회 핸들러
pub async fn get_balance(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> ApiResult<BalanceResponse> {
    let snapshot = state
        .balances
        .snapshot(user_id)
        .await
        .map_err(error_response)?;

    Ok(Json(BalanceResponse {
        user_id,
        available: snapshot.available,
        pending: snapshot.pending,
        locked: snapshot.locked,
        currency: state.currency.clone(),
    }))
}

/// 원장 조회 핸들러
pub async fn get_ledger(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<LedgerResponse> {
    let limit = params
        .get("limit")
        .and_then(|l| l.parse::<i64>().ok())
        .unwrap_or(DEFAULT_LEDGER_LIMIT)
        .clamp(1, MAX_LEDGER_LIMIT);

    let entries = state
        .ledger
        .entries_for_user(user_id, limit)
        .await
        .map_err(error_response)?;
    Ok(Json(LedgerResponse { user_id, entries }))
}

/// 출금 요청 목록 핸들러
pub async fn get_payouts(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Vec<PayoutRequest>> {
    let requests = state
        .payouts
        .list_for_user(user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(requests))
}

/// 전환 목록 핸들러
pub async fn get_conversions(
    State(state): State<ServerState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Vec<Conversion>> {
    let conversions = state
        .conversions
        .list_for_user(user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(conversions))
}

/// 오늘자 리더보드 핸들러 (없으면 생성)
pub async fn get_leaderboard(State(state): State<ServerState>) -> ApiResult<LeaderboardSnapshot> {
    let snapshot = state
        .balances
        .daily_leaderboard(Utc::now().date_naive(), state.leaderboard_size)
        .await
        .map_err(error_response)?;
    Ok(Json(snapshot))
}

/// 클릭 등록 핸들러
pub async fn register_click(
    State(state): State<ServerState>,
    headers: HeaderMap,
    payload: Result<Json<NewClick>, JsonRejection>,
) -> ApiResult<ClickResponse> {
    let payload = authorized_body(&state, &headers, payload)?;
    let (click, tracking_link) = state
        .clicks
        .register(&payload)
        .await
        .map_err(error_response)?;
    Ok(Json(ClickResponse { click, tracking_link }))
}

/// 추적 링크 리다이렉트 핸들러
pub async fn follow_tracking_link(
    State(state): State<ServerState>,
    Path(token): Path<String>,
) -> Result<Redirect, ApiError> {
    let click = state
        .clicks
        .resolve_token(&token)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(LedgerError::not_found(format!("추적 토큰 {}", token))))?;

    match click.target_url {
        Some(target) => Ok(Redirect::temporary(&target)),
        None => Err(error_response(LedgerError::not_found(format!(
            "클릭 #{} 에 이동할 주소가 없습니다",
            click.id
        )))),
    }
}
