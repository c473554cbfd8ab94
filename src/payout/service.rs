//! 출금 상태 머신
//!
//! 잔고 확인, LOCK 추가, 요청 생성은 사용자 키로 직렬화된 하나의 트랜잭션에서 처리합니다.
//! 상태 변경은 요청 키로 직렬화되며 이전 상태와 비교한 뒤에만 원장 엔트리를 추가합니다.

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::json;
use sqlx::sqlite::SqlitePool;

use crate::config::LedgerConfig;
use crate::db::models::PayoutRequest;
use crate::db::repository::{AuditLogRepository, PayoutRepository, SerializationKeyRepository};
use crate::db::with_retry;
use crate::error::{LedgerError, Result};
use crate::ledger::{BalanceAggregator, EntryKind, LedgerStore, NewLedgerEntry, Reference};
use crate::payout::model::{NewPayoutRequest, PayoutStatus, Transition};

/// 출금 요청 생성 결과
#[derive(Debug, Clone, Serialize)]
pub struct PayoutResult {
    pub request: PayoutRequest,
    pub locked_amount: i64,
}

/// 상태 변경 결과
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub request: PayoutRequest,
    pub previous: PayoutStatus,
    /// 실제로 전이가 적용되었는지 (중복/종료 상태면 false)
    pub applied: bool,
}

/// 출금 서비스
#[derive(Clone)]
pub struct PayoutService {
    pool: SqlitePool,
    config: LedgerConfig,
}

impl PayoutService {
    pub fn new(pool: SqlitePool, config: LedgerConfig) -> Self {
        Self { pool, config }
    }

    /// 출금 요청 생성
    pub async fn create_request(&self, request: &NewPayoutRequest) -> Result<PayoutResult> {
        self.validate(request)?;
        with_retry(self.config.retry, "출금 요청 생성", move || self.try_create(request)).await
    }

    /// 정책 검증 (잔고와 무관한 항목)
    fn validate(&self, request: &NewPayoutRequest) -> Result<()> {
        if request.amount <= 0 {
            return Err(LedgerError::validation("출금액은 0보다 커야 합니다"));
        }
        if request.amount < self.config.payout_minimum {
            return Err(LedgerError::validation(format!(
                "최소 출금액은 {} 입니다",
                self.config.payout_minimum
            )));
        }
        if !request.method.accepts(request.amount) {
            return Err(LedgerError::validation(format!(
                "{:?} 출금은 고정 액면가만 가능합니다: {:?}",
                request.method,
                request.method.denominations().unwrap_or_default()
            )));
        }
        Ok(())
    }

    async fn try_create(&self, request: &NewPayoutRequest) -> Result<PayoutResult> {
        let mut tx = self.pool.begin().await?;

        // 사용자 단위 직렬화: 잔고 확인 전에 쓰기 잠금 획득
        SerializationKeyRepository::new(&mut tx)
            .acquire("user", &request.user_id.to_string())
            .await?;

        let snapshot = BalanceAggregator::snapshot_in(&mut tx, request.user_id).await?;
        if request.amount > snapshot.available {
            warn!(
                "출금 거절 (잔고 부족): user={} 요청 {} / 사용 가능 {}",
                request.user_id, request.amount, snapshot.available
            );
            return Err(LedgerError::InsufficientFunds {
                requested: request.amount,
                available: snapshot.available,
            });
        }

        // 요청 ID를 먼저 할당하고 LOCK 엔트리는 최종 참조로 추가
        let id = PayoutRepository::new(&mut tx)
            .insert(request, PayoutStatus::Pending)
            .await?;
        let reference = Reference::Payout(id);

        LedgerStore::append(
            &mut tx,
            &NewLedgerEntry::new(
                request.user_id,
                EntryKind::Lock,
                request.amount,
                self.config.currency.as_str(),
                reference,
            )
            .with_notes("payout_lock"),
        )
        .await?;

        let details = json!({
            "method": request.method,
            "amount": request.amount,
            "available_before": snapshot.available,
        });
        AuditLogRepository::new(&mut tx)
            .log("payout_created", reference.kind(), &id.to_string(), Some(&details.to_string()))
            .await?;

        let stored = PayoutRepository::new(&mut tx)
            .find(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("출금 요청 #{}", id)))?;

        tx.commit().await?;

        info!(
            "💸 출금 요청 생성 #{}: user={} {:?} {} (잠금)",
            id, request.user_id, request.method, request.amount
        );

        Ok(PayoutResult {
            locked_amount: stored.amount,
            request: stored,
        })
    }

    /// 출금 상태 변경
    ///
    /// 같은 상태 재요청이나 종료된 요청에 대한 호출은 원장에 아무것도 쓰지 않습니다.
    pub async fn mark_status(&self, request_id: i64, status: PayoutStatus) -> Result<StatusUpdate> {
        with_retry(self.config.retry, "출금 상태 변경", move || {
            self.try_mark_status(request_id, status)
        })
        .await
    }

    async fn try_mark_status(&self, request_id: i64, status: PayoutStatus) -> Result<StatusUpdate> {
        let mut tx = self.pool.begin().await?;

        SerializationKeyRepository::new(&mut tx)
            .acquire("payout", &request_id.to_string())
            .await?;

        let request = PayoutRepository::new(&mut tx)
            .find(request_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("출금 요청 #{}", request_id)))?;
        let previous = request.status;

        match previous.transition_to(status) {
            Transition::Unchanged => {
                debug!("출금 #{} 상태 중복 전달 무시: {:?}", request_id, status);
                return Ok(StatusUpdate { request, previous, applied: false });
            }
            Transition::AlreadyTerminal => {
                warn!(
                    "출금 #{} 은(는) 이미 종료됨 ({:?}), {:?} 요청 무시",
                    request_id, previous, status
                );
                return Ok(StatusUpdate { request, previous, applied: false });
            }
            Transition::Illegal => {
                return Err(LedgerError::IllegalTransition {
                    from: previous.as_str().to_string(),
                    to: status.as_str().to_string(),
                });
            }
            Transition::Allowed => {}
        }

        let reference = Reference::Payout(request.id);
        let entries: Vec<NewLedgerEntry> = status
            .ledger_effects()
            .iter()
            .map(|(kind, notes)| {
                NewLedgerEntry::new(
                    request.user_id,
                    *kind,
                    request.amount,
                    self.config.currency.as_str(),
                    reference,
                )
                .with_notes(*notes)
            })
            .collect();
        LedgerStore::append_all(&mut tx, &entries).await?;

        PayoutRepository::new(&mut tx)
            .update_status(request.id, status)
            .await?;

        let details = json!({ "from": previous, "to": status, "entries": entries.len() });
        AuditLogRepository::new(&mut tx)
            .log(
                "payout_status_changed",
                reference.kind(),
                &request.id.to_string(),
                Some(&details.to_string()),
            )
            .await?;

        let updated = PayoutRepository::new(&mut tx)
            .find(request.id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("출금 요청 #{}", request.id)))?;

        tx.commit().await?;

        info!(
            "출금 #{} 상태 변경: {:?} -> {:?} (원장 엔트리 {}건)",
            request.id, previous, status, entries.len()
        );

        Ok(StatusUpdate { request: updated, previous, applied: true })
    }

    pub async fn get(&self, request_id: i64) -> Result<PayoutRequest> {
        let mut conn = self.pool.acquire().await?;
        PayoutRepository::new(&mut conn)
            .find(request_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("출금 요청 #{}", request_id)))
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<PayoutRequest>> {
        let mut conn = self.pool.acquire().await?;
        Ok(PayoutRepository::new(&mut conn).find_by_user(user_id).await?)
    }
}
