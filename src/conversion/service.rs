//! 멱등 전환 수집
//!
//! 같은 전환에 대한 포스트백은 몇 번이 오든, 어떤 순서로 오든 원장에 한 번만 반영됩니다.
//! 전환 식별 키(외부 ID 또는 클릭)로 직렬화하고, 저장된 이전 상태와 비교해 엔트리를 결정합니다.

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::json;
use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::click::ClickRegistry;
use crate::config::LedgerConfig;
use crate::conversion::model::{ConversionCallback, ConversionStatus};
use crate::db::models::{Conversion, NewConversionRecord};
use crate::db::repository::{AuditLogRepository, ConversionRepository, SerializationKeyRepository};
use crate::db::with_retry;
use crate::error::{LedgerError, Result};
use crate::ledger::{EntryKind, LedgerStore, NewLedgerEntry, Reference, MAX_ENTRY_AMOUNT};

/// 수집 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub conversion: Conversion,
    /// 기존 전환의 이전 상태 (신규면 None)
    pub previous: Option<ConversionStatus>,
    /// 상태가 새로 반영되었는지 (중복 전달이면 false)
    pub applied: bool,
}

#[derive(Clone)]
pub struct ConversionService {
    pool: SqlitePool,
    config: LedgerConfig,
}

impl ConversionService {
    pub fn new(pool: SqlitePool, config: LedgerConfig) -> Self {
        Self { pool, config }
    }

    /// 포스트백 한 건 수집
    pub async fn ingest(&self, callback: &ConversionCallback) -> Result<IngestOutcome> {
        if !(0..=MAX_ENTRY_AMOUNT).contains(&callback.amount) {
            return Err(LedgerError::validation(format!(
                "전환 금액 범위 오류: {}",
                callback.amount
            )));
        }
        let currency = self.resolve_currency(callback)?;
        let currency = currency.as_str();
        with_retry(self.config.retry, "전환 수집", move || {
            self.try_ingest(callback, currency)
        })
        .await
    }

    fn resolve_currency(&self, callback: &ConversionCallback) -> Result<String> {
        match &callback.currency {
            Some(currency) if *currency != self.config.currency => Err(LedgerError::validation(format!(
                "통화 불일치: {} (원장 통화 {})",
                currency, self.config.currency
            ))),
            _ => Ok(self.config.currency.clone()),
        }
    }

    async fn try_ingest(&self, callback: &ConversionCallback, currency: &str) -> Result<IngestOutcome> {
        let mut tx = self.pool.begin().await?;

        SerializationKeyRepository::new(&mut tx)
            .acquire("conversion", &callback.identity_key())
            .await?;

        let click = ClickRegistry::find_by_partner_click_id(&mut tx, &callback.click_identifier)
            .await?
            .ok_or_else(|| {
                LedgerError::not_found(format!("알 수 없는 클릭: {}", callback.click_identifier))
            })?;

        let existing = {
            let mut repo = ConversionRepository::new(&mut tx);
            match &callback.external_id {
                Some(external_id) => repo.find_by_external_id(external_id).await?,
                None => repo.find_by_click(click.id).await?,
            }
        };

        let outcome = match existing {
            None => {
                let record = NewConversionRecord {
                    user_id: click.user_id,
                    offer_id: click.offer_id,
                    click_id: click.id,
                    external_id: callback.external_id.as_deref(),
                    status: callback.status,
                    amount: callback.amount,
                    currency,
                    raw_payload: &callback.raw_payload,
                };
                let id = ConversionRepository::new(&mut tx).insert(&record).await?;
                let conversion = Self::load(&mut tx, id).await?;

                Self::enter_status(&mut tx, &conversion, callback.status).await?;
                Self::audit(&mut tx, "conversion_created", id, None, callback.status).await?;

                info!(
                    "📥 전환 생성 #{}: user={} {:?} {}",
                    id, conversion.user_id, callback.status, callback.amount
                );
                IngestOutcome { conversion, previous: None, applied: true }
            }
            Some(current) => {
                let previous = current.status;
                if previous == callback.status {
                    // 중복 전달: 부가 정보만 갱신
                    ConversionRepository::new(&mut tx)
                        .update(current.id, previous, callback.amount, &callback.raw_payload)
                        .await?;
                    debug!("전환 #{} 중복 포스트백 ({:?})", current.id, previous);
                    let conversion = Self::load(&mut tx, current.id).await?;
                    tx.commit().await?;
                    return Ok(IngestOutcome { conversion, previous: Some(previous), applied: false });
                }

                if !previous.can_transition_to(callback.status) {
                    warn!(
                        "전환 #{} 허용되지 않는 전이 {:?} -> {:?}",
                        current.id, previous, callback.status
                    );
                    return Err(LedgerError::IllegalTransition {
                        from: previous.as_str().to_string(),
                        to: callback.status.as_str().to_string(),
                    });
                }

                // 금액 갱신 후 새 금액으로 엔트리 생성
                ConversionRepository::new(&mut tx)
                    .update(current.id, callback.status, callback.amount, &callback.raw_payload)
                    .await?;
                let conversion = Self::load(&mut tx, current.id).await?;

                if previous == ConversionStatus::Pending {
                    Self::release_pending(&mut tx, &conversion).await?;
                }
                Self::enter_status(&mut tx, &conversion, callback.status).await?;
                Self::audit(&mut tx, "conversion_status_changed", current.id, Some(previous), callback.status)
                    .await?;

                info!(
                    "전환 #{} 상태 변경: {:?} -> {:?}",
                    current.id, previous, callback.status
                );
                IngestOutcome { conversion, previous: Some(previous), applied: true }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn load(conn: &mut SqliteConnection, id: i64) -> Result<Conversion> {
        ConversionRepository::new(conn)
            .find(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("전환 #{}", id)))
    }

    /// 새 상태 진입 시 원장 반영 (Pending: ADJUST, Approved: CREDIT)
    async fn enter_status(
        conn: &mut SqliteConnection,
        conversion: &Conversion,
        status: ConversionStatus,
    ) -> Result<()> {
        let (kind, notes) = match status {
            ConversionStatus::Pending => (EntryKind::Adjust, "conversion_pending"),
            ConversionStatus::Approved => (EntryKind::Credit, "conversion_approved"),
            ConversionStatus::Rejected | ConversionStatus::Hold => return Ok(()),
        };
        if conversion.amount == 0 {
            return Ok(());
        }

        LedgerStore::append(
            conn,
            &NewLedgerEntry::new(
                conversion.user_id,
                kind,
                conversion.amount,
                conversion.currency.as_str(),
                Reference::Conversion(conversion.id),
            )
            .with_notes(notes),
        )
        .await?;
        Ok(())
    }

    /// 이 전환에 남아 있는 대기 금액을 모두 해제
    async fn release_pending(conn: &mut SqliteConnection, conversion: &Conversion) -> Result<()> {
        let reference = Reference::Conversion(conversion.id);
        let outstanding = LedgerStore::net_for_reference(conn, reference, EntryKind::Adjust).await?;
        if outstanding <= 0 {
            return Ok(());
        }

        LedgerStore::append(
            conn,
            &NewLedgerEntry::new(
                conversion.user_id,
                EntryKind::Adjust,
                outstanding,
                conversion.currency.as_str(),
                reference,
            )
            .decreasing()
            .with_notes("conversion_pending_release"),
        )
        .await?;
        Ok(())
    }

    async fn audit(
        conn: &mut SqliteConnection,
        event_type: &str,
        conversion_id: i64,
        previous: Option<ConversionStatus>,
        status: ConversionStatus,
    ) -> Result<()> {
        let details = json!({ "from": previous, "to": status });
        AuditLogRepository::new(conn)
            .log(
                event_type,
                Reference::Conversion(conversion_id).kind(),
                &conversion_id.to_string(),
                Some(&details.to_string()),
            )
            .await?;
        Ok(())
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Conversion>> {
        let mut conn = self.pool.acquire().await?;
        Ok(ConversionRepository::new(&mut conn).find_by_user(user_id).await?)
    }
}
