//! 클릭 등록/조회
//!
//! 전환 포스트백을 사용자에게 연결하기 위한 클릭 기록. 파트너 API 호출은 이 모듈 밖의 일입니다.

use log::info;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::Error as SqlxError;
use uuid::Uuid;

use crate::db::models::Click;
use crate::db::repository::{ClickRepository, SerializationKeyRepository};
use crate::error::{LedgerError, Result};

/// 클릭 등록 명령
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClick {
    pub user_id: i64,
    pub offer_id: i64,
    /// 파트너가 포스트백에 돌려주는 클릭 ID
    pub partner_click_id: Option<String>,
    pub target_url: Option<String>,
    pub source_slot: Option<String>,
}

/// 클릭 레지스트리
#[derive(Clone)]
pub struct ClickRegistry {
    pool: SqlitePool,
    public_base_url: String,
}

impl ClickRegistry {
    pub fn new(pool: SqlitePool, public_base_url: impl Into<String>) -> Self {
        Self {
            pool,
            public_base_url: public_base_url.into(),
        }
    }

    /// 클릭 등록 후 (클릭, 추적 링크) 반환
    pub async fn register(&self, click: &NewClick) -> Result<(Click, String)> {
        if let Some(partner_click_id) = &click.partner_click_id {
            if partner_click_id.trim().is_empty() {
                return Err(LedgerError::validation("파트너 클릭 ID가 비어 있습니다"));
            }
        }

        let token = Uuid::new_v4().simple().to_string();
        let mut tx = self.pool.begin().await?;

        if let Some(partner_click_id) = &click.partner_click_id {
            SerializationKeyRepository::new(&mut tx)
                .acquire("click", partner_click_id)
                .await?;
        }

        let mut repo = ClickRepository::new(&mut tx);
        if let Some(partner_click_id) = &click.partner_click_id {
            if repo.find_by_partner_click_id(partner_click_id).await?.is_some() {
                return Err(duplicate_partner_click(partner_click_id));
            }
        }

        let id = match repo.insert(click, &token).await {
            Ok(id) => id,
            // 동시 등록으로 UNIQUE 제약에 걸린 경우
            Err(SqlxError::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(duplicate_partner_click(
                    click.partner_click_id.as_deref().unwrap_or_default(),
                ));
            }
            Err(err) => return Err(err.into()),
        };
        let stored = repo
            .find(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("클릭 #{}", id)))?;
        tx.commit().await?;

        let link = self.tracking_link(&stored.token);
        info!("클릭 등록 #{}: user={} offer={}", stored.id, stored.user_id, stored.offer_id);
        Ok((stored, link))
    }

    /// 리다이렉트 토큰으로 클릭 조회
    pub async fn resolve_token(&self, token: &str) -> Result<Option<Click>> {
        let mut conn = self.pool.acquire().await?;
        Ok(ClickRepository::new(&mut conn).find_by_token(token).await?)
    }

    /// 트랜잭션 안에서 파트너 클릭 ID로 조회
    pub async fn find_by_partner_click_id(
        conn: &mut SqliteConnection,
        partner_click_id: &str,
    ) -> Result<Option<Click>> {
        Ok(ClickRepository::new(conn)
            .find_by_partner_click_id(partner_click_id)
            .await?)
    }

    pub fn tracking_link(&self, token: &str) -> String {
        format!("{}/r/{}", self.public_base_url.trim_end_matches('/'), token)
    }
}

fn duplicate_partner_click(partner_click_id: &str) -> LedgerError {
    LedgerError::validation(format!("이미 등록된 파트너 클릭 ID: {}", partner_click_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;

    fn new_click(partner_click_id: &str) -> NewClick {
        NewClick {
            user_id: 1,
            offer_id: 10,
            partner_click_id: Some(partner_click_id.to_string()),
            target_url: Some("https://partner.example/landing".to_string()),
            source_slot: None,
        }
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let pool = test_pool().await;
        let registry = ClickRegistry::new(pool.clone(), "http://localhost:8000/");

        let (click, link) = registry.register(&new_click("p-1")).await.unwrap();
        assert_eq!(link, format!("http://localhost:8000/r/{}", click.token));

        let resolved = registry.resolve_token(&click.token).await.unwrap().unwrap();
        assert_eq!(resolved.id, click.id);

        let mut conn = pool.acquire().await.unwrap();
        let found = ClickRegistry::find_by_partner_click_id(&mut conn, "p-1")
            .await
            .unwrap();
        assert_eq!(found.map(|c| c.id), Some(click.id));
    }

    #[tokio::test]
    async fn test_duplicate_partner_click_rejected() {
        let pool = test_pool().await;
        let registry = ClickRegistry::new(pool.clone(), "http://localhost:8000");

        let (first, _) = registry.register(&new_click("p-dup")).await.unwrap();
        let second = registry.register(&new_click("p-dup")).await;
        assert!(matches!(second, Err(LedgerError::Validation(_))));

        // 기존 클릭의 사용자 연결은 그대로
        let mut conn = pool.acquire().await.unwrap();
        let found = ClickRegistry::find_by_partner_click_id(&mut conn, "p-dup")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_registration() {
        let pool = test_pool().await;
        let registry = ClickRegistry::new(pool, "http://localhost:8000");

        let click_a = new_click("p-race");
        let click_b = new_click("p-race");
        let (a, b) = tokio::join!(
            registry.register(&click_a),
            registry.register(&click_b)
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(LedgerError::Validation(_)))));
    }
}
