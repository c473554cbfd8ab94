#![allow(dead_code)]

use sqlx::sqlite::SqlitePool;

use cpa_ledger::click::{ClickRegistry, NewClick};
use cpa_ledger::db::init_database;
use cpa_ledger::ledger::{EntryKind, LedgerStore, NewLedgerEntry, Reference};

pub const CURRENCY: &str = "RUB";

/// 테스트마다 새 임시 파일 DB
pub async fn fresh_pool() -> SqlitePool {
    let path = std::env::temp_dir().join(format!("cpa-ledger-it-{}.db", uuid::Uuid::new_v4()));
    init_database(&format!("sqlite://{}", path.display()), 8)
        .await
        .expect("test database")
}

/// 파트너 클릭 ID 를 가진 클릭 등록
pub async fn register_click(pool: &SqlitePool, user_id: i64, partner_click_id: &str) -> i64 {
    let registry = ClickRegistry::new(pool.clone(), "http://localhost:8000");
    let (click, _) = registry
        .register(&NewClick {
            user_id,
            offer_id: 1,
            partner_click_id: Some(partner_click_id.to_string()),
            target_url: Some("https://partner.example/offer".to_string()),
            source_slot: Some("test".to_string()),
        })
        .await
        .expect("click registration");
    click.id
}

/// 사용 가능 잔고 직접 적립
pub async fn credit(pool: &SqlitePool, user_id: i64, amount: i64) {
    let mut tx = pool.begin().await.expect("begin");
    LedgerStore::append(
        &mut tx,
        &NewLedgerEntry::new(user_id, EntryKind::Credit, amount, CURRENCY, Reference::Conversion(0)),
    )
    .await
    .expect("credit");
    tx.commit().await.expect("commit");
}
