mod common;

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde_json::Value;

use cpa_ledger::config::LedgerConfig;
use cpa_ledger::conversion::{ConversionCallback, ConversionService, ConversionStatus};
use cpa_ledger::error::LedgerError;
use cpa_ledger::ledger::{BalanceAggregator, Direction, EntryKind, LedgerStore, Reference};

const AMOUNT: i64 = 350;

fn delivery(click: &str, external_id: &str, status: ConversionStatus) -> ConversionCallback {
    ConversionCallback {
        click_identifier: click.to_string(),
        external_id: Some(external_id.to_string()),
        amount: AMOUNT,
        currency: None,
        status,
        raw_payload: Value::Null,
    }
}

/// 순서를 섞은 상태 전달 후 원장이 최종 상태와 일치하는지 확인
#[tokio::test]
async fn test_shuffled_deliveries_match_final_status() {
    use ConversionStatus::*;

    let pool = common::fresh_pool().await;
    let service = ConversionService::new(pool.clone(), LedgerConfig::default());
    let ledger = LedgerStore::new(pool.clone());
    let balances = BalanceAggregator::new(pool.clone());
    let mut rng = StdRng::seed_from_u64(0x5eed);

    let sequence = [Pending, Pending, Hold, Approved, Rejected, Pending, Approved];

    for trial in 0..40i64 {
        let user_id = 100 + trial;
        let click = format!("clk-shuffle-{}", trial);
        let external_id = format!("conv-shuffle-{}", trial);
        common::register_click(&pool, user_id, &click).await;

        let mut statuses = sequence.to_vec();
        statuses.shuffle(&mut rng);
        statuses.truncate(1 + (trial as usize % statuses.len()));

        for status in &statuses {
            match service.ingest(&delivery(&click, &external_id, *status)).await {
                Ok(_) | Err(LedgerError::IllegalTransition { .. }) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        let conversion = service
            .list_for_user(user_id)
            .await
            .unwrap()
            .pop()
            .expect("conversion recorded");

        let entries = ledger
            .entries_for_reference(Reference::Conversion(conversion.id))
            .await
            .unwrap();
        let credited: i64 = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Credit)
            .map(|e| e.amount)
            .sum();
        let pending: i64 = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Adjust)
            .map(|e| match e.direction {
                Direction::Increase => e.amount,
                Direction::Decrease => -e.amount,
            })
            .sum();

        let expected_credit = if conversion.status == Approved { AMOUNT } else { 0 };
        let expected_pending = if conversion.status == Pending { AMOUNT } else { 0 };
        assert_eq!(credited, expected_credit, "trial {} {:?}", trial, statuses);
        assert_eq!(pending, expected_pending, "trial {} {:?}", trial, statuses);

        let snapshot = balances.snapshot(user_id).await.unwrap();
        assert_eq!(snapshot.available, expected_credit);
        assert_eq!(snapshot.pending, expected_pending);
        assert!(snapshot.available >= 0 && snapshot.pending >= 0);
    }
}

/// 외부 ID 없는 포스트백은 클릭 기준으로 하나의 전환에 합쳐짐
#[tokio::test]
async fn test_click_fallback_merges_deliveries() {
    let pool = common::fresh_pool().await;
    common::register_click(&pool, 9, "clk-no-ext").await;
    let service = ConversionService::new(pool.clone(), LedgerConfig::default());

    for status in [ConversionStatus::Pending, ConversionStatus::Hold, ConversionStatus::Approved] {
        let callback = ConversionCallback {
            click_identifier: "clk-no-ext".to_string(),
            external_id: None,
            amount: 120,
            currency: None,
            status,
            raw_payload: Value::Null,
        };
        service.ingest(&callback).await.unwrap();
    }

    let conversions = service.list_for_user(9).await.unwrap();
    assert_eq!(conversions.len(), 1);
    assert_eq!(conversions[0].status, ConversionStatus::Approved);

    let snapshot = BalanceAggregator::new(pool).snapshot(9).await.unwrap();
    assert_eq!(snapshot.available, 120);
    assert_eq!(snapshot.pending, 0);
}
