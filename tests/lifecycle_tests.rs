mod common;

use serde_json::json;

use cpa_ledger::config::LedgerConfig;
use cpa_ledger::conversion::{ConversionCallback, ConversionService, ConversionStatus};
use cpa_ledger::ledger::{BalanceAggregator, BalanceSnapshot, EntryKind, LedgerStore, Reference};
use cpa_ledger::payout::{NewPayoutRequest, PayoutMethod, PayoutService, PayoutStatus};

#[tokio::test]
async fn test_conversion_to_issued_payout() {
    let pool = common::fresh_pool().await;
    common::register_click(&pool, 42, "clk-life").await;

    let conversions = ConversionService::new(pool.clone(), LedgerConfig::default());
    let payouts = PayoutService::new(pool.clone(), LedgerConfig::default());
    let balances = BalanceAggregator::new(pool.clone());
    let ledger = LedgerStore::new(pool.clone());

    assert_eq!(balances.snapshot(42).await.unwrap(), BalanceSnapshot::default());

    let payload = json!({
        "click_id": "clk-life",
        "conversion_id": "conv-1",
        "payout": "1000",
        "currency": "rub",
        "status": "approved",
    });
    let callback = ConversionCallback::from_payload(payload.as_object().unwrap().clone()).unwrap();
    let outcome = conversions.ingest(&callback).await.unwrap();
    assert_eq!(outcome.conversion.status, ConversionStatus::Approved);
    assert_eq!(outcome.conversion.user_id, 42);
    assert_eq!(
        balances.snapshot(42).await.unwrap(),
        BalanceSnapshot { available: 1000, pending: 0, locked: 0 }
    );

    let created = payouts
        .create_request(&NewPayoutRequest {
            user_id: 42,
            method: PayoutMethod::Direct,
            amount: 1000,
            phone: Some("+79991234567".to_string()),
            email: Some("life@example.com".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(
        balances.snapshot(42).await.unwrap(),
        BalanceSnapshot { available: 0, pending: 0, locked: 1000 }
    );

    let update = payouts
        .mark_status(created.request.id, PayoutStatus::Issued)
        .await
        .unwrap();
    assert!(update.applied);
    assert_eq!(update.previous, PayoutStatus::Pending);
    assert_eq!(balances.snapshot(42).await.unwrap(), BalanceSnapshot::default());

    let debits: Vec<i64> = ledger
        .entries_for_user(42, 100)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == EntryKind::Debit)
        .map(|e| e.amount)
        .collect();
    assert_eq!(debits, vec![1000]);

    let payout_entries = ledger
        .entries_for_reference(Reference::Payout(created.request.id))
        .await
        .unwrap();
    assert!(payout_entries
        .iter()
        .all(|e| e.reference() == Some(format!("payout:{}", created.request.id))));
}

#[tokio::test]
async fn test_available_plus_locked_only_moves_with_credit_and_debit() {
    let pool = common::fresh_pool().await;
    common::credit(&pool, 5, 3000).await;

    let payouts = PayoutService::new(pool.clone(), LedgerConfig::default());
    let balances = BalanceAggregator::new(pool.clone());
    let total = |s: BalanceSnapshot| s.available + s.locked;

    let first = payouts
        .create_request(&NewPayoutRequest {
            user_id: 5,
            method: PayoutMethod::Wb,
            amount: 1000,
            phone: Some("+70000000001".to_string()),
            email: Some("wb@example.com".to_string()),
        })
        .await
        .unwrap();
    let second = payouts
        .create_request(&NewPayoutRequest {
            user_id: 5,
            method: PayoutMethod::GoldenApple,
            amount: 800,
            phone: Some("+70000000001".to_string()),
            email: Some("wb@example.com".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(total(balances.snapshot(5).await.unwrap()), 3000);

    payouts.mark_status(second.request.id, PayoutStatus::Failed).await.unwrap();
    assert_eq!(total(balances.snapshot(5).await.unwrap()), 3000);

    payouts.mark_status(first.request.id, PayoutStatus::Issued).await.unwrap();
    let snapshot = balances.snapshot(5).await.unwrap();
    assert_eq!(total(snapshot), 2000);
    assert_eq!(snapshot, BalanceSnapshot { available: 2000, pending: 0, locked: 0 });
}
