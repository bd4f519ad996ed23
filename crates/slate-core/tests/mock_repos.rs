//! In-memory repositories keep the conditional semantics of the SQL statements

mod common;

use common::{
    MockBanRepository, MockEntitlementRepository, MockPaymentLedgerRepository,
    MockSessionRepository,
};
use slate_db::{
    BanRepository, CreateBan, EntitlementRepository, PaymentLedgerRepository, RecordTransaction,
    SessionRepository,
};

#[tokio::test]
async fn test_mock_consume_respects_allowance() {
    let repo = MockEntitlementRepository::new();
    repo.insert(MockEntitlementRepository::create_test_row("uid", "a@b.c"));

    assert!(repo.try_consume_pages("uid", 10).await.unwrap().is_some());
    assert!(repo.try_consume_pages("uid", 1).await.unwrap().is_none());
    assert_eq!(repo.usage_entries("uid"), 1);
}

#[tokio::test]
async fn test_mock_claim_is_single_winner() {
    let ledger = MockPaymentLedgerRepository::new();
    let record = RecordTransaction {
        transaction_id: "txn".into(),
        user_id: "uid".into(),
        amount: 49_900,
        currency: "INR".into(),
        gateway: "payu".into(),
        metadata: serde_json::json!({}),
        error_message: None,
    };
    assert!(ledger.claim_success(record.clone()).await.unwrap());
    assert!(!ledger.claim_success(record.clone()).await.unwrap());

    ledger.release_claim("txn", "boom").await.unwrap();
    assert_eq!(ledger.get("txn").unwrap().status, "pending");
    assert!(ledger.claim_success(record).await.unwrap());
}

#[tokio::test]
async fn test_mock_injected_failure() {
    let repo = MockSessionRepository::new();
    repo.failures.fail("delete_sessions");
    assert!(repo.delete_for_user("uid").await.is_err());
    repo.failures.heal("delete_sessions");
    assert_eq!(repo.delete_for_user("uid").await.unwrap(), 0);
}

#[tokio::test]
async fn test_mock_ban_keeps_every_uid_for_a_shared_email() {
    let bans = MockBanRepository::new();
    for uid in ["uid-a", "uid-b"] {
        bans.ban(CreateBan {
            user_id: uid.to_string(),
            email: "shared@example.com".to_string(),
            reason: "test".to_string(),
        })
        .await
        .unwrap();
    }

    assert_eq!(bans.len(), 2);
    assert!(bans.is_uid_banned("uid-a"));
    assert!(bans.is_uid_banned("uid-b"));
    assert!(bans.is_banned("uid-new", "shared@example.com").await.unwrap());
    assert!(!bans.is_banned("uid-new", "other@example.com").await.unwrap());
}
