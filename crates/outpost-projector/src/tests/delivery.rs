//! Happy-path delivery: batches, ordering, terminal immutability.

use chrono::Duration;
use outpost_database::OutboxStatus;

use super::harness::TestHarness;
use crate::ProjectorConfig;

#[tokio::test]
async fn backlog_publishes_in_created_order_as_one_batch() {
    let h = TestHarness::new().await;
    let first = h
        .seed_event("alpha", "order.placed", TestHarness::good_payload("o-1"), Duration::minutes(3))
        .await;
    let second = h
        .seed_event("alpha", "order.placed", TestHarness::good_payload("o-2"), Duration::minutes(2))
        .await;
    let third = h
        .seed_event("alpha", "order.placed", TestHarness::good_payload("o-3"), Duration::minutes(1))
        .await;

    let projector = h.projector("alpha");
    let report = projector.publish_all().await.unwrap();

    assert_eq!(report.claimed, 3);
    assert_eq!(report.published, 3);
    assert_eq!(report.poisoned, 0);

    // One bus call carrying the whole batch, oldest row first.
    assert_eq!(h.bus.publish_calls(), 1);
    let published: Vec<_> = h.bus.published().into_iter().map(|e| e.id).collect();
    assert_eq!(published, vec![first, second, third]);

    for id in [first, second, third] {
        let record = h.get(id).await;
        assert_eq!(record.status, OutboxStatus::Sent);
        assert!(record.claimed_by.is_none());
        assert!(record.last_error.is_none());
    }
}

#[tokio::test]
async fn sent_rows_are_never_picked_up_again() {
    let h = TestHarness::new().await;
    let id = h
        .seed_event("alpha", "order.placed", TestHarness::good_payload("o-1"), Duration::minutes(1))
        .await;

    let projector = h.projector("alpha");
    projector.publish_all().await.unwrap();
    assert_eq!(h.get(id).await.status, OutboxStatus::Sent);

    let report = projector.process_once().await.unwrap();
    assert_eq!(report.claimed, 0);
    assert_eq!(h.bus.len(), 1);
    assert_eq!(h.bus.publish_calls(), 1);
}

#[tokio::test]
async fn envelope_carries_row_identity_and_decoded_payload() {
    let h = TestHarness::new().await;
    let id = h
        .seed_event("alpha", "order.placed", TestHarness::good_payload("o-9"), Duration::minutes(1))
        .await;

    h.projector("alpha").process_once().await.unwrap();

    let envelopes = h.bus.published();
    assert_eq!(envelopes.len(), 1);
    let envelope = &envelopes[0];
    assert_eq!(envelope.id, id);
    assert_eq!(envelope.tenant_id, "alpha");
    assert_eq!(envelope.event_type, "order.placed");
    assert_eq!(envelope.topic, "orders");
    assert_eq!(envelope.payload["order_id"], "o-9");
    assert_eq!(envelope.payload["amount_cents"], 500);
}

#[tokio::test]
async fn full_batch_reports_more_work() {
    let h = TestHarness::new().await;
    for i in 0..3 {
        h.seed_event(
            "alpha",
            "order.placed",
            TestHarness::good_payload(&format!("o-{i}")),
            Duration::minutes(10 - i),
        )
        .await;
    }

    let config = ProjectorConfig {
        batch_size: 2,
        ..Default::default()
    };
    let projector = h.projector_with("alpha", config);

    let first = projector.process_once().await.unwrap();
    assert_eq!(first.claimed, 2);
    assert!(first.more_work);

    let second = projector.process_once().await.unwrap();
    assert_eq!(second.claimed, 1);
    assert!(!second.more_work);

    let third = projector.process_once().await.unwrap();
    assert_eq!(third.claimed, 0);
    assert!(!third.handled_work());
}

#[tokio::test]
async fn empty_backlog_reports_no_work() {
    let h = TestHarness::new().await;
    let projector = h.projector("alpha");

    let report = projector.process_once().await.unwrap();
    assert_eq!(report.claimed, 0);
    assert!(!report.more_work);
    assert!(!report.handled_work());
    assert_eq!(h.bus.publish_calls(), 0);
}
