// ==========================================
// 并发控制测试
// ==========================================
// 职责: 验证审批决策的唯一性与台账写入的乐观锁
// ==========================================


#[cfg(test)]
mod concurrent_control_test {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use rust_decimal::Decimal;
    use stock_batch_ledger::api::ApiError;
    use stock_batch_ledger::config::BatchConfig;
    use stock_batch_ledger::domain::approval::ApprovalDecision;
    use stock_batch_ledger::domain::types::{ApprovalStatus, Unit};
    use stock_batch_ledger::repository::{LedgerStore, RepositoryError};

    use crate::test_helpers::{ctx, on_hand, seed_item, TestApp, ADMIN};

    // ==========================================
    // 决策竞争
    // ==========================================

    #[test]
    fn test_simultaneous_approvals_have_one_winner() {
        let app = TestApp::new();
        let batch_id = app.submit("/in project: Bridge\ncement, 50 bags");

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let api = app.api.clone();
                let barrier = barrier.clone();
                let batch_id = batch_id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    api.approve(&batch_id, &ctx(ADMIN))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err, ApiError::AlreadyProcessed { .. }), "{:?}", err);
        }

        assert_eq!(on_hand(app.ledger.as_ref(), "cement"), Some(Decimal::from(50)));
    }

    #[test]
    fn test_approve_and_reject_race() {
        let app = TestApp::new();
        let batch_id = app.submit("/in project: Bridge\nsand, 3 tons");

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [ApprovalDecision::Approve, ApprovalDecision::Reject]
            .into_iter()
            .map(|decision| {
                let api = app.api.clone();
                let barrier = barrier.clone();
                let batch_id = batch_id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    api.decide(decision, &batch_id, &ctx(ADMIN)).is_ok()
                })
            })
            .collect();
        let wins: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(wins.iter().filter(|w| **w).count(), 1);

        let record = app.api.batch_details(&batch_id).unwrap();
        match record.status {
            ApprovalStatus::Approved => {
                assert_eq!(on_hand(app.ledger.as_ref(), "sand"), Some(Decimal::from(3)))
            }
            ApprovalStatus::Rejected => assert_eq!(on_hand(app.ledger.as_ref(), "sand"), None),
            other => panic!("unexpected status {}", other),
        }
    }

    // ==========================================
    // 台账乐观锁
    // ==========================================

    #[test]
    fn test_stale_revision_rejected() {
        let app = TestApp::new();
        let item = seed_item(app.ledger.as_ref(), "cement", Unit::Bag, 10);

        app.ledger
            .apply_delta("cement", Decimal::from(1), item.revision)
            .unwrap();
        let err = app
            .ledger
            .apply_delta("cement", Decimal::from(1), item.revision)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLockFailure { .. }));
        assert_eq!(on_hand(app.ledger.as_ref(), "cement"), Some(Decimal::from(11)));
    }

    #[test]
    fn test_concurrent_batches_on_same_item_stay_consistent() {
        let app = TestApp::with_config(BatchConfig {
            optimistic_retry_limit: 50,
            ..BatchConfig::default()
        });
        seed_item(app.ledger.as_ref(), "cement", Unit::Bag, 100);

        let batch_ids: Vec<String> = (0..10)
            .map(|_| app.submit("/out project: Bridge\ncement, 5 bags"))
            .collect();

        let barrier = Arc::new(Barrier::new(batch_ids.len()));
        let handles: Vec<_> = batch_ids
            .into_iter()
            .map(|batch_id| {
                let api = app.api.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    api.approve(&batch_id, &ctx(ADMIN)).unwrap()
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let applied: usize = outcomes.iter().map(|o| o.successful).sum();
        assert!(applied >= 1);
        assert!(outcomes.iter().all(|o| !o.rollback_performed));

        let expected = Decimal::from(100) - Decimal::from(5 * applied as i64);
        assert_eq!(on_hand(app.ledger.as_ref(), "cement"), Some(expected));
    }
}
