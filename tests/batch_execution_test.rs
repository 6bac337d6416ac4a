// ==========================================
// 批次执行集成测试
// ==========================================
// 职责: 验证审批通过后的顺序执行、部分失败与致命错误回滚
// ==========================================


#[cfg(test)]
mod batch_execution_test {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use stock_batch_ledger::domain::outcome::{ExecutionErrorKind, MovementStatus};
    use stock_batch_ledger::domain::types::{ApprovalStatus, Unit};
    use stock_batch_ledger::repository::{AuditLogRepository, LedgerStore};

    use crate::test_helpers::{
        ctx, on_hand, seed_item, snapshot_values, FaultyLedger, TestApp, ADMIN,
    };

    // ==========================================
    // 全部成功
    // ==========================================

    #[test]
    fn test_bridge_receipts_all_succeed() {
        let app = TestApp::new();
        let batch_id = app.submit("/in project: Bridge, driver: X\ncement, 50 bags\nsteel bars, 100 pieces");

        let outcome = app.api.approve(&batch_id, &ctx(ADMIN)).unwrap();
        assert_eq!(outcome.successful, 2);
        assert_eq!(outcome.failed, 0);
        assert!(!outcome.rollback_performed);
        assert!(outcome.summary.starts_with("All 2"));
        assert!(outcome.results.iter().all(|r| r.item_created));
        for result in &outcome.results {
            assert_eq!(result.project.as_deref(), Some("Bridge"));
            assert_eq!(result.driver.as_deref(), Some("X"));
        }

        assert_eq!(on_hand(app.ledger.as_ref(), "cement"), Some(Decimal::from(50)));
        assert_eq!(on_hand(app.ledger.as_ref(), "steel bars"), Some(Decimal::from(100)));
        assert_eq!(
            snapshot_values(&outcome.after_snapshot),
            vec![
                ("cement".to_string(), Decimal::from(50)),
                ("steel bars".to_string(), Decimal::from(100)),
            ]
        );

        let record = app.api.batch_details(&batch_id).unwrap();
        assert_eq!(record.status, ApprovalStatus::Approved);
        assert_eq!(record.outcome.as_ref().map(|o| o.successful), Some(2));
    }

    #[test]
    fn test_adjustment_applies_signed_quantity() {
        let app = TestApp::new();
        seed_item(app.ledger.as_ref(), "cement", Unit::Bag, 10);
        let batch_id = app
            .api
            .submit_command("/adjust project: Stocktake\ncement, -3 bags", &ctx(ADMIN))
            .unwrap()
            .batch_id;

        let outcome = app.api.approve(&batch_id, &ctx(ADMIN)).unwrap();
        assert_eq!(outcome.successful, 1);
        assert_eq!(outcome.results[0].delta, Some(Decimal::from(-3)));
        assert_eq!(on_hand(app.ledger.as_ref(), "cement"), Some(Decimal::from(7)));
    }

    // ==========================================
    // 非致命失败: 继续执行，不回滚
    // ==========================================

    #[test]
    fn test_partial_failure_continues() {
        let app = TestApp::new();
        seed_item(app.ledger.as_ref(), "cement", Unit::Bag, 10);
        let batch_id = app.submit("/out project: Bridge\ncement, 4 bags\nsand, 2 tons\ncement, 20 bags");

        let outcome = app.api.approve(&batch_id, &ctx(ADMIN)).unwrap();
        assert_eq!(outcome.successful, 1);
        assert_eq!(outcome.failed, 2);
        assert!(!outcome.rollback_performed);

        let statuses: Vec<MovementStatus> = outcome.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![MovementStatus::Applied, MovementStatus::Failed, MovementStatus::Failed]
        );
        for failed in outcome.results.iter().filter(|r| !r.is_success()) {
            assert_eq!(
                failed.error.as_ref().map(|e| e.kind),
                Some(ExecutionErrorKind::Validation)
            );
        }
        assert!(outcome.results[1]
            .error
            .as_ref()
            .map(|e| e.message.contains("Item not found"))
            .unwrap_or(false));

        // after = before + 已生效条目的带符号数量
        assert_eq!(on_hand(app.ledger.as_ref(), "cement"), Some(Decimal::from(6)));
        assert_eq!(on_hand(app.ledger.as_ref(), "sand"), None);
        assert!(outcome.render_report().contains("Insufficient stock"));
    }

    #[test]
    fn test_stock_changed_after_staging_uses_current_value() {
        let app = TestApp::new();
        seed_item(app.ledger.as_ref(), "cement", Unit::Bag, 10);
        let batch_id = app.submit("/out project: Bridge\ncement, 4 bags");

        // 审批前台账被其他批次改动
        let item = app.ledger.get_item_by_name("cement").unwrap().unwrap();
        app.ledger
            .apply_delta("cement", Decimal::from(5), item.revision)
            .unwrap();

        let outcome = app.api.approve(&batch_id, &ctx(ADMIN)).unwrap();
        assert_eq!(outcome.results[0].before, Some(Decimal::from(15)));
        assert_eq!(outcome.results[0].after, Some(Decimal::from(11)));
        assert_eq!(on_hand(app.ledger.as_ref(), "cement"), Some(Decimal::from(11)));
    }

    // ==========================================
    // 致命错误: 停止并回滚
    // ==========================================

    #[test]
    fn test_critical_failure_rolls_back_everything() {
        let app = TestApp::with_execution_ledger(|inner| Arc::new(FaultyLedger::new(inner, 2)));
        seed_item(app.ledger.as_ref(), "cement", Unit::Bag, 5);
        let batch_id = app.submit("/in project: Bridge\ncement, 50 bags\nsand, 3 tons\ngravel, 2 tons");

        let outcome = app.api.approve(&batch_id, &ctx(ADMIN)).unwrap();
        assert!(outcome.rollback_performed);
        assert_eq!(outcome.successful, 0);
        assert!(outcome.rollback_errors.is_empty());

        let statuses: Vec<MovementStatus> = outcome.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                MovementStatus::RolledBack,
                MovementStatus::Failed,
                MovementStatus::Skipped
            ]
        );
        assert_eq!(
            outcome.results[1].error.as_ref().map(|e| e.kind),
            Some(ExecutionErrorKind::Critical)
        );

        assert_eq!(outcome.after_snapshot, outcome.before_snapshot);
        assert_eq!(on_hand(app.ledger.as_ref(), "cement"), Some(Decimal::from(5)));
        assert_eq!(on_hand(app.ledger.as_ref(), "sand"), None);
        assert_eq!(on_hand(app.ledger.as_ref(), "gravel"), None);

        let actions: Vec<String> = AuditLogRepository::new(app.conn.clone())
            .list_by_batch(&batch_id)
            .unwrap()
            .into_iter()
            .map(|r| r.action)
            .collect();
        assert_eq!(actions, vec!["BatchRolledBack".to_string()]);
    }

    #[test]
    fn test_rollback_keeps_item_stocked_by_another_batch() {
        let app = TestApp::with_execution_ledger(|inner| {
            Arc::new(FaultyLedger::new(inner, 2).with_concurrent_receipt("rebar", 7))
        });
        let batch_id = app.submit("/in project: Bridge; rebar, 10; sand, 3");

        let outcome = app.api.approve(&batch_id, &ctx(ADMIN)).unwrap();
        assert!(outcome.rollback_performed);
        assert_eq!(outcome.successful, 0);

        // 本批次的 +10 已撤销，另一批次的 +7 保留
        assert_eq!(on_hand(app.ledger.as_ref(), "rebar"), Some(Decimal::from(7)));
        assert_eq!(on_hand(app.ledger.as_ref(), "sand"), None);

        assert_eq!(outcome.rollback_errors.len(), 1);
        assert!(outcome.rollback_errors[0].message.contains("kept 'rebar'"));
    }
}
