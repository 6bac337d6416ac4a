// ==========================================
// 审批流程集成测试
// ==========================================
// 职责: 验证 Pending -> Approved/Rejected/Expired 状态机、权限与持久化
// ==========================================


#[cfg(test)]
mod approval_workflow_test {
    use chrono::Duration;
    use rust_decimal::Decimal;
    use stock_batch_ledger::api::ApiError;
    use stock_batch_ledger::app::AppState;
    use stock_batch_ledger::config::config_keys;
    use stock_batch_ledger::domain::approval::ApprovalDecision;
    use stock_batch_ledger::domain::types::{ApprovalStatus, Unit};
    use stock_batch_ledger::engine::approval::DecisionResult;
    use stock_batch_ledger::repository::AuditLogRepository;

    use crate::test_helpers::{
        create_test_db, ctx, on_hand, seed_item, TestApp, ADMIN, STAFF, VIEWER,
    };

    // ==========================================
    // 决策只生效一次
    // ==========================================

    #[test]
    fn test_repeat_approval_is_already_processed() {
        let app = TestApp::new();
        let batch_id = app.submit("/in project: Bridge\ncement, 50 bags");

        let outcome = app.api.approve(&batch_id, &ctx(ADMIN)).unwrap();
        assert_eq!(outcome.successful, 1);
        assert_eq!(on_hand(app.ledger.as_ref(), "cement"), Some(Decimal::from(50)));

        let err = app.api.approve(&batch_id, &ctx(ADMIN)).unwrap_err();
        assert!(matches!(
            err,
            ApiError::AlreadyProcessed {
                status: ApprovalStatus::Approved,
                ..
            }
        ));
        let err = app.api.reject(&batch_id, &ctx(ADMIN)).unwrap_err();
        assert_eq!(err.kind(), "already_processed");

        // 台账未被重复写入
        assert_eq!(on_hand(app.ledger.as_ref(), "cement"), Some(Decimal::from(50)));
    }

    #[test]
    fn test_reject_leaves_ledger_untouched() {
        let app = TestApp::new();
        seed_item(app.ledger.as_ref(), "sand", Unit::Ton, 10);
        let batch_id = app.submit("/out project: Bridge\nsand, 4 tons");

        let result = app
            .api
            .decide(ApprovalDecision::Reject, &batch_id, &ctx(ADMIN))
            .unwrap();
        let DecisionResult::Rejected(record) = result else {
            panic!("expected rejection");
        };
        assert_eq!(record.status, ApprovalStatus::Rejected);
        assert_eq!(record.decided_by.as_deref(), Some(ADMIN));
        assert_eq!(on_hand(app.ledger.as_ref(), "sand"), Some(Decimal::from(10)));

        let audit = AuditLogRepository::new(app.conn.clone())
            .list_by_batch(&batch_id)
            .unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "BatchRejected");
    }

    #[test]
    fn test_unknown_batch_not_found() {
        let app = TestApp::new();
        let err = app.api.approve("batch_0_deadbeef", &ctx(ADMIN)).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    // ==========================================
    // 超时
    // ==========================================

    #[test]
    fn test_expired_batch_cannot_be_approved() {
        let app = TestApp::new();
        let batch_id = app.submit("/in project: Bridge\ncement, 50 bags");

        app.clock.advance(Duration::hours(24));
        let err = app.api.approve(&batch_id, &ctx(ADMIN)).unwrap_err();
        assert!(matches!(err, ApiError::Expired { .. }));
        assert_eq!(on_hand(app.ledger.as_ref(), "cement"), None);

        // 已转为 Expired 的批次再次决策
        let err = app.api.approve(&batch_id, &ctx(ADMIN)).unwrap_err();
        assert!(matches!(
            err,
            ApiError::AlreadyProcessed {
                status: ApprovalStatus::Expired,
                ..
            }
        ));
    }

    #[test]
    fn test_expire_sweep_and_retention() {
        let app = TestApp::new();
        let first = app.submit("/in project: Bridge\ncement, 50 bags");
        app.clock.advance(Duration::hours(2));
        let second = app.submit("/in project: Bridge\nsand, 3 tons");

        app.clock.advance(Duration::hours(23));
        let expired = app.api.expire_stale().unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].batch_id, first);

        let summary = app.api.pending_summary().unwrap();
        assert_eq!(summary.pending_batches, 1);
        assert_eq!(summary.receipts, 1);

        // 保留期内仍可识别重复决策
        assert_eq!(app.api.purge_consumed().unwrap(), 0);
        assert_eq!(app.api.batch_details(&first).unwrap().status, ApprovalStatus::Expired);

        app.clock.advance(Duration::hours(73));
        app.api.expire_stale().unwrap();
        assert_eq!(app.api.purge_consumed().unwrap(), 1);
        assert_eq!(app.api.batch_details(&first).unwrap_err().kind(), "not_found");
        assert_eq!(app.api.batch_details(&second).unwrap().status, ApprovalStatus::Expired);
    }

    // ==========================================
    // 权限
    // ==========================================

    #[test]
    fn test_roles_gate_submit_and_decide() {
        let app = TestApp::new();

        let err = app
            .api
            .submit_command("/in project: Bridge\ncement, 5 bags", &ctx(VIEWER))
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");

        let err = app
            .api
            .submit_command("/adjust project: Bridge\ncement, -2 bags", &ctx(STAFF))
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        assert!(app
            .api
            .submit_command("/adjust project: Bridge\ncement, -2 bags", &ctx(ADMIN))
            .is_ok());

        let batch_id = app.submit("/in project: Bridge\ncement, 5 bags");
        let err = app.api.approve(&batch_id, &ctx(STAFF)).unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        assert_eq!(app.api.batch_details(&batch_id).unwrap().status, ApprovalStatus::Pending);
    }

    #[test]
    fn test_invalid_command_never_staged() {
        let app = TestApp::new();
        let err = app
            .api
            .submit_command("/in cement, 5 bags", &ctx(STAFF))
            .unwrap_err();
        let ApiError::ValidationFailed(report) = &err else {
            panic!("expected validation failure, got {:?}", err);
        };
        assert_eq!(report.issues.len(), 1);
        assert!(err.user_message().starts_with("The command was not accepted"));
        assert_eq!(app.api.pending_summary().unwrap().pending_batches, 0);
    }

    // ==========================================
    // 持久化 (重启后继续审批)
    // ==========================================

    #[test]
    fn test_pending_batch_survives_restart() {
        let (_temp_file, db_path) = create_test_db().unwrap();

        let batch_id = {
            let state = AppState::new(db_path.clone()).unwrap();
            state
                .config_manager
                .set_global_config_value(config_keys::ADMIN_IDS, "boss")
                .unwrap();
            state
                .config_manager
                .set_global_config_value(config_keys::STAFF_IDS, "clerk")
                .unwrap();
            // 角色在装配时加载，需重新装配
            let state = AppState::new(db_path.clone()).unwrap();
            state
                .batch_api
                .submit_command("/in project: Bridge\ncement, 50 bags", &ctx("clerk"))
                .unwrap()
                .batch_id
        };

        let state = AppState::new(db_path).unwrap();
        let outcome = state.batch_api.approve(&batch_id, &ctx("boss")).unwrap();
        assert_eq!(outcome.successful, 1);

        let csv = state.batch_api.export_audit_csv(&batch_id).unwrap();
        assert!(csv.starts_with("recorded_at,batch_id,action"));
        assert!(csv.contains("ItemCreated"));
        assert!(csv.contains("MovementApplied"));
        assert!(csv.contains("BatchExecuted"));
    }
}
