// ==========================================
// ConfigManager 集成测试
// ==========================================
// 测试目标: 验证 config_kv 覆写在装配后的流水线中生效
// ==========================================


use std::sync::Arc;

use chrono::Duration;
use stock_batch_ledger::app::AppState;
use stock_batch_ledger::config::{config_keys, BatchConfig, ConfigManager};
use stock_batch_ledger::engine::clock::ManualClock;
use test_helpers::{create_test_db, ctx, t0};

#[test]
fn test_config_manager_on_file_db() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");

    let config_manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");
    assert_eq!(
        config_manager.load_batch_config().unwrap(),
        BatchConfig::default()
    );

    config_manager
        .set_global_config_value(config_keys::RETRY_LIMIT, "7")
        .unwrap();
    assert_eq!(
        config_manager
            .get_global_config_value(config_keys::RETRY_LIMIT)
            .unwrap()
            .as_deref(),
        Some("7")
    );
}

#[test]
fn test_overrides_flow_into_pipeline() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    {
        let config_manager = ConfigManager::new(&db_path).unwrap();
        for (key, value) in [
            (config_keys::MAX_BATCH_SIZE, "2"),
            (config_keys::APPROVAL_TTL_HOURS, "1"),
            (config_keys::STAFF_IDS, "clerk"),
            (config_keys::ADMIN_IDS, "admin"),
        ] {
            config_manager.set_global_config_value(key, value).unwrap();
        }
    }

    let clock = Arc::new(ManualClock::new(t0()));
    let state = AppState::with_clock(db_path, clock.clone()).unwrap();
    assert_eq!(state.config.max_batch_size, 2);
    assert_eq!(state.config.approval_ttl_hours, 1);

    // 超过批次上限
    let err = state
        .batch_api
        .submit_command("/in project: Bridge\ncement, 5\nsand, 3\ngravel, 2", &ctx("clerk"))
        .unwrap_err();
    assert_eq!(err.kind(), "validation_failed");

    // 1 小时后过期
    let batch_id = state
        .batch_api
        .submit_command("/in project: Bridge\ncement, 5", &ctx("clerk"))
        .unwrap()
        .batch_id;
    clock.advance(Duration::minutes(61));
    let err = state.batch_api.approve(&batch_id, &ctx("admin")).unwrap_err();
    assert_eq!(err.kind(), "expired");
}

#[test]
fn test_invalid_ttl_falls_back_to_default() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config_manager = ConfigManager::new(&db_path).unwrap();
    config_manager
        .set_global_config_value(config_keys::APPROVAL_TTL_HOURS, "0")
        .unwrap();

    let config = config_manager.load_batch_config().unwrap();
    assert_eq!(config.approval_ttl_hours, BatchConfig::default().approval_ttl_hours);
}
