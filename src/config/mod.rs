// ==========================================
// 出入库批量指令 - 配置层
// ==========================================
// 职责: 流水线参数与权限配置，支持 config_kv 覆写
// 存储: config_kv 表
// ==========================================

pub mod batch_config;
pub mod config_manager;

// 重导出核心配置
pub use batch_config::{BatchConfig, DuplicateConfig};
pub use config_manager::{config_keys, ConfigManager};
