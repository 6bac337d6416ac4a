// ==========================================
// 出入库批量指令 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 流程: 解析 -> 校验 -> 查重 -> 审批 -> 顺序执行(失败补偿) -> 审计
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 指令解析层
pub mod parser;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 校验/查重/审批/执行
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 消息传输与装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ActorRole, ApprovalStatus, BatchFormat, MovementKind, Unit};

// 领域实体
pub use domain::{
    AuditRecord, BatchOutcome, CandidateMovement, CatalogItem, GlobalParameters, ParsedBatch,
    PendingApproval,
};

// 解析与引擎
pub use engine::{ApprovalCoordinator, BatchExecutor, DuplicateDetector, MovementValidator};
pub use parser::BatchParser;

// API
pub use api::{ApiError, BatchCommandApi, RequestContext};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "stock-batch-ledger";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
