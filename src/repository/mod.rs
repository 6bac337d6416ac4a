// ==========================================
// 出入库批量指令 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod approval_repo;
pub mod audit_log_repo;
pub mod error;
pub mod item_repo;
pub mod ledger_store;
mod row_codec;

// 重导出核心仓储
pub use approval_repo::{
    ApprovalBatchRepository, ApprovalStore, InMemoryApprovalStore, TransitionOutcome,
};
pub use audit_log_repo::AuditLogRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use item_repo::CatalogItemRepository;
pub use ledger_store::{LedgerStore, SqliteLedgerStore};
