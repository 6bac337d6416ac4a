// ==========================================
// 出入库批量指令 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod annotation;
pub mod approval;
pub mod audit_log;
pub mod item;
pub mod movement;
pub mod outcome;
pub mod types;

// 重导出核心类型
pub use annotation::{EntryAnnotation, ItemLink, PotentialDuplicate, StockInsufficiencyWarning};
pub use approval::{
    ApprovalDecision, PendingApproval, PendingSummary, Requester, StockLevel, StockSnapshot,
};
pub use audit_log::{AuditAction, AuditRecord};
pub use item::{name_key, CatalogItem, NewCatalogItem};
pub use movement::{
    CandidateMovement, EntryParseFailure, GlobalField, GlobalParameters, ParsedBatch,
};
pub use outcome::{
    summarize, BatchOutcome, ExecutionError, ExecutionErrorKind, MovementResult, MovementStatus,
};
pub use types::{ActorRole, ApprovalStatus, BatchFormat, MovementKind, Unit};
