// ==========================================
// 出入库批量指令 - 引擎层
// ==========================================
// 职责: 实现校验、查重、审批、执行等业务规则,不拼 SQL
// 红线: Engine 不拼 SQL, 所有规则必须输出 reason
// ==========================================

pub mod approval;
pub mod clock;
pub mod compensation;
pub mod duplicate;
pub mod executor;
pub mod validator;

// 重导出核心引擎
pub use approval::{
    render_preview, ApprovalCoordinator, ApprovalStateError, DecisionResult, StagedBatch,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use compensation::{CompensationLog, CompensationStep};
pub use duplicate::DuplicateDetector;
pub use executor::BatchExecutor;
pub use validator::{
    MovementValidator, ValidationIssue, ValidationReason, ValidationReport, ValidationWarning,
};
