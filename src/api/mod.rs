// ==========================================
// 出入库批量指令 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供消息适配层调用
// ==========================================

pub mod authorization;
pub mod batch_command_api;
pub mod error;

// 重导出核心类型
pub use authorization::{ensure_can_decide, ensure_can_submit, RoleDirectory, StaticRoleDirectory};
pub use batch_command_api::{BatchCommandApi, RequestContext, SubmissionResponse};
pub use error::{ApiError, ApiResult};
