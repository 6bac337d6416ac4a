// ==========================================
// 出入库批量指令 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换引擎/仓储错误为用户友好的错误消息
// 约束: 所有错误信息必须包含显式原因与修正建议
// ==========================================

use crate::domain::types::ApprovalStatus;
use crate::engine::approval::ApprovalStateError;
use crate::engine::validator::ValidationReport;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 权限错误
    // ==========================================
    #[error("{actor} is not allowed to {action}")]
    Unauthorized { actor: String, action: String },

    // ==========================================
    // 指令错误
    // ==========================================
    #[error("Command rejected: {} problem(s) found", .0.issues.len())]
    ValidationFailed(ValidationReport),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ==========================================
    // 审批状态错误
    // ==========================================
    #[error("Batch {batch_id} was already processed ({status})")]
    AlreadyProcessed {
        batch_id: String,
        status: ApprovalStatus,
    },

    #[error("Batch {batch_id} has expired")]
    Expired {
        batch_id: String,
        requester_conversation: Option<String>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("Concurrent update conflict: {0}")]
    OptimisticLockFailure(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database connection failed: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 稳定的错误类别（日志/统计用）
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized { .. } => "unauthorized",
            ApiError::ValidationFailed(_) => "validation_failed",
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::AlreadyProcessed { .. } => "already_processed",
            ApiError::Expired { .. } => "expired",
            ApiError::NotFound(_) => "not_found",
            ApiError::OptimisticLockFailure(_) => "optimistic_lock_failure",
            ApiError::DatabaseError(_) => "database_error",
            ApiError::DatabaseConnectionError(_) => "database_connection_error",
            ApiError::InternalError(_) => "internal_error",
            ApiError::Other(_) => "other",
        }
    }

    /// 面向用户的处理建议
    pub fn suggestion(&self) -> &'static str {
        match self {
            ApiError::Unauthorized { .. } => "Ask an administrator for access.",
            ApiError::ValidationFailed(_) | ApiError::InvalidInput(_) => {
                "Please verify your input and try again."
            }
            ApiError::AlreadyProcessed { .. } => "No action needed; this batch was already handled.",
            ApiError::Expired { .. } => "Please submit the command again.",
            ApiError::NotFound(_) => "Check the batch id and try again.",
            ApiError::OptimisticLockFailure(_)
            | ApiError::DatabaseError(_)
            | ApiError::DatabaseConnectionError(_) => "Please try again later or with fewer items.",
            ApiError::InternalError(_) | ApiError::Other(_) => {
                "Contact an administrator if the problem persists."
            }
        }
    }

    /// 面向用户的完整消息
    pub fn user_message(&self) -> String {
        match self {
            ApiError::ValidationFailed(report) => report.render(),
            other => format!("{}\n{}", other, other.suggestion()),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将Repository层的技术错误转换为用户友好的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::OptimisticLockFailure {
                entity_id,
                expected,
                actual,
            } => ApiError::OptimisticLockFailure(format!(
                "{} was modified concurrently (expected revision {}, found {})",
                entity_id, expected, actual
            )),

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{} '{}'", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("lock unavailable: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg) => ApiError::DatabaseError(msg),

            // 数据质量错误
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InternalError(format!("stored field {} is invalid: {}", field, message))
            }
            RepositoryError::SerializationError(msg) | RepositoryError::InternalError(msg) => {
                ApiError::InternalError(msg)
            }

            // 通用错误
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ApprovalStateError 转换
// ==========================================
impl From<ApprovalStateError> for ApiError {
    fn from(err: ApprovalStateError) -> Self {
        match err {
            ApprovalStateError::AlreadyProcessed { batch_id, status } => {
                ApiError::AlreadyProcessed { batch_id, status }
            }
            ApprovalStateError::Expired {
                batch_id,
                requester_conversation,
            } => ApiError::Expired {
                batch_id,
                requester_conversation,
            },
            ApprovalStateError::NotFound { batch_id } => {
                ApiError::NotFound(format!("batch '{}'", batch_id))
            }
            ApprovalStateError::InconsistentBatch => ApiError::InvalidInput(err.to_string()),
            ApprovalStateError::Store(e) => ApiError::from(e),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
