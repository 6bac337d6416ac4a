// ==========================================
// 出入库批量指令 - 执行结果领域模型
// ==========================================
// 职责: 单条执行结果、批次执行结果、执行错误分类
// 错误分类:
// - VALIDATION: 业务条件不满足，单条失败，继续执行
// - DATABASE:   存储失败（含乐观锁重试耗尽），单条失败，继续执行
// - CRITICAL:   完整性失败，停止执行并回滚
// - ROLLBACK:   回滚本身失败，需人工介入
// ==========================================

use crate::domain::approval::StockSnapshot;
use crate::domain::types::{MovementKind, Unit};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ==========================================
// ExecutionErrorKind - 执行错误类别
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionErrorKind {
    Validation,
    Database,
    Critical,
    Rollback,
}

impl ExecutionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionErrorKind::Validation => "VALIDATION",
            ExecutionErrorKind::Database => "DATABASE",
            ExecutionErrorKind::Critical => "CRITICAL",
            ExecutionErrorKind::Rollback => "ROLLBACK",
        }
    }

    /// 面向用户的处理建议
    pub fn suggestion(&self) -> &'static str {
        match self {
            ExecutionErrorKind::Validation => "Please verify your input and try again.",
            ExecutionErrorKind::Database => "Please try again later or with fewer items.",
            ExecutionErrorKind::Critical => {
                "The batch was stopped and reverted. Contact an administrator before retrying."
            }
            ExecutionErrorKind::Rollback => {
                "Some changes could not be reverted. Manual review of the listed items is required."
            }
        }
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// ExecutionError - 执行错误
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Validation, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Database, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Critical, message)
    }

    pub fn rollback(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorKind::Rollback, message)
    }

    pub fn is_critical(&self) -> bool {
        self.kind == ExecutionErrorKind::Critical
    }

    pub fn suggestion(&self) -> &'static str {
        self.kind.suggestion()
    }
}

// ==========================================
// MovementStatus - 单条执行状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementStatus {
    Applied,    // 已生效
    Failed,     // 执行失败（未生效）
    RolledBack, // 曾生效，后因致命错误被回滚
    Skipped,    // 致命错误后未执行
}

impl MovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementStatus::Applied => "Applied",
            MovementStatus::Failed => "Failed",
            MovementStatus::RolledBack => "RolledBack",
            MovementStatus::Skipped => "Skipped",
        }
    }
}

// ==========================================
// MovementResult - 单条执行结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementResult {
    pub line: usize,
    pub item_name: String,
    pub movement_kind: MovementKind,
    pub quantity: Decimal,
    pub unit: Unit,
    pub project: Option<String>,
    pub driver: Option<String>,
    pub status: MovementStatus,
    pub delta: Option<Decimal>,
    pub before: Option<Decimal>,
    pub after: Option<Decimal>,
    pub item_created: bool,
    pub error: Option<ExecutionError>,
}

impl MovementResult {
    pub fn is_success(&self) -> bool {
        self.status == MovementStatus::Applied
    }
}

// ==========================================
// BatchOutcome - 批次执行结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub executed_by: String,
    pub executed_at: DateTime<Utc>,
    pub results: Vec<MovementResult>,
    pub before_snapshot: StockSnapshot,
    pub after_snapshot: StockSnapshot,
    pub rollback_performed: bool,
    pub rollback_errors: Vec<ExecutionError>,
    pub successful: usize,
    pub failed: usize,
    pub summary: String,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// 成功率 (0.0 ~ 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.successful as f64 / self.results.len() as f64
    }

    /// 渲染执行报告（发回给请求人/审批人）
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Batch {}\n{}\n", self.batch_id, self.summary));

        for r in &self.results {
            match r.status {
                MovementStatus::Applied => {
                    let before = r.before.unwrap_or_default().normalize();
                    let after = r.after.unwrap_or_default().normalize();
                    let created = if r.item_created { " (new item)" } else { "" };
                    out.push_str(&format!(
                        "  [ok] #{} {}: {} -> {}{}\n",
                        r.line, r.item_name, before, after, created
                    ));
                }
                MovementStatus::Failed => {
                    let msg = r
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "failed".to_string());
                    out.push_str(&format!("  [failed] #{} {}: {}\n", r.line, r.item_name, msg));
                }
                MovementStatus::RolledBack => {
                    out.push_str(&format!("  [reverted] #{} {}\n", r.line, r.item_name));
                }
                MovementStatus::Skipped => {
                    out.push_str(&format!("  [skipped] #{} {}\n", r.line, r.item_name));
                }
            }
        }

        let mut hints: Vec<&'static str> = self
            .results
            .iter()
            .filter_map(|r| r.error.as_ref().map(|e| e.suggestion()))
            .collect();
        hints.extend(self.rollback_errors.iter().map(|e| e.suggestion()));
        hints.sort_unstable();
        hints.dedup();
        for hint in hints {
            out.push_str(&format!("Hint: {}\n", hint));
        }

        for e in &self.rollback_errors {
            out.push_str(&format!("  [rollback] {}\n", e));
        }
        out
    }
}

/// 按成功率生成分级摘要
///
/// # 参数
/// - successful: 成功条数
/// - total: 总条数
/// - rollback_performed: 是否发生回滚
pub fn summarize(successful: usize, total: usize, rollback_performed: bool) -> String {
    if rollback_performed {
        return format!(
            "Batch stopped by a critical error; all {} applied change(s) were rolled back.",
            total
        );
    }
    if total == 0 {
        return "Nothing to process.".to_string();
    }
    if successful == total {
        return format!("All {} item(s) processed successfully.", total);
    }
    let rate = successful as f64 / total as f64;
    if rate >= 0.75 {
        format!("Mostly successful: {} of {} item(s) processed.", successful, total)
    } else if rate >= 0.5 {
        format!("Partial success: {} of {} item(s) processed.", successful, total)
    } else if successful > 0 {
        format!(
            "Most items failed: only {} of {} item(s) processed.",
            successful, total
        )
    } else {
        format!("No items were processed ({} failed).", total)
    }
}
