// ==========================================
// 出入库批量指令 - 批量指令 API
// ==========================================
// 职责: 串联 解析 -> 权限 -> 校验 -> 查重/暂存 -> 审批/执行
// 约束: 权限在调用引擎之前校验；校验失败的批次不进入审批
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::authorization::{ensure_can_decide, ensure_can_submit, RoleDirectory};
use crate::api::error::{ApiError, ApiResult};
use crate::config::BatchConfig;
use crate::domain::approval::{ApprovalDecision, PendingApproval, PendingSummary, Requester};
use crate::domain::outcome::BatchOutcome;
use crate::domain::types::{BatchFormat, MovementKind};
use crate::engine::approval::{ApprovalCoordinator, DecisionResult};
use crate::engine::validator::{MovementValidator, ValidationWarning};
use crate::parser::BatchParser;
use crate::repository::AuditLogRepository;

// ==========================================
// RequestContext - 请求上下文
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub actor_id: String,
    pub display_name: String,
    pub conversation_id: String,
}

impl RequestContext {
    pub fn new(actor_id: &str, display_name: &str, conversation_id: &str) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            display_name: display_name.to_string(),
            conversation_id: conversation_id.to_string(),
        }
    }

    fn requester(&self) -> Requester {
        Requester {
            actor_id: self.actor_id.clone(),
            display_name: self.display_name.clone(),
            conversation_id: self.conversation_id.clone(),
        }
    }
}

// ==========================================
// SubmissionResponse - 提交结果
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResponse {
    pub batch_id: String,
    pub movement_kind: MovementKind,
    pub format: BatchFormat,
    pub entry_count: usize,
    pub preview: String,
    pub warnings: Vec<ValidationWarning>,
    pub format_tip: String,
}

impl SubmissionResponse {
    /// 回复请求人的文本
    pub fn render(&self) -> String {
        let mut out = format!(
            "Submitted {} for approval.\n{}",
            self.batch_id, self.preview
        );
        for w in &self.warnings {
            match w.line {
                Some(line) => out.push_str(&format!("Warning #{}: {}\n", line, w.message)),
                None => out.push_str(&format!("Warning: {}\n", w.message)),
            }
        }
        out.push_str(&self.format_tip);
        out
    }
}

// ==========================================
// BatchCommandApi - 批量指令 API
// ==========================================
pub struct BatchCommandApi {
    parser: BatchParser,
    validator: MovementValidator,
    coordinator: Arc<ApprovalCoordinator>,
    roles: Arc<dyn RoleDirectory>,
    audit_log: Arc<AuditLogRepository>,
}

impl BatchCommandApi {
    /// 创建新的 BatchCommandApi 实例
    ///
    /// # 参数
    /// - parser: 指令解析器
    /// - config: 流水线参数（校验用）
    /// - coordinator: 审批协调器
    /// - roles: 角色目录
    /// - audit_log: 审计日志仓储（导出用）
    pub fn new(
        parser: BatchParser,
        config: BatchConfig,
        coordinator: Arc<ApprovalCoordinator>,
        roles: Arc<dyn RoleDirectory>,
        audit_log: Arc<AuditLogRepository>,
    ) -> Self {
        Self {
            parser,
            validator: MovementValidator::new(config),
            coordinator,
            roles,
            audit_log,
        }
    }

    // ==========================================
    // 提交
    // ==========================================

    /// 提交批量指令
    ///
    /// # 返回
    /// - Ok(SubmissionResponse): 已进入待审批
    /// - Err(Unauthorized): 角色无权提交该类型
    /// - Err(ValidationFailed): 校验未通过（含逐行原因与修正模板）
    pub fn submit_command(&self, text: &str, ctx: &RequestContext) -> ApiResult<SubmissionResponse> {
        let batch = self.parser.parse(text);

        if let Some(kind) = batch.movement_kind {
            ensure_can_submit(self.roles.as_ref(), &ctx.actor_id, kind)?;
        }

        let report = self.validator.validate(&batch);
        if !report.is_valid() {
            warn!(
                actor = %ctx.actor_id,
                issues = report.issues.len(),
                "批量指令校验未通过"
            );
            return Err(ApiError::ValidationFailed(report));
        }

        let movement_kind = batch
            .movement_kind
            .ok_or_else(|| ApiError::InvalidInput("missing movement type".to_string()))?;
        let format = batch.format;
        let entry_count = batch.entries.len();

        let staged = self.coordinator.stage(batch, ctx.requester())?;
        info!(
            batch_id = %staged.approval.batch_id,
            actor = %ctx.actor_id,
            kind = movement_kind.as_str(),
            entries = entry_count,
            "批量指令已提交"
        );

        Ok(SubmissionResponse {
            batch_id: staged.approval.batch_id,
            movement_kind,
            format,
            entry_count,
            preview: staged.preview,
            warnings: report.warnings,
            format_tip: report.format_tip,
        })
    }

    // ==========================================
    // 审批
    // ==========================================

    /// 审批通过并执行
    pub fn approve(&self, batch_id: &str, ctx: &RequestContext) -> ApiResult<BatchOutcome> {
        ensure_can_decide(self.roles.as_ref(), &ctx.actor_id)?;
        Ok(self.coordinator.approve(batch_id, &ctx.actor_id)?)
    }

    /// 拒绝批次
    pub fn reject(&self, batch_id: &str, ctx: &RequestContext) -> ApiResult<PendingApproval> {
        ensure_can_decide(self.roles.as_ref(), &ctx.actor_id)?;
        Ok(self.coordinator.reject(batch_id, &ctx.actor_id)?)
    }

    /// 按决定分派
    pub fn decide(
        &self,
        decision: ApprovalDecision,
        batch_id: &str,
        ctx: &RequestContext,
    ) -> ApiResult<DecisionResult> {
        ensure_can_decide(self.roles.as_ref(), &ctx.actor_id)?;
        Ok(self.coordinator.decide(decision, batch_id, &ctx.actor_id)?)
    }

    // ==========================================
    // 维护
    // ==========================================

    /// 超时扫描
    pub fn expire_stale(&self) -> ApiResult<Vec<PendingApproval>> {
        Ok(self.coordinator.expire_stale()?)
    }

    /// 清理终态批次
    pub fn purge_consumed(&self) -> ApiResult<usize> {
        Ok(self.coordinator.purge_consumed()?)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn pending_summary(&self) -> ApiResult<PendingSummary> {
        Ok(self.coordinator.pending_summary()?)
    }

    pub fn batch_details(&self, batch_id: &str) -> ApiResult<PendingApproval> {
        Ok(self.coordinator.details(batch_id)?)
    }

    /// 导出批次审计记录 (CSV)
    pub fn export_audit_csv(&self, batch_id: &str) -> ApiResult<String> {
        let records = self.audit_log.list_by_batch(batch_id)?;
        Self::to_csv(&records)
    }

    /// 导出最近审计记录 (CSV)
    pub fn export_recent_audit_csv(&self, limit: usize) -> ApiResult<String> {
        let records = self.audit_log.list_recent(limit)?;
        Self::to_csv(&records)
    }

    fn to_csv(records: &[crate::domain::audit_log::AuditRecord]) -> ApiResult<String> {
        let mut buf = Vec::new();
        AuditLogRepository::export_csv(records, &mut buf)?;
        String::from_utf8(buf).map_err(|e| ApiError::InternalError(e.to_string()))
    }
}
