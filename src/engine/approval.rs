// ==========================================
// 出入库批量指令 - 审批流程协调器
// ==========================================
// 状态机: Pending -> Approved / Rejected / Expired
// 职责:
// 1) stage: 查重标注、记录前快照、生成 batch_id、持久化、生成预览
// 2) approve / reject: 原子状态转换 (CAS) 后执行或拒绝
// 3) expire_stale / purge_consumed: 超时扫描与终态清理
// 红线: Pending 期间不修改台账
// 红线: 同一批次只能被消费一次，输掉竞争的一方得到 AlreadyProcessed
// 说明: 权限校验在 API 层完成
// ==========================================

use crate::config::BatchConfig;
use crate::domain::approval::{ApprovalDecision, PendingApproval, PendingSummary, Requester};
use crate::domain::audit_log::{AuditAction, AuditRecord};
use crate::domain::movement::ParsedBatch;
use crate::domain::outcome::BatchOutcome;
use crate::domain::types::{ApprovalStatus, MovementKind};
use crate::engine::clock::Clock;
use crate::engine::duplicate::DuplicateDetector;
use crate::engine::executor::{touched_names, BatchExecutor};
use crate::repository::{ApprovalStore, LedgerStore, RepositoryError, TransitionOutcome};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

const SYSTEM_ACTOR: &str = "system";

// ==========================================
// ApprovalStateError - 审批状态错误
// ==========================================
#[derive(Error, Debug)]
pub enum ApprovalStateError {
    #[error("Batch {batch_id} was already processed ({status})")]
    AlreadyProcessed {
        batch_id: String,
        status: ApprovalStatus,
    },

    /// requester_conversation 仅在本次调用完成 Pending -> Expired 转换时携带，
    /// 由调用方通知请求人（其余情况已由转换方通知）
    #[error("Batch {batch_id} has expired")]
    Expired {
        batch_id: String,
        requester_conversation: Option<String>,
    },

    #[error("Batch {batch_id} not found")]
    NotFound { batch_id: String },

    #[error("Batch has unresolved problems and cannot be submitted for approval")]
    InconsistentBatch,

    #[error(transparent)]
    Store(#[from] RepositoryError),
}

/// 暂存结果
#[derive(Debug, Clone)]
pub struct StagedBatch {
    pub approval: PendingApproval,
    pub preview: String,
}

/// 决策结果
#[derive(Debug, Clone)]
pub enum DecisionResult {
    Approved(BatchOutcome),
    Rejected(PendingApproval),
}

// ==========================================
// ApprovalCoordinator - 审批流程协调器
// ==========================================
pub struct ApprovalCoordinator {
    store: Arc<dyn ApprovalStore>,
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    config: BatchConfig,
    detector: DuplicateDetector,
    executor: BatchExecutor,
}

impl ApprovalCoordinator {
    pub fn new(
        store: Arc<dyn ApprovalStore>,
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        config: BatchConfig,
    ) -> Self {
        Self {
            detector: DuplicateDetector::new(config.duplicate.clone()),
            executor: BatchExecutor::new(ledger.clone(), config.clone()),
            store,
            ledger,
            clock,
            config,
        }
    }

    /// 生成批次 ID: batch_<unix秒>_<8位十六进制>
    fn new_batch_id(now: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("batch_{}_{}", now.timestamp(), &suffix[..8])
    }

    // ==========================================
    // 暂存
    // ==========================================

    /// 暂存批次等待审批
    ///
    /// # 参数
    /// - batch: 已通过校验的解析批次
    /// - requester: 请求人
    ///
    /// # 返回
    /// - Ok(StagedBatch): 持久化后的待审批批次与预览文本
    /// - Err(InconsistentBatch): 批次存在解析错误或类型不一致
    pub fn stage(
        &self,
        mut batch: ParsedBatch,
        requester: Requester,
    ) -> Result<StagedBatch, ApprovalStateError> {
        batch.refresh_consistency();
        if !batch.is_consistent {
            return Err(ApprovalStateError::InconsistentBatch);
        }

        let catalog = self.ledger.list_all_items()?;
        let annotations = self.detector.annotate(&batch, &catalog);
        DuplicateDetector::apply_links(&mut batch, &annotations);

        let now = self.clock.now();
        let names = touched_names(&batch.entries);
        let before_snapshot = self.ledger.snapshot(&names)?;

        let approval = PendingApproval {
            batch_id: Self::new_batch_id(now),
            batch,
            annotations,
            requester,
            before_snapshot,
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at: now + self.config.approval_ttl(),
            decided_by: None,
            decided_at: None,
            outcome: None,
        };
        self.store.put(&approval)?;

        info!(
            batch_id = %approval.batch_id,
            requester = %approval.requester.actor_id,
            entries = approval.batch.entries.len(),
            "批次已进入待审批"
        );
        let preview = render_preview(&approval);
        Ok(StagedBatch { approval, preview })
    }

    // ==========================================
    // 决策
    // ==========================================

    /// 按决定分派
    pub fn decide(
        &self,
        decision: ApprovalDecision,
        batch_id: &str,
        actor: &str,
    ) -> Result<DecisionResult, ApprovalStateError> {
        match decision {
            ApprovalDecision::Approve => self.approve(batch_id, actor).map(DecisionResult::Approved),
            ApprovalDecision::Reject => self.reject(batch_id, actor).map(DecisionResult::Rejected),
        }
    }

    /// 审批通过并执行
    ///
    /// # 返回
    /// - Ok(BatchOutcome): 执行结果（单条失败不影响返回 Ok）
    /// - Err(AlreadyProcessed): 已被处理（含并发竞争失败）
    /// - Err(Expired): 超过 TTL，批次已转为 Expired
    /// - Err(NotFound): 批次不存在或已清理
    pub fn approve(&self, batch_id: &str, actor: &str) -> Result<BatchOutcome, ApprovalStateError> {
        let claimed = self.claim(batch_id, ApprovalStatus::Approved, actor)?;

        let outcome = self
            .executor
            .execute(&claimed.batch_id, claimed.movements(), actor, self.clock.now());
        if let Err(e) = self.store.save_outcome(batch_id, &outcome) {
            error!(batch_id, error = %e, "执行结果保存失败");
        }

        info!(
            batch_id,
            approver = actor,
            successful = outcome.successful,
            failed = outcome.failed,
            "批次已审批执行"
        );
        Ok(outcome)
    }

    /// 拒绝批次（台账不变）
    pub fn reject(&self, batch_id: &str, actor: &str) -> Result<PendingApproval, ApprovalStateError> {
        let rejected = self.claim(batch_id, ApprovalStatus::Rejected, actor)?;
        self.audit_decision(&rejected, AuditAction::BatchRejected, actor);
        info!(batch_id, approver = actor, "批次已拒绝");
        Ok(rejected)
    }

    /// 从 Pending 原子转换到目标状态；超时则转为 Expired 并报错
    fn claim(
        &self,
        batch_id: &str,
        target: ApprovalStatus,
        actor: &str,
    ) -> Result<PendingApproval, ApprovalStateError> {
        let now = self.clock.now();
        let record = self
            .store
            .get(batch_id)?
            .ok_or_else(|| ApprovalStateError::NotFound {
                batch_id: batch_id.to_string(),
            })?;

        if record.status.is_terminal() {
            return Err(ApprovalStateError::AlreadyProcessed {
                batch_id: batch_id.to_string(),
                status: record.status,
            });
        }

        if record.is_expired_at(now) {
            let requester_conversation = match self.store.transition(
                batch_id,
                ApprovalStatus::Pending,
                ApprovalStatus::Expired,
                None,
                now,
            )? {
                TransitionOutcome::Transitioned(expired) => {
                    self.audit_decision(&expired, AuditAction::BatchExpired, SYSTEM_ACTOR);
                    Some(expired.requester.conversation_id)
                }
                _ => None,
            };
            warn!(batch_id, actor, "批次已超时，决策无效");
            return Err(ApprovalStateError::Expired {
                batch_id: batch_id.to_string(),
                requester_conversation,
            });
        }

        match self.store.transition(
            batch_id,
            ApprovalStatus::Pending,
            target,
            Some(actor),
            now,
        )? {
            TransitionOutcome::Transitioned(record) => Ok(record),
            TransitionOutcome::Conflict(status) => {
                warn!(batch_id, actor, status = status.as_str(), "批次已被其他决策处理");
                Err(ApprovalStateError::AlreadyProcessed {
                    batch_id: batch_id.to_string(),
                    status,
                })
            }
            TransitionOutcome::NotFound => Err(ApprovalStateError::NotFound {
                batch_id: batch_id.to_string(),
            }),
        }
    }

    fn audit_decision(&self, record: &PendingApproval, action: AuditAction, actor: &str) {
        let audit = AuditRecord::new(&record.batch_id, action, actor, self.clock.now())
            .with_payload(serde_json::json!({
                "requester": record.requester.actor_id,
                "movement_kind": record.movement_kind().map(|k| k.as_str()),
                "entries": record.batch.entries.len(),
            }));
        if let Err(e) = self.ledger.append_audit(&[audit]) {
            error!(batch_id = %record.batch_id, error = %e, "审计记录写入失败");
        }
    }

    // ==========================================
    // 超时与清理
    // ==========================================

    /// 将所有超时的 Pending 批次转为 Expired
    ///
    /// # 返回
    /// - 本次转换的批次（用于通知请求人）
    pub fn expire_stale(&self) -> Result<Vec<PendingApproval>, ApprovalStateError> {
        let now = self.clock.now();
        let mut expired = Vec::new();

        for record in self.store.list_expired_pending(now)? {
            if let TransitionOutcome::Transitioned(done) = self.store.transition(
                &record.batch_id,
                ApprovalStatus::Pending,
                ApprovalStatus::Expired,
                None,
                now,
            )? {
                self.audit_decision(&done, AuditAction::BatchExpired, SYSTEM_ACTOR);
                expired.push(done);
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "超时批次已过期");
        }
        Ok(expired)
    }

    /// 删除超过保留期的终态批次
    pub fn purge_consumed(&self) -> Result<usize, ApprovalStateError> {
        let cutoff = self.clock.now() - self.config.consumed_retention();
        let purged = self.store.purge_terminal_before(cutoff)?;
        if purged > 0 {
            info!(purged, "已清理终态批次");
        }
        Ok(purged)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 待审批汇总（不含已超时未扫描的批次）
    pub fn pending_summary(&self) -> Result<PendingSummary, ApprovalStateError> {
        let now = self.clock.now();
        let pending: Vec<PendingApproval> = self
            .store
            .list_by_status(ApprovalStatus::Pending)?
            .into_iter()
            .filter(|p| !p.is_expired_at(now))
            .collect();

        let count_kind = |kind: MovementKind| {
            pending
                .iter()
                .filter(|p| p.movement_kind() == Some(kind))
                .map(|p| p.movements().len())
                .sum::<usize>()
        };

        Ok(PendingSummary {
            pending_batches: pending.len(),
            pending_movements: pending.iter().map(|p| p.movements().len()).sum(),
            receipts: count_kind(MovementKind::Receipt),
            issues: count_kind(MovementKind::Issue),
            adjustments: count_kind(MovementKind::Adjustment),
            oldest_created_at: pending.iter().map(|p| p.created_at).min(),
        })
    }

    /// 批次详情
    pub fn details(&self, batch_id: &str) -> Result<PendingApproval, ApprovalStateError> {
        self.store
            .get(batch_id)?
            .ok_or_else(|| ApprovalStateError::NotFound {
                batch_id: batch_id.to_string(),
            })
    }
}

// ==========================================
// 预览渲染
// ==========================================

/// 生成审批预览文本（条目、数量、查重与库存提示）
pub fn render_preview(approval: &PendingApproval) -> String {
    let batch = &approval.batch;
    let kind_label = batch
        .movement_kind
        .map(|k| k.label())
        .unwrap_or("Stock Movement");

    let mut out = format!(
        "{} request {} from {} ({} item(s))\n",
        kind_label,
        approval.batch_id,
        approval.requester.display_name,
        batch.entries.len()
    );

    let g = &batch.globals;
    for (label, value) in [
        ("Project", &g.project),
        ("Driver", &g.driver),
        ("From", &g.from_location),
        ("To", &g.to_location),
    ] {
        if let Some(v) = value {
            out.push_str(&format!("{}: {}\n", label, v));
        }
    }

    for entry in &batch.entries {
        let section = entry
            .section
            .as_deref()
            .map(|s| format!("[batch {}] ", s))
            .unwrap_or_default();
        out.push_str(&format!("  {}. {}{}", entry.line, section, entry.display_line()));
        if let Some(note) = &entry.note {
            out.push_str(&format!(" ({})", note));
        }
        out.push('\n');

        let Some(annotation) = approval.annotation_for(entry.line) else {
            continue;
        };
        if annotation.original_name != entry.item_name {
            out.push_str(&format!(
                "     matched existing item '{}'\n",
                entry.item_name
            ));
        }
        for dup in &annotation.duplicates {
            let on_hand = dup
                .current_on_hand
                .map(|q| format!(", {} on hand", q.normalize()))
                .unwrap_or_default();
            out.push_str(&format!(
                "     ! similar to existing '{}' ({:.0}%{})\n",
                dup.matched_item,
                dup.similarity_score * 100.0,
                on_hand
            ));
        }
        if let Some(warning) = &annotation.stock_warning {
            out.push_str(&format!("     ! {}\n", warning.message()));
        }
        if annotation.unknown_item {
            out.push_str(&format!(
                "     ! '{}' is not in the catalog\n",
                entry.item_name
            ));
        }
    }

    out.push_str(&format!(
        "Expires at {}\n",
        approval.expires_at.format("%Y-%m-%d %H:%M UTC")
    ));
    out
}
