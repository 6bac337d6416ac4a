// ==========================================
// 出入库批量指令 - 待审批批次领域模型
// ==========================================
// 状态机: Pending -> Approved / Rejected / Expired
// 红线: Pending 期间不得修改台账
// 红线: batch_id 全局唯一，终态后重复决策必须报 "already processed"
// ==========================================

use crate::domain::annotation::EntryAnnotation;
use crate::domain::movement::{CandidateMovement, ParsedBatch};
use crate::domain::outcome::BatchOutcome;
use crate::domain::types::{ApprovalStatus, MovementKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// StockSnapshot - 库存快照
// ==========================================
/// 单个物料的库存水平（不存在的物料记为 0 且 exists=false）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub on_hand: Decimal,
    pub exists: bool,
}

impl StockLevel {
    pub fn absent() -> Self {
        Self {
            on_hand: Decimal::ZERO,
            exists: false,
        }
    }

    pub fn present(on_hand: Decimal) -> Self {
        Self {
            on_hand,
            exists: true,
        }
    }
}

/// 物料名 -> 库存水平，按名称排序便于比对与展示
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub levels: BTreeMap<String, StockLevel>,
}

impl StockSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item_name: impl Into<String>, level: StockLevel) {
        self.levels.insert(item_name.into(), level);
    }

    pub fn get(&self, item_name: &str) -> Option<&StockLevel> {
        self.levels.get(item_name)
    }

    /// 取在库数量，不存在记为 0
    pub fn on_hand(&self, item_name: &str) -> Decimal {
        self.levels
            .get(item_name)
            .map(|l| l.on_hand)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn item_names(&self) -> impl Iterator<Item = &String> {
        self.levels.keys()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

// ==========================================
// Requester - 请求人
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub actor_id: String,
    pub display_name: String,
    pub conversation_id: String, // 结果通知的会话
}

// ==========================================
// ApprovalDecision - 审批决定
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl ApprovalDecision {
    pub fn target_status(&self) -> ApprovalStatus {
        match self {
            ApprovalDecision::Approve => ApprovalStatus::Approved,
            ApprovalDecision::Reject => ApprovalStatus::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalDecision::Approve => "approve",
            ApprovalDecision::Reject => "reject",
        }
    }

    /// 解析审批回调数据 "approve:<batch_id>" / "reject:<batch_id>"
    pub fn parse_action(data: &str) -> Option<(Self, &str)> {
        let (action, batch_id) = data.split_once(':')?;
        let batch_id = batch_id.trim();
        if batch_id.is_empty() {
            return None;
        }
        match action.trim().to_lowercase().as_str() {
            "approve" => Some((ApprovalDecision::Approve, batch_id)),
            "reject" => Some((ApprovalDecision::Reject, batch_id)),
            _ => None,
        }
    }
}

// ==========================================
// PendingApproval - 待审批批次
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    // ===== 主键 =====
    pub batch_id: String,

    // ===== 批次内容 =====
    pub batch: ParsedBatch,
    pub annotations: Vec<EntryAnnotation>,
    pub requester: Requester,
    pub before_snapshot: StockSnapshot,

    // ===== 生命周期 =====
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,

    // ===== 执行结果 (仅 Approved) =====
    pub outcome: Option<BatchOutcome>,
}

impl PendingApproval {
    pub fn movements(&self) -> &[CandidateMovement] {
        &self.batch.entries
    }

    pub fn movement_kind(&self) -> Option<MovementKind> {
        self.batch.movement_kind
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn annotation_for(&self, line: usize) -> Option<&EntryAnnotation> {
        self.annotations.iter().find(|a| a.line == line)
    }
}

// ==========================================
// PendingSummary - 待审批汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSummary {
    pub pending_batches: usize,
    pub pending_movements: usize,
    pub receipts: usize,
    pub issues: usize,
    pub adjustments: usize,
    pub oldest_created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        assert_eq!(
            ApprovalDecision::parse_action("approve:batch_1_abc"),
            Some((ApprovalDecision::Approve, "batch_1_abc"))
        );
        assert_eq!(
            ApprovalDecision::parse_action("Reject: batch_2"),
            Some((ApprovalDecision::Reject, "batch_2"))
        );
        assert_eq!(ApprovalDecision::parse_action("approve:"), None);
        assert_eq!(ApprovalDecision::parse_action("cancel:batch_3"), None);
    }

    #[test]
    fn test_snapshot_missing_item_is_zero() {
        let mut snap = StockSnapshot::new();
        snap.insert("cement", StockLevel::present(Decimal::new(50, 0)));
        assert_eq!(snap.on_hand("cement"), Decimal::new(50, 0));
        assert_eq!(snap.on_hand("sand"), Decimal::ZERO);
    }
}
