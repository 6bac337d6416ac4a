// ==========================================
// 出入库批量指令 - 审计日志领域模型
// ==========================================
// 红线: 所有台账写入必须留痕，审计表只追加不修改
// 对齐: audit_log 表
// ==========================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// AuditRecord - 审计记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    // ===== 主键 =====
    pub audit_id: String,
    pub batch_id: String,
    pub action: String,               // AuditAction::as_str()
    pub actor: String,
    pub recorded_at: DateTime<Utc>,

    // ===== 物料影响 (批次级记录为空) =====
    pub item_name: Option<String>,
    pub movement_kind: Option<String>,
    pub previous_on_hand: Option<Decimal>,
    pub new_on_hand: Option<Decimal>,
    pub delta: Option<Decimal>,

    // ===== 扩展 =====
    pub payload_json: Option<JsonValue>,
    pub detail: Option<String>,
}

// ==========================================
// AuditAction - 审计动作
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    MovementApplied, // 单条变动生效
    ItemCreated,     // 入库时新建物料
    BatchExecuted,   // 批次执行完成
    BatchRolledBack, // 批次回滚
    BatchRejected,   // 批次被拒绝
    BatchExpired,    // 批次超时
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::MovementApplied => "MovementApplied",
            AuditAction::ItemCreated => "ItemCreated",
            AuditAction::BatchExecuted => "BatchExecuted",
            AuditAction::BatchRolledBack => "BatchRolledBack",
            AuditAction::BatchRejected => "BatchRejected",
            AuditAction::BatchExpired => "BatchExpired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "MovementApplied" => Some(AuditAction::MovementApplied),
            "ItemCreated" => Some(AuditAction::ItemCreated),
            "BatchExecuted" => Some(AuditAction::BatchExecuted),
            "BatchRolledBack" => Some(AuditAction::BatchRolledBack),
            "BatchRejected" => Some(AuditAction::BatchRejected),
            "BatchExpired" => Some(AuditAction::BatchExpired),
            _ => None,
        }
    }
}

impl AuditRecord {
    /// 创建新的审计记录
    ///
    /// # 参数
    /// - `batch_id`: 所属批次
    /// - `action`: 审计动作
    /// - `actor`: 操作人
    /// - `recorded_at`: 记录时间（由调用方的时钟提供）
    pub fn new(batch_id: &str, action: AuditAction, actor: &str, recorded_at: DateTime<Utc>) -> Self {
        Self {
            audit_id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            action: action.as_str().to_string(),
            actor: actor.to_string(),
            recorded_at,
            item_name: None,
            movement_kind: None,
            previous_on_hand: None,
            new_on_hand: None,
            delta: None,
            payload_json: None,
            detail: None,
        }
    }

    /// 设置物料影响
    pub fn with_item_change(
        mut self,
        item_name: &str,
        movement_kind: &str,
        previous_on_hand: Decimal,
        new_on_hand: Decimal,
    ) -> Self {
        self.item_name = Some(item_name.to_string());
        self.movement_kind = Some(movement_kind.to_string());
        self.previous_on_hand = Some(previous_on_hand);
        self.new_on_hand = Some(new_on_hand);
        self.delta = Some(new_on_hand - previous_on_hand);
        self
    }

    /// 设置载荷
    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload_json = Some(payload);
        self
    }

    /// 设置描述
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn action_type(&self) -> Option<AuditAction> {
        AuditAction::from_str(&self.action)
    }
}
