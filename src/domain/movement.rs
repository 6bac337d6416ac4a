// ==========================================
// 出入库批量指令 - 变动条目领域模型
// ==========================================
// 职责: 解析结果的数据结构 (全局参数 / 候选变动 / 解析批次)
// 红线: 不含解析逻辑，不含数据访问逻辑
// ==========================================

use crate::domain::types::{BatchFormat, MovementKind, Unit};
use crate::parser::error::ParseError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ==========================================
// GlobalField - 可作为全局参数的字段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobalField {
    Project,
    Driver,
    From,
    To,
}

impl GlobalField {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalField::Project => "project",
            GlobalField::Driver => "driver",
            GlobalField::From => "from",
            GlobalField::To => "to",
        }
    }

    /// 从配置键名解析（不区分大小写）
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "project" => Some(GlobalField::Project),
            "driver" => Some(GlobalField::Driver),
            "from" | "from_location" => Some(GlobalField::From),
            "to" | "to_location" => Some(GlobalField::To),
            _ => None,
        }
    }
}

// ==========================================
// GlobalParameters - 批次级公共参数
// ==========================================
// 用途: 批次内所有条目共享，条目级字段可覆盖
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalParameters {
    pub project: Option<String>,
    pub driver: Option<String>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
}

impl GlobalParameters {
    /// 叠加: `other` 中有值的字段覆盖当前值
    pub fn overlay(&self, other: &GlobalParameters) -> GlobalParameters {
        GlobalParameters {
            project: other.project.clone().or_else(|| self.project.clone()),
            driver: other.driver.clone().or_else(|| self.driver.clone()),
            from_location: other
                .from_location
                .clone()
                .or_else(|| self.from_location.clone()),
            to_location: other.to_location.clone().or_else(|| self.to_location.clone()),
        }
    }

    pub fn get(&self, field: GlobalField) -> Option<&str> {
        match field {
            GlobalField::Project => self.project.as_deref(),
            GlobalField::Driver => self.driver.as_deref(),
            GlobalField::From => self.from_location.as_deref(),
            GlobalField::To => self.to_location.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.project.is_none()
            && self.driver.is_none()
            && self.from_location.is_none()
            && self.to_location.is_none()
    }
}

// ==========================================
// CandidateMovement - 候选变动（已解析、未执行）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMovement {
    // ===== 定位 =====
    pub line: usize,                 // 条目序号 (从1开始)
    pub section: Option<String>,     // 多批次分段编号
    pub raw_text: String,            // 原始条目文本

    // ===== 物料 =====
    pub item_name: String,
    pub quantity: Decimal,           // 带符号数量 (仅调整可为负)
    pub unit: Unit,
    pub category: String,

    // ===== 变动属性 =====
    pub movement_kind: MovementKind,
    pub project: Option<String>,
    pub driver: Option<String>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub note: Option<String>,
}

impl CandidateMovement {
    /// 读取指定字段 (用于必填校验)
    pub fn field(&self, field: GlobalField) -> Option<&str> {
        match field {
            GlobalField::Project => self.project.as_deref(),
            GlobalField::Driver => self.driver.as_deref(),
            GlobalField::From => self.from_location.as_deref(),
            GlobalField::To => self.to_location.as_deref(),
        }
    }

    /// 对库存的带符号影响
    ///
    /// - Receipt: +quantity
    /// - Issue: -quantity
    /// - Adjustment: quantity (原样)
    pub fn signed_delta(&self) -> Decimal {
        match self.movement_kind {
            MovementKind::Receipt => self.quantity,
            MovementKind::Issue => -self.quantity,
            MovementKind::Adjustment => self.quantity,
        }
    }

    /// 单行展示 (预览与报告用)
    pub fn display_line(&self) -> String {
        let unit = if self.quantity.abs() == Decimal::ONE {
            self.unit.as_str()
        } else {
            self.unit.plural()
        };
        format!("{}: {} {}", self.item_name, self.quantity.normalize(), unit)
    }
}

// ==========================================
// EntryParseFailure - 单行解析失败
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryParseFailure {
    pub line: usize,
    pub raw_text: String,
    pub error: ParseError,
}

// ==========================================
// ParsedBatch - 解析批次
// ==========================================
// 不变量: is_consistent == true 时，entries 非空、errors 为空、类型唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedBatch {
    pub movement_kind: Option<MovementKind>,
    pub format: BatchFormat,
    pub globals: GlobalParameters,
    pub entries: Vec<CandidateMovement>,
    pub errors: Vec<EntryParseFailure>,
    pub is_consistent: bool,
}

impl ParsedBatch {
    /// 参与计数的条目总数 (含解析失败行)
    pub fn entry_count(&self) -> usize {
        self.entries.len() + self.errors.len()
    }

    /// 重新计算一致性标志
    pub fn refresh_consistency(&mut self) {
        let kind_uniform = match self.movement_kind {
            Some(kind) => self.entries.iter().all(|e| e.movement_kind == kind),
            None => false,
        };
        self.is_consistent = kind_uniform && self.errors.is_empty() && !self.entries.is_empty();
    }
}
