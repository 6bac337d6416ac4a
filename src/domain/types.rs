// ==========================================
// 出入库批量指令 - 领域类型定义
// ==========================================
// 职责: 定义跨层共享的枚举类型
// 约束: 所有枚举提供 as_str / from_str，用于数据库存储与日志
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// MovementKind - 库存变动类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    Receipt,    // 入库 (/in)
    Issue,      // 出库 (/out)
    Adjustment, // 盘点调整 (/adjust)，数量可为负
}

impl MovementKind {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Receipt => "Receipt",
            MovementKind::Issue => "Issue",
            MovementKind::Adjustment => "Adjustment",
        }
    }

    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Receipt" => Some(MovementKind::Receipt),
            "Issue" => Some(MovementKind::Issue),
            "Adjustment" => Some(MovementKind::Adjustment),
            _ => None,
        }
    }

    /// 从指令前缀解析（不区分大小写，斜杠可省略）
    ///
    /// # 示例
    /// - "/in" / "in" / "/receipt" => Receipt
    /// - "/out" / "issue" => Issue
    /// - "/adjust" => Adjustment
    pub fn from_command_token(token: &str) -> Option<Self> {
        let token = token.trim().trim_start_matches('/').to_lowercase();
        match token.as_str() {
            "in" | "receipt" | "receive" => Some(MovementKind::Receipt),
            "out" | "issue" => Some(MovementKind::Issue),
            "adjust" | "adjustment" => Some(MovementKind::Adjustment),
            _ => None,
        }
    }

    /// 规范指令前缀
    pub fn command(&self) -> &'static str {
        match self {
            MovementKind::Receipt => "/in",
            MovementKind::Issue => "/out",
            MovementKind::Adjustment => "/adjust",
        }
    }

    /// 面向用户的标签
    pub fn label(&self) -> &'static str {
        match self {
            MovementKind::Receipt => "Stock In",
            MovementKind::Issue => "Stock Out",
            MovementKind::Adjustment => "Stock Adjustment",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// Unit - 计量单位
// ==========================================
// 说明: 仅做单位词识别与规范化，不做单位换算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Unit {
    #[default]
    Piece,
    Bag,
    Box,
    Meter,
    Liter,
    Kilogram,
    Ton,
    Roll,
    Bundle,
    Carton,
    Set,
    Sheet,
    Pair,
    Can,
    Packet,
}

impl Unit {
    /// 规范化单位名 (单数形式)
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Piece => "piece",
            Unit::Bag => "bag",
            Unit::Box => "box",
            Unit::Meter => "meter",
            Unit::Liter => "liter",
            Unit::Kilogram => "kg",
            Unit::Ton => "ton",
            Unit::Roll => "roll",
            Unit::Bundle => "bundle",
            Unit::Carton => "carton",
            Unit::Set => "set",
            Unit::Sheet => "sheet",
            Unit::Pair => "pair",
            Unit::Can => "can",
            Unit::Packet => "packet",
        }
    }

    /// 从数据库字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        Self::from_word(s)
    }

    /// 识别单位词（含复数与常见缩写）
    pub fn from_word(word: &str) -> Option<Self> {
        let w = word
            .trim()
            .trim_end_matches(|c: char| c == '.' || c == ',' || c == ';')
            .to_lowercase();
        let unit = match w.as_str() {
            "pc" | "pcs" | "piece" | "pieces" | "unit" | "units" => Unit::Piece,
            "bag" | "bags" => Unit::Bag,
            "box" | "boxes" => Unit::Box,
            "m" | "mtr" | "mtrs" | "meter" | "meters" | "metre" | "metres" => Unit::Meter,
            "l" | "ltr" | "ltrs" | "liter" | "liters" | "litre" | "litres" => Unit::Liter,
            "kg" | "kgs" | "kilo" | "kilos" | "kilogram" | "kilograms" => Unit::Kilogram,
            "ton" | "tons" | "tonne" | "tonnes" => Unit::Ton,
            "roll" | "rolls" => Unit::Roll,
            "bundle" | "bundles" => Unit::Bundle,
            "carton" | "cartons" | "ctn" | "ctns" => Unit::Carton,
            "set" | "sets" => Unit::Set,
            "sheet" | "sheets" => Unit::Sheet,
            "pair" | "pairs" => Unit::Pair,
            "can" | "cans" => Unit::Can,
            "packet" | "packets" | "pkt" | "pkts" | "pack" | "packs" => Unit::Packet,
            _ => return None,
        };
        Some(unit)
    }

    /// 复数显示形式（kg 不变）
    pub fn plural(&self) -> &'static str {
        match self {
            Unit::Piece => "pieces",
            Unit::Bag => "bags",
            Unit::Box => "boxes",
            Unit::Meter => "meters",
            Unit::Liter => "liters",
            Unit::Kilogram => "kg",
            Unit::Ton => "tons",
            Unit::Roll => "rolls",
            Unit::Bundle => "bundles",
            Unit::Carton => "cartons",
            Unit::Set => "sets",
            Unit::Sheet => "sheets",
            Unit::Pair => "pairs",
            Unit::Can => "cans",
            Unit::Packet => "packets",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// BatchFormat - 批量指令格式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchFormat {
    Single,     // 单条
    Newline,    // 换行分隔
    Semicolon,  // 分号分隔
    Mixed,      // 换行 + 分号 / 多条带前缀的行
    MultiBatch, // "-batch N-" 分段
}

impl BatchFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchFormat::Single => "Single",
            BatchFormat::Newline => "Newline",
            BatchFormat::Semicolon => "Semicolon",
            BatchFormat::Mixed => "Mixed",
            BatchFormat::MultiBatch => "MultiBatch",
        }
    }

    /// 格式提示（用于校验报告）
    pub fn tip(&self) -> &'static str {
        match self {
            BatchFormat::Single => "Tip: put one entry per line to record several items at once.",
            BatchFormat::Newline => "Tip: newline-separated entries are the clearest format.",
            BatchFormat::Semicolon => {
                "Tip: semicolons work well for short lists; use newlines for longer ones."
            }
            BatchFormat::Mixed => "Tip: mixing newlines and semicolons works, but stick to one separator when you can.",
            BatchFormat::MultiBatch => {
                "Tip: each '-batch N-' section may carry its own project, driver, from and to."
            }
        }
    }
}

impl fmt::Display for BatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// ApprovalStatus - 审批状态
// ==========================================
// 状态机: Pending -> {Approved, Rejected, Expired}，终态不可再转换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "Pending",
            ApprovalStatus::Approved => "Approved",
            ApprovalStatus::Rejected => "Rejected",
            ApprovalStatus::Expired => "Expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(ApprovalStatus::Pending),
            "Approved" => Some(ApprovalStatus::Approved),
            "Rejected" => Some(ApprovalStatus::Rejected),
            "Expired" => Some(ApprovalStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// ActorRole - 操作人角色
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorRole {
    Admin,  // 可提交全部类型、可审批
    Staff,  // 可提交入库/出库
    Viewer, // 只读
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Admin => "Admin",
            ActorRole::Staff => "Staff",
            ActorRole::Viewer => "Viewer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(ActorRole::Admin),
            "staff" => Some(ActorRole::Staff),
            "viewer" => Some(ActorRole::Viewer),
            _ => None,
        }
    }

    /// 是否可提交指定类型的变动
    pub fn can_submit(&self, kind: MovementKind) -> bool {
        match self {
            ActorRole::Admin => true,
            ActorRole::Staff => kind != MovementKind::Adjustment,
            ActorRole::Viewer => false,
        }
    }

    /// 是否可做审批决定
    pub fn can_decide(&self) -> bool {
        matches!(self, ActorRole::Admin)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_token_parsing() {
        assert_eq!(MovementKind::from_command_token("/in"), Some(MovementKind::Receipt));
        assert_eq!(MovementKind::from_command_token("OUT"), Some(MovementKind::Issue));
        assert_eq!(
            MovementKind::from_command_token("/Adjust"),
            Some(MovementKind::Adjustment)
        );
        assert_eq!(MovementKind::from_command_token("/inventory"), None);
    }

    #[test]
    fn test_unit_words() {
        assert_eq!(Unit::from_word("bags"), Some(Unit::Bag));
        assert_eq!(Unit::from_word("KG"), Some(Unit::Kilogram));
        assert_eq!(Unit::from_word("m"), Some(Unit::Meter));
        assert_eq!(Unit::from_word("litres,"), Some(Unit::Liter));
        assert_eq!(Unit::from_word("urgent"), None);
    }

    #[test]
    fn test_role_permissions() {
        assert!(ActorRole::Admin.can_submit(MovementKind::Adjustment));
        assert!(ActorRole::Staff.can_submit(MovementKind::Issue));
        assert!(!ActorRole::Staff.can_submit(MovementKind::Adjustment));
        assert!(!ActorRole::Viewer.can_submit(MovementKind::Receipt));
        assert!(!ActorRole::Staff.can_decide());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(ApprovalStatus::Expired.is_terminal());
        assert_eq!(ApprovalStatus::from_str("Rejected"), Some(ApprovalStatus::Rejected));
    }
}
