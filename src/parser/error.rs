// ==========================================
// 出入库批量指令 - 解析错误类型
// ==========================================
// 说明: 解析错误按行记录，不中断其他行的解析
// 工具: thiserror 派生宏
// ==========================================

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 指令解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown movement type: start the command with /in, /out or /adjust")]
    MissingMovementKind,

    #[error("No quantity found in \"{text}\"")]
    MissingQuantity { text: String },

    #[error("Item name is missing before quantity {quantity}")]
    MissingItemName { quantity: String },

    #[error("Invalid quantity \"{token}\"")]
    InvalidQuantity { token: String },

    #[error("Batch section '{section}' contains no entries")]
    EmptySection { section: String },
}

impl ParseError {
    /// 稳定的错误码 (日志与统计用)
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::EmptyCommand => "EMPTY_COMMAND",
            ParseError::MissingMovementKind => "MISSING_MOVEMENT_KIND",
            ParseError::MissingQuantity { .. } => "MISSING_QUANTITY",
            ParseError::MissingItemName { .. } => "MISSING_ITEM_NAME",
            ParseError::InvalidQuantity { .. } => "INVALID_QUANTITY",
            ParseError::EmptySection { .. } => "EMPTY_SECTION",
        }
    }

    /// 面向用户的修正建议
    pub fn suggestion(&self) -> &'static str {
        match self {
            ParseError::EmptyCommand | ParseError::MissingMovementKind => {
                "Example: /in project: Bridge Construction, cement, 50 bags"
            }
            ParseError::MissingQuantity { .. } | ParseError::InvalidQuantity { .. } => {
                "Write the quantity after the item name, e.g. 'cement, 50 bags'"
            }
            ParseError::MissingItemName { .. } => {
                "Write the item name before the quantity, e.g. 'steel bars, 20 pieces'"
            }
            ParseError::EmptySection { .. } => {
                "Add at least one entry under each '-batch N-' marker"
            }
        }
    }
}
