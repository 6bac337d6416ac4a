// ==========================================
// 出入库批量指令 - 查重标注领域模型
// ==========================================
// 职责: 查重引擎对每个条目的输出（关联结果、疑似重复、库存告警）
// 说明: 全部为非阻塞提示，不影响是否可进入审批
// ==========================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 疑似重复物料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialDuplicate {
    pub candidate_name: String,          // 条目中的物料名
    pub matched_item: String,            // 台账中的物料名
    pub similarity_score: f64,           // [0, 1]
    pub current_on_hand: Option<Decimal>, // 仅出库时附带
}

/// 条目与台账物料的关联结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ItemLink {
    /// 名称精确匹配（忽略大小写与多余空白），自动关联
    Existing { item_name: String },
    /// 台账中无精确匹配
    Unmatched,
}

/// 出库数量超过当前库存（非阻塞）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockInsufficiencyWarning {
    pub item_name: String,
    pub requested: Decimal,
    pub on_hand: Decimal,
}

impl StockInsufficiencyWarning {
    pub fn message(&self) -> String {
        format!(
            "Only {} on hand for '{}' but {} requested",
            self.on_hand.normalize(),
            self.item_name,
            self.requested.normalize()
        )
    }
}

/// 单个条目的查重标注
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryAnnotation {
    pub line: usize,
    pub original_name: String,
    pub link: ItemLink,
    pub duplicates: Vec<PotentialDuplicate>,
    pub stock_warning: Option<StockInsufficiencyWarning>,
    /// 出库/调整的物料在台账中既无精确匹配也无疑似项
    pub unknown_item: bool,
}

impl EntryAnnotation {
    pub fn has_warnings(&self) -> bool {
        !self.duplicates.is_empty() || self.stock_warning.is_some() || self.unknown_item
    }

    pub fn linked_name(&self) -> Option<&str> {
        match &self.link {
            ItemLink::Existing { item_name } => Some(item_name.as_str()),
            ItemLink::Unmatched => None,
        }
    }
}
