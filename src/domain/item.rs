// ==========================================
// 出入库批量指令 - 物料台账领域模型
// ==========================================
// 对齐: catalog_item 表
// 并发: revision 用于乐观锁，每次写入 +1
// ==========================================

use crate::domain::types::Unit;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 台账物料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_id: String,
    pub name: String,
    pub category: String,
    pub unit: Unit,
    pub on_hand: Decimal,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新建物料参数（入库时物料不存在）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCatalogItem {
    pub name: String,
    pub category: String,
    pub unit: Unit,
}

/// 名称规范化键：去首尾空白、压缩空白、小写
///
/// 台账以此键唯一，"Portland  Cement" 与 "portland cement" 视为同一物料。
pub fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_key() {
        assert_eq!(name_key("  Portland   Cement "), "portland cement");
        assert_eq!(name_key("Steel Beam 9m"), name_key("steel beam 9m"));
    }
}
