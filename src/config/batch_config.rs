// ==========================================
// 出入库批量指令 - 流水线参数
// ==========================================
// 职责: 校验/查重/审批/执行各阶段的可调参数
// 来源: 默认值 + config_kv 覆写 (见 ConfigManager::load_batch_config)
// ==========================================

use crate::domain::movement::GlobalField;
use serde::{Deserialize, Serialize};

// ==========================================
// DuplicateConfig - 查重参数
// ==========================================
// 评分: eligible_floor + overlap_weight * 命中率 (+ 前缀/包含加分)，封顶 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateConfig {
    pub threshold: f64,                  // 标记为疑似重复的最低分
    pub eligible_floor: f64,             // 满足候选条件时的基础分
    pub overlap_weight: f64,             // 关键词命中率权重
    pub prefix_boost: f64,               // 未命中词互为前缀时加分
    pub containment_boost: f64,          // 关键词集合包含关系加分
    pub max_missing_keywords: usize,     // 允许缺失的关键词数
    pub measurement_tolerance: f64,      // 规格数值容差 (相对)
    pub measurement_mismatch_score: f64, // 规格冲突但关键词全中时的得分
    pub max_candidates: usize,           // 每个条目最多返回的疑似项
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            eligible_floor: 0.7,
            overlap_weight: 0.3,
            prefix_boost: 0.05,
            containment_boost: 0.1,
            max_missing_keywords: 1,
            measurement_tolerance: 0.1,
            measurement_mismatch_score: 0.6,
            max_candidates: 5,
        }
    }
}

// ==========================================
// BatchConfig - 流水线参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    // ===== 校验 =====
    pub max_batch_size: usize,
    pub required_fields: Vec<GlobalField>,
    pub large_quantity_warning: u64,

    // ===== 审批 =====
    pub approval_ttl_hours: i64,
    pub consumed_retention_hours: i64, // 终态记录保留时长 (用于识别重复决策)

    // ===== 执行 =====
    pub allow_negative_stock: bool,
    pub optimistic_retry_limit: u32,

    // ===== 查重 =====
    pub duplicate: DuplicateConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 40,
            required_fields: vec![GlobalField::Project],
            large_quantity_warning: 10_000,
            approval_ttl_hours: 24,
            consumed_retention_hours: 72,
            allow_negative_stock: false,
            optimistic_retry_limit: 3,
            duplicate: DuplicateConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn approval_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.approval_ttl_hours)
    }

    pub fn consumed_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.consumed_retention_hours)
    }
}
