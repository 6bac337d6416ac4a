// ==========================================
// 出入库批量指令 - 批次校验引擎
// ==========================================
// 职责: 在进入审批前对 ParsedBatch 做整批校验
// 输出: ValidationReport（阻断项 issues + 非阻断 warnings + 格式提示）
// 红线: 任一 issue 存在时批次不得进入审批
// 红线: 所有规则必须输出 reason 与修正模板
// ==========================================

use crate::config::BatchConfig;
use crate::domain::item::name_key;
use crate::domain::movement::ParsedBatch;
use crate::domain::types::MovementKind;
use crate::parser::error::ParseError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

// ==========================================
// ValidationReason - 校验失败原因
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationReason {
    #[error("Batch has {count} entries; the maximum is {max}")]
    BatchTooLarge { count: usize, max: usize },

    #[error("No entries found in the command")]
    NoEntries,

    #[error("{0}")]
    Parse(ParseError),

    #[error("A {found} entry cannot be mixed into a {expected} batch")]
    MixedMovementKinds {
        expected: MovementKind,
        found: MovementKind,
    },

    #[error("Missing required field '{field}'")]
    MissingRequiredField { field: String },

    #[error("Item name is empty")]
    EmptyItemName,

    #[error("Quantity must not be zero")]
    ZeroQuantity,

    #[error("Negative quantity {quantity} is only allowed for adjustments")]
    NegativeQuantity { quantity: Decimal },
}

impl ValidationReason {
    /// 稳定的原因码
    pub fn code(&self) -> &'static str {
        match self {
            ValidationReason::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
            ValidationReason::NoEntries => "NO_ENTRIES",
            ValidationReason::Parse(e) => e.code(),
            ValidationReason::MixedMovementKinds { .. } => "MIXED_MOVEMENT_KINDS",
            ValidationReason::MissingRequiredField { .. } => "MISSING_REQUIRED_FIELD",
            ValidationReason::EmptyItemName => "EMPTY_ITEM_NAME",
            ValidationReason::ZeroQuantity => "ZERO_QUANTITY",
            ValidationReason::NegativeQuantity { .. } => "NEGATIVE_QUANTITY",
        }
    }

    /// 修正模板
    pub fn suggested_template(&self) -> String {
        match self {
            ValidationReason::BatchTooLarge { max, .. } => {
                format!("Split the command into batches of at most {} entries", max)
            }
            ValidationReason::NoEntries => {
                "Example: /in project: Bridge Construction, cement, 50 bags".to_string()
            }
            ValidationReason::Parse(e) => e.suggestion().to_string(),
            ValidationReason::MixedMovementKinds { expected, .. } => format!(
                "Send separate commands per movement type; this batch is {}",
                expected.command()
            ),
            ValidationReason::MissingRequiredField { field } => format!(
                "Add '{}: <value>' to the first line, e.g. '{}: Bridge Construction'",
                field, field
            ),
            ValidationReason::EmptyItemName => "Write the item name before the quantity".to_string(),
            ValidationReason::ZeroQuantity => {
                "Use a quantity greater than zero, e.g. 'cement, 5 bags'".to_string()
            }
            ValidationReason::NegativeQuantity { .. } => {
                "Use /adjust for negative corrections, e.g. '/adjust cement, -3 bags'".to_string()
            }
        }
    }
}

/// 阻断项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub line: Option<usize>, // None = 批次级
    pub reason: ValidationReason,
    pub suggestion: String,
}

/// 非阻断提示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub line: Option<usize>,
    pub message: String,
}

// ==========================================
// ValidationReport - 校验报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationWarning>,
    pub format_tip: String,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// 渲染给请求人的文本
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.issues.is_empty() {
            out.push_str(&format!(
                "The command was not accepted ({} problem(s)):\n",
                self.issues.len()
            ));
            for issue in &self.issues {
                match issue.line {
                    Some(line) => out.push_str(&format!("  #{} {}\n", line, issue.reason)),
                    None => out.push_str(&format!("  {}\n", issue.reason)),
                }
                out.push_str(&format!("     -> {}\n", issue.suggestion));
            }
        }
        for warning in &self.warnings {
            match warning.line {
                Some(line) => out.push_str(&format!("Warning #{}: {}\n", line, warning.message)),
                None => out.push_str(&format!("Warning: {}\n", warning.message)),
            }
        }
        out.push_str(&self.format_tip);
        out
    }

    fn issue(&mut self, line: Option<usize>, reason: ValidationReason) {
        let suggestion = reason.suggested_template();
        self.issues.push(ValidationIssue {
            line,
            reason,
            suggestion,
        });
    }

    fn warn(&mut self, line: Option<usize>, message: String) {
        self.warnings.push(ValidationWarning { line, message });
    }
}

// ==========================================
// MovementValidator - 校验引擎
// ==========================================
pub struct MovementValidator {
    config: BatchConfig,
}

impl MovementValidator {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// 校验解析批次
    ///
    /// # 规则
    /// 1. 条目数（含解析失败行）不超过 max_batch_size
    /// 2. 至少一条有效条目
    /// 3. 每个解析错误对应一条 issue
    /// 4. 变动类型唯一
    /// 5. 必填字段存在（批次级缺失只报一次）
    /// 6. 物料名非空
    /// 7. 数量非零（调整允许为零）；负数仅限调整
    ///
    /// # 提示（不阻断）
    /// - 同一物料在批次内重复
    /// - 数量超过 large_quantity_warning
    pub fn validate(&self, batch: &ParsedBatch) -> ValidationReport {
        let mut report = ValidationReport {
            issues: Vec::new(),
            warnings: Vec::new(),
            format_tip: batch.format.tip().to_string(),
        };

        let count = batch.entry_count();
        if count > self.config.max_batch_size {
            report.issue(
                None,
                ValidationReason::BatchTooLarge {
                    count,
                    max: self.config.max_batch_size,
                },
            );
        }

        for failure in &batch.errors {
            let line = (failure.line > 0).then_some(failure.line);
            report.issue(line, ValidationReason::Parse(failure.error.clone()));
        }

        if batch.entries.is_empty() {
            if batch.errors.is_empty() {
                report.issue(None, ValidationReason::NoEntries);
            }
            return report;
        }

        if let Some(expected) = batch.movement_kind {
            for entry in batch.entries.iter().filter(|e| e.movement_kind != expected) {
                report.issue(
                    Some(entry.line),
                    ValidationReason::MixedMovementKinds {
                        expected,
                        found: entry.movement_kind,
                    },
                );
            }
        }

        self.check_required_fields(batch, &mut report);

        for entry in &batch.entries {
            if entry.item_name.trim().is_empty() {
                report.issue(Some(entry.line), ValidationReason::EmptyItemName);
            }

            if entry.quantity.is_zero() {
                if entry.movement_kind != MovementKind::Adjustment {
                    report.issue(Some(entry.line), ValidationReason::ZeroQuantity);
                }
            } else if entry.quantity.is_sign_negative()
                && entry.movement_kind != MovementKind::Adjustment
            {
                report.issue(
                    Some(entry.line),
                    ValidationReason::NegativeQuantity {
                        quantity: entry.quantity,
                    },
                );
            }

            if entry.quantity.abs() > Decimal::from(self.config.large_quantity_warning) {
                report.warn(
                    Some(entry.line),
                    format!(
                        "Large quantity {} for '{}'; please double-check",
                        entry.quantity.normalize(),
                        entry.item_name
                    ),
                );
            }
        }

        let mut first_seen: HashMap<String, usize> = HashMap::new();
        for entry in &batch.entries {
            let key = name_key(&entry.item_name);
            if key.is_empty() {
                continue;
            }
            match first_seen.get(&key) {
                Some(first_line) => report.warn(
                    Some(entry.line),
                    format!(
                        "'{}' also appears on line {}; both entries will be applied",
                        entry.item_name, first_line
                    ),
                ),
                None => {
                    first_seen.insert(key, entry.line);
                }
            }
        }

        debug!(
            issues = report.issues.len(),
            warnings = report.warnings.len(),
            "批次校验完成"
        );
        report
    }

    fn check_required_fields(&self, batch: &ParsedBatch, report: &mut ValidationReport) {
        for field in &self.config.required_fields {
            let missing: Vec<usize> = batch
                .entries
                .iter()
                .filter(|e| e.field(*field).map_or(true, |v| v.trim().is_empty()))
                .map(|e| e.line)
                .collect();
            if missing.is_empty() {
                continue;
            }

            let reason = || ValidationReason::MissingRequiredField {
                field: field.as_str().to_string(),
            };
            if missing.len() == batch.entries.len() {
                report.issue(None, reason());
            } else {
                for line in missing {
                    report.issue(Some(line), reason());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::BatchParser;

    fn validate(text: &str) -> ValidationReport {
        let batch = BatchParser::default().parse(text);
        MovementValidator::new(BatchConfig::default()).validate(&batch)
    }

    #[test]
    fn test_valid_batch() {
        let report = validate("/in project: Bridge, cement, 50 bags\nsand, 2 tons");
        assert!(report.is_valid(), "{:?}", report.issues);
    }

    #[test]
    fn test_missing_project_reported_once() {
        let report = validate("/in cement, 50 bags\nsand, 2 tons");
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].line, None);
        assert_eq!(report.issues[0].reason.code(), "MISSING_REQUIRED_FIELD");
    }

    #[test]
    fn test_oversize_batch_rejected() {
        let mut text = String::from("/in project: Bridge\n");
        for i in 0..41 {
            text.push_str(&format!("item {}, 1\n", (b'a' + (i % 26) as u8) as char));
        }
        let report = validate(&text);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i.reason, ValidationReason::BatchTooLarge { count: 41, max: 40 })));
    }

    #[test]
    fn test_zero_and_negative_quantities() {
        let report = validate("/out project: Bridge\ncement, 0\nsand, -2");
        let codes: Vec<&str> = report.issues.iter().map(|i| i.reason.code()).collect();
        assert_eq!(codes, vec!["ZERO_QUANTITY", "NEGATIVE_QUANTITY"]);

        let report = validate("/adjust project: Bridge\ncement, 0\nsand, -2");
        assert!(report.is_valid(), "{:?}", report.issues);
    }

    #[test]
    fn test_parse_errors_become_issues() {
        let report = validate("/in project: Bridge\ncement, 5\nsome gravel");
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].line, Some(2));
        assert_eq!(report.issues[0].reason.code(), "MISSING_QUANTITY");
    }

    #[test]
    fn test_warnings_do_not_block() {
        let report = validate("/in project: Bridge\ncement, 5\nCement, 20000");
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 2);
        assert!(report.render().contains("also appears on line 1"));
    }
}
