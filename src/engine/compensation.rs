// ==========================================
// 出入库批量指令 - 补偿日志
// ==========================================
// 职责: 记录批次执行中每一步已生效的写入，致命错误时逆序撤销
// 红线: 只撤销本次执行实际生效的写入，且严格逆序
// ==========================================

use crate::domain::outcome::ExecutionError;
use crate::repository::LedgerStore;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

/// 单步补偿动作
#[derive(Debug, Clone, PartialEq)]
pub enum CompensationStep {
    /// 反向增减在库数量
    ReverseDelta {
        line: usize,
        item_name: String,
        delta: Decimal,
    },
    /// 删除本次执行新建的物料
    RemoveCreatedItem { line: usize, item_name: String },
}

impl CompensationStep {
    pub fn line(&self) -> usize {
        match self {
            CompensationStep::ReverseDelta { line, .. } => *line,
            CompensationStep::RemoveCreatedItem { line, .. } => *line,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            CompensationStep::ReverseDelta {
                item_name, delta, ..
            } => format!("reverse {} on '{}'", delta.normalize(), item_name),
            CompensationStep::RemoveCreatedItem { item_name, .. } => {
                format!("remove newly created item '{}'", item_name)
            }
        }
    }
}

/// 补偿日志
#[derive(Debug, Default)]
pub struct CompensationLog {
    steps: Vec<CompensationStep>,
}

impl CompensationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_created(&mut self, line: usize, item_name: &str) {
        self.steps.push(CompensationStep::RemoveCreatedItem {
            line,
            item_name: item_name.to_string(),
        });
    }

    pub fn record_delta(&mut self, line: usize, item_name: &str, delta: Decimal) {
        self.steps.push(CompensationStep::ReverseDelta {
            line,
            item_name: item_name.to_string(),
            delta,
        });
    }

    /// 丢弃 len 之后的步骤（单条失败时撤掉该条已记录的动作）
    pub fn truncate(&mut self, len: usize) {
        self.steps.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[CompensationStep] {
        &self.steps
    }

    /// 逆序回放
    ///
    /// # 返回
    /// - 回滚失败或未完全撤销的说明列表（空表示全部撤销成功）
    pub fn replay(self, ledger: &dyn LedgerStore) -> Vec<ExecutionError> {
        let mut failures = Vec::new();
        let total = self.steps.len();

        for step in self.steps.into_iter().rev() {
            let result = match &step {
                CompensationStep::ReverseDelta {
                    item_name, delta, ..
                } => ledger.increment_on_hand(item_name, -*delta).map(|_| ()),
                CompensationStep::RemoveCreatedItem { item_name, .. } => {
                    match ledger.remove_item_if_empty(item_name) {
                        Ok(true) => Ok(()),
                        Ok(false) => {
                            // 其他批次已入库，保留物料
                            warn!(line = step.line(), item = %item_name, "新建物料已有其他批次库存，保留");
                            failures.push(ExecutionError::rollback(format!(
                                "line {}: kept '{}' because another batch has stock on it",
                                step.line(),
                                item_name
                            )));
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
            };

            if let Err(e) = result {
                error!(line = step.line(), error = %e, "补偿步骤失败");
                failures.push(ExecutionError::rollback(format!(
                    "line {}: could not {}: {}",
                    step.line(),
                    step.describe(),
                    e
                )));
            }
        }

        info!(steps = total, failures = failures.len(), "补偿回放完成");
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_recorded_in_order() {
        let mut log = CompensationLog::new();
        log.record_created(1, "rebar");
        log.record_delta(1, "rebar", Decimal::new(10, 0));
        log.record_delta(2, "cement", Decimal::new(-5, 0));
        assert_eq!(log.len(), 3);
        assert_eq!(log.steps()[0].describe(), "remove newly created item 'rebar'");
        assert_eq!(log.steps()[2].describe(), "reverse -5 on 'cement'");

        log.truncate(1);
        assert_eq!(log.len(), 1);
    }
}
