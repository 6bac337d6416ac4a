// ==========================================
// 出入库批量指令 - 批次执行引擎
// ==========================================
// 职责: 审批通过后按条目顺序修改台账，生成执行结果与审计记录
// 规则:
// 1. 入库: 物料不存在时先新建（分类/单位取自条目）
// 2. 出库/调整: 物料不存在 -> VALIDATION
// 3. 结果为负且不允许负库存 -> VALIDATION
// 4. 写入为 revision 条件写入，冲突重试 optimistic_retry_limit 次，耗尽 -> DATABASE
// 5. 写入后校验 on_hand == before + delta，不一致或完整性错误 -> CRITICAL
// 红线: CRITICAL 立即停止，逆序回放补偿日志，后续条目标记 Skipped
// ==========================================

use crate::config::BatchConfig;
use crate::domain::approval::StockSnapshot;
use crate::domain::audit_log::{AuditAction, AuditRecord};
use crate::domain::item::{CatalogItem, NewCatalogItem};
use crate::domain::movement::CandidateMovement;
use crate::domain::outcome::{
    summarize, BatchOutcome, ExecutionError, MovementResult, MovementStatus,
};
use crate::domain::types::MovementKind;
use crate::engine::compensation::CompensationLog;
use crate::repository::{LedgerStore, RepositoryError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 单条成功写入
#[derive(Debug, Clone, Copy)]
struct AppliedChange {
    before: Decimal,
    after: Decimal,
    delta: Decimal,
    created: bool,
}

fn classify(err: RepositoryError) -> ExecutionError {
    if err.is_integrity_failure() {
        ExecutionError::critical(format!("ledger integrity failure: {}", err))
    } else {
        ExecutionError::database(err.to_string())
    }
}

// ==========================================
// BatchExecutor - 批次执行引擎
// ==========================================
pub struct BatchExecutor {
    ledger: Arc<dyn LedgerStore>,
    config: BatchConfig,
}

impl BatchExecutor {
    pub fn new(ledger: Arc<dyn LedgerStore>, config: BatchConfig) -> Self {
        Self { ledger, config }
    }

    /// 执行批次
    ///
    /// # 参数
    /// - batch_id: 批次 ID
    /// - movements: 已审批的条目（名称已关联到台账规范名）
    /// - executed_by: 审批人
    /// - executed_at: 执行时间
    ///
    /// # 返回
    /// - BatchOutcome: 单条结果、前后快照、回滚信息、摘要
    pub fn execute(
        &self,
        batch_id: &str,
        movements: &[CandidateMovement],
        executed_by: &str,
        executed_at: DateTime<Utc>,
    ) -> BatchOutcome {
        let names = touched_names(movements);
        let before_snapshot = self.take_snapshot(&names, batch_id);

        let mut log = CompensationLog::new();
        let mut results: Vec<MovementResult> = Vec::with_capacity(movements.len());
        let mut critical_hit = false;

        for entry in movements {
            if critical_hit {
                results.push(result_for(entry, MovementStatus::Skipped, None, None));
                continue;
            }

            match self.apply_one(entry, &mut log) {
                Ok(change) => {
                    debug!(
                        batch_id,
                        line = entry.line,
                        item = %entry.item_name,
                        before = %change.before,
                        after = %change.after,
                        "条目已生效"
                    );
                    results.push(result_for(entry, MovementStatus::Applied, Some(change), None));
                }
                Err(e) if e.is_critical() => {
                    error!(batch_id, line = entry.line, error = %e, "致命错误，停止执行并回滚");
                    results.push(result_for(entry, MovementStatus::Failed, None, Some(e)));
                    critical_hit = true;
                }
                Err(e) => {
                    warn!(batch_id, line = entry.line, error = %e, "条目执行失败");
                    results.push(result_for(entry, MovementStatus::Failed, None, Some(e)));
                }
            }
        }

        let mut rollback_errors = Vec::new();
        if critical_hit {
            rollback_errors = log.replay(self.ledger.as_ref());
            for r in results.iter_mut().filter(|r| r.status == MovementStatus::Applied) {
                r.status = MovementStatus::RolledBack;
            }
        }

        let after_snapshot = self.take_snapshot(&names, batch_id);
        let successful = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - successful;
        let summary = summarize(successful, results.len(), critical_hit);

        let outcome = BatchOutcome {
            batch_id: batch_id.to_string(),
            executed_by: executed_by.to_string(),
            executed_at,
            results,
            before_snapshot,
            after_snapshot,
            rollback_performed: critical_hit,
            rollback_errors,
            successful,
            failed,
            summary,
        };

        self.write_audit(&outcome);
        info!(
            batch_id,
            successful,
            failed,
            rollback = critical_hit,
            "批次执行完成"
        );
        outcome
    }

    // ==========================================
    // 单条执行
    // ==========================================

    fn apply_one(
        &self,
        entry: &CandidateMovement,
        log: &mut CompensationLog,
    ) -> Result<AppliedChange, ExecutionError> {
        let mark = log.len();
        let result = self.apply_with_retry(entry, log);

        if let Err(e) = &result {
            if !e.is_critical() && log.len() > mark {
                // 非致命失败: 撤掉本条新建的空物料
                match self.ledger.remove_item_if_empty(&entry.item_name) {
                    Ok(true) => {}
                    Ok(false) => {
                        info!(line = entry.line, item = %entry.item_name, "新建物料已有其他批次库存，保留")
                    }
                    Err(re) => warn!(line = entry.line, error = %re, "清理新建物料失败"),
                }
                log.truncate(mark);
            }
        }
        result
    }

    fn apply_with_retry(
        &self,
        entry: &CandidateMovement,
        log: &mut CompensationLog,
    ) -> Result<AppliedChange, ExecutionError> {
        let delta = entry.signed_delta();
        let limit = self.config.optimistic_retry_limit.max(1);
        let mut attempts = 0u32;
        let mut created = false;

        loop {
            let item = match self.load_or_create(entry, log, &mut created) {
                Ok(Some(item)) => item,
                Ok(None) => {
                    attempts += 1;
                    if attempts >= limit {
                        return Err(ExecutionError::database(format!(
                            "could not create '{}' after {} attempts",
                            entry.item_name, attempts
                        )));
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            let before = item.on_hand;
            let after = before + delta;
            if after < Decimal::ZERO && !self.config.allow_negative_stock {
                return Err(ExecutionError::validation(format!(
                    "Insufficient stock for '{}': {} on hand, {} requested",
                    item.name,
                    before.normalize(),
                    delta.abs().normalize()
                )));
            }

            match self.ledger.apply_delta(&item.name, delta, item.revision) {
                Ok(updated) => {
                    log.record_delta(entry.line, &updated.name, delta);
                    if updated.on_hand != after {
                        return Err(ExecutionError::critical(format!(
                            "verification failed for '{}': expected {}, found {}",
                            updated.name,
                            after.normalize(),
                            updated.on_hand.normalize()
                        )));
                    }
                    return Ok(AppliedChange {
                        before,
                        after,
                        delta,
                        created,
                    });
                }
                Err(RepositoryError::OptimisticLockFailure { .. })
                | Err(RepositoryError::NotFound { .. }) => {
                    attempts += 1;
                    if attempts >= limit {
                        return Err(ExecutionError::database(format!(
                            "'{}' kept changing concurrently; gave up after {} attempts",
                            item.name, attempts
                        )));
                    }
                    debug!(line = entry.line, attempts, "乐观锁冲突，重读后重试");
                }
                Err(e) => return Err(classify(e)),
            }
        }
    }

    /// 读取物料；入库时不存在则新建
    ///
    /// # 返回
    /// - Ok(Some(item))
    /// - Ok(None): 新建时与并发入库冲突，调用方应重读
    fn load_or_create(
        &self,
        entry: &CandidateMovement,
        log: &mut CompensationLog,
        created: &mut bool,
    ) -> Result<Option<CatalogItem>, ExecutionError> {
        if let Some(item) = self.ledger.get_item_by_name(&entry.item_name).map_err(classify)? {
            return Ok(Some(item));
        }

        if entry.movement_kind != MovementKind::Receipt {
            return Err(ExecutionError::validation(format!(
                "Item not found: {}",
                entry.item_name
            )));
        }

        let new_item = NewCatalogItem {
            name: entry.item_name.clone(),
            category: entry.category.clone(),
            unit: entry.unit,
        };
        match self.ledger.create_item(&new_item) {
            Ok(item) => {
                log.record_created(entry.line, &item.name);
                *created = true;
                info!(item = %item.name, category = %item.category, "新建台账物料");
                Ok(Some(item))
            }
            Err(RepositoryError::UniqueConstraintViolation(_)) => Ok(None),
            Err(e) => Err(classify(e)),
        }
    }

    // ==========================================
    // 快照与审计
    // ==========================================

    fn take_snapshot(&self, names: &[String], batch_id: &str) -> StockSnapshot {
        match self.ledger.snapshot(names) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(batch_id, error = %e, "库存快照读取失败");
                StockSnapshot::new()
            }
        }
    }

    fn write_audit(&self, outcome: &BatchOutcome) {
        let actor = outcome.executed_by.as_str();
        let at = outcome.executed_at;
        let mut records = Vec::new();

        for r in outcome.results.iter().filter(|r| r.is_success()) {
            let (Some(before), Some(after)) = (r.before, r.after) else {
                continue;
            };
            if r.item_created {
                records.push(
                    AuditRecord::new(&outcome.batch_id, AuditAction::ItemCreated, actor, at)
                        .with_item_change(&r.item_name, r.movement_kind.as_str(), Decimal::ZERO, Decimal::ZERO)
                        .with_detail(format!("created by line {}", r.line)),
                );
            }
            records.push(
                AuditRecord::new(&outcome.batch_id, AuditAction::MovementApplied, actor, at)
                    .with_item_change(&r.item_name, r.movement_kind.as_str(), before, after)
                    .with_payload(serde_json::json!({
                        "project": r.project,
                        "driver": r.driver,
                    }))
                    .with_detail(format!("line {}", r.line)),
            );
        }

        let action = if outcome.rollback_performed {
            AuditAction::BatchRolledBack
        } else {
            AuditAction::BatchExecuted
        };
        records.push(
            AuditRecord::new(&outcome.batch_id, action, actor, at)
                .with_payload(serde_json::json!({
                    "total": outcome.total(),
                    "successful": outcome.successful,
                    "failed": outcome.failed,
                    "rollback_errors": outcome.rollback_errors.len(),
                }))
                .with_detail(outcome.summary.clone()),
        );

        if let Err(e) = self.ledger.append_audit(&records) {
            error!(batch_id = %outcome.batch_id, error = %e, "审计记录写入失败");
        }
    }
}

/// 批次涉及的物料名（保持首次出现顺序，忽略大小写去重）
pub(crate) fn touched_names(movements: &[CandidateMovement]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    movements
        .iter()
        .filter(|m| seen.insert(crate::domain::item::name_key(&m.item_name)))
        .map(|m| m.item_name.clone())
        .collect()
}

fn result_for(
    entry: &CandidateMovement,
    status: MovementStatus,
    change: Option<AppliedChange>,
    error: Option<ExecutionError>,
) -> MovementResult {
    MovementResult {
        line: entry.line,
        item_name: entry.item_name.clone(),
        movement_kind: entry.movement_kind,
        quantity: entry.quantity,
        unit: entry.unit,
        project: entry.project.clone(),
        driver: entry.driver.clone(),
        status,
        delta: change.map(|c| c.delta),
        before: change.map(|c| c.before),
        after: change.map(|c| c.after),
        item_created: change.map(|c| c.created).unwrap_or(false),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_schema, open_sqlite_connection};
    use crate::parser::BatchParser;
    use crate::repository::SqliteLedgerStore;
    use std::sync::Mutex;

    fn ledger() -> Arc<SqliteLedgerStore> {
        let conn = open_sqlite_connection(":memory:").unwrap();
        init_schema(&conn).unwrap();
        Arc::new(SqliteLedgerStore::new(Arc::new(Mutex::new(conn))))
    }

    fn run(ledger: Arc<SqliteLedgerStore>, text: &str) -> BatchOutcome {
        let batch = BatchParser::default().parse(text);
        BatchExecutor::new(ledger, BatchConfig::default()).execute(
            "batch_test",
            &batch.entries,
            "admin",
            Utc::now(),
        )
    }

    #[test]
    fn test_receipt_creates_items() {
        let ledger = ledger();
        let outcome = run(ledger.clone(), "/in project: Bridge\ncement, 50 bags\nsand, 2 tons");
        assert_eq!(outcome.successful, 2);
        assert!(outcome.results.iter().all(|r| r.item_created));
        assert_eq!(
            ledger.get_item_by_name("cement").unwrap().unwrap().on_hand,
            Decimal::new(50, 0)
        );
        assert!(!outcome.before_snapshot.get("cement").unwrap().exists);
        assert_eq!(outcome.after_snapshot.on_hand("sand"), Decimal::new(2, 0));
    }

    #[test]
    fn test_issue_failures_do_not_stop_batch() {
        let ledger = ledger();
        run(ledger.clone(), "/in project: Bridge\ncement, 10");
        let outcome = run(ledger.clone(), "/out project: Bridge\ncement, 4\nrebar, 1\ncement, 20");

        assert_eq!(outcome.successful, 1);
        assert!(!outcome.rollback_performed);
        let errors: Vec<String> = outcome
            .results
            .iter()
            .filter_map(|r| r.error.as_ref().map(|e| e.kind.as_str().to_string()))
            .collect();
        assert_eq!(errors, vec!["VALIDATION", "VALIDATION"]);
        assert_eq!(outcome.after_snapshot.on_hand("cement"), Decimal::new(6, 0));
    }

    #[test]
    fn test_adjustment_applies_signed_quantity() {
        let ledger = ledger();
        run(ledger.clone(), "/in project: Bridge\ncement, 10");
        let outcome = run(ledger.clone(), "/adjust project: Bridge\ncement, -3");
        assert_eq!(outcome.successful, 1);
        assert_eq!(outcome.results[0].delta, Some(Decimal::new(-3, 0)));
        assert_eq!(outcome.after_snapshot.on_hand("cement"), Decimal::new(7, 0));
    }

    #[test]
    fn test_touched_names_dedup() {
        let batch = BatchParser::default().parse("/in project: A\ncement, 1\nCement, 2\nsand, 3");
        assert_eq!(touched_names(&batch.entries), vec!["cement", "sand"]);
    }
}
