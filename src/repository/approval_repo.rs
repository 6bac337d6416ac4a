// ==========================================
// 出入库批量指令 - 待审批批次仓储
// ==========================================
// 职责:
// 1) 持久化待审批批次（完整 PendingApproval 以 JSON 存储）
// 2) 提供状态原子转换 (CAS)，保证一个批次只被消费一次
// 3) 提供超时扫描与终态清理
//
// 说明:
// - status / decided_by / decided_at 列为权威值，读取时覆盖到载荷上
// - 终态记录保留至清理窗口结束，重复决策可据此返回 "already processed"
// ==========================================

use crate::domain::approval::PendingApproval;
use crate::domain::outcome::BatchOutcome;
use crate::domain::types::ApprovalStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_ts, parse_ts};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ==========================================
// TransitionOutcome - 状态转换结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// 转换成功，返回转换后的记录（调用方独占后续处理）
    Transitioned(PendingApproval),
    /// 当前状态不是期望的 from，返回实际状态
    Conflict(ApprovalStatus),
    /// 批次不存在（从未创建或已清理）
    NotFound,
}

// ==========================================
// ApprovalStore Trait
// ==========================================
pub trait ApprovalStore: Send + Sync {
    /// 保存新批次，batch_id 重复返回 UniqueConstraintViolation
    fn put(&self, record: &PendingApproval) -> RepositoryResult<()>;

    fn get(&self, batch_id: &str) -> RepositoryResult<Option<PendingApproval>>;

    fn delete(&self, batch_id: &str) -> RepositoryResult<bool>;

    /// 原子状态转换: 仅当当前状态为 from 时改为 to
    ///
    /// # 参数
    /// - `actor`: 决策人（超时转换为 None）
    /// - `at`: 决策时间
    fn transition(
        &self,
        batch_id: &str,
        from: ApprovalStatus,
        to: ApprovalStatus,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> RepositoryResult<TransitionOutcome>;

    /// 写入执行结果
    fn save_outcome(&self, batch_id: &str, outcome: &BatchOutcome) -> RepositoryResult<()>;

    /// 按状态查询（按创建时间升序）
    fn list_by_status(&self, status: ApprovalStatus) -> RepositoryResult<Vec<PendingApproval>>;

    /// 查询已超时但仍为 Pending 的批次
    fn list_expired_pending(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<PendingApproval>>;

    /// 删除决策时间早于 cutoff 的终态批次
    fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize>;
}

fn apply_decision(
    record: &mut PendingApproval,
    to: ApprovalStatus,
    actor: Option<&str>,
    at: DateTime<Utc>,
) {
    record.status = to;
    record.decided_by = actor.map(|a| a.to_string());
    record.decided_at = Some(at);
}

// ==========================================
// ApprovalBatchRepository - SQLite 实现
// ==========================================
pub struct ApprovalBatchRepository {
    conn: Arc<Mutex<Connection>>,
}

struct ApprovalRow {
    status: String,
    payload_json: String,
    decided_by: Option<String>,
    decided_at: Option<String>,
}

impl ApprovalRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            status: row.get(0)?,
            payload_json: row.get(1)?,
            decided_by: row.get(2)?,
            decided_at: row.get(3)?,
        })
    }

    fn into_record(self) -> RepositoryResult<PendingApproval> {
        let mut record: PendingApproval = serde_json::from_str(&self.payload_json)?;
        record.status =
            ApprovalStatus::from_str(&self.status).ok_or_else(|| RepositoryError::FieldValueError {
                field: "status".to_string(),
                message: format!("未知审批状态 '{}'", self.status),
            })?;
        record.decided_by = self.decided_by;
        record.decided_at = self
            .decided_at
            .map(|raw| parse_ts("decided_at", &raw))
            .transpose()?;
        Ok(record)
    }
}

const SELECT_COLUMNS: &str = "status, payload_json, decided_by, decided_at";

impl ApprovalBatchRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn load(conn: &Connection, batch_id: &str) -> RepositoryResult<Option<PendingApproval>> {
        let sql = format!(
            "SELECT {} FROM approval_batch WHERE batch_id = ?1",
            SELECT_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![batch_id], ApprovalRow::from_row)
            .optional()?;
        row.map(ApprovalRow::into_record).transpose()
    }

    fn query_many(
        conn: &Connection,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> RepositoryResult<Vec<PendingApproval>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, ApprovalRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ApprovalRow::into_record).collect()
    }
}

impl ApprovalStore for ApprovalBatchRepository {
    fn put(&self, record: &PendingApproval) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let payload = serde_json::to_string(record)?;
        conn.execute(
            r#"
            INSERT INTO approval_batch (
                batch_id, status, movement_kind, requester_id, conversation_id,
                entry_count, payload_json, created_at, expires_at, decided_by, decided_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                record.batch_id,
                record.status.as_str(),
                record.movement_kind().map(|k| k.as_str()),
                record.requester.actor_id,
                record.requester.conversation_id,
                record.batch.entries.len() as i64,
                payload,
                fmt_ts(&record.created_at),
                fmt_ts(&record.expires_at),
                record.decided_by,
                record.decided_at.as_ref().map(fmt_ts),
            ],
        )?;
        Ok(())
    }

    fn get(&self, batch_id: &str) -> RepositoryResult<Option<PendingApproval>> {
        let conn = self.get_conn()?;
        Self::load(&conn, batch_id)
    }

    fn delete(&self, batch_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM approval_batch WHERE batch_id = ?1",
            params![batch_id],
        )?;
        Ok(rows > 0)
    }

    fn transition(
        &self,
        batch_id: &str,
        from: ApprovalStatus,
        to: ApprovalStatus,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> RepositoryResult<TransitionOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut record = match Self::load(&tx, batch_id)? {
            Some(r) => r,
            None => return Ok(TransitionOutcome::NotFound),
        };
        if record.status != from {
            return Ok(TransitionOutcome::Conflict(record.status));
        }

        apply_decision(&mut record, to, actor, at);
        let payload = serde_json::to_string(&record)?;
        let changed = tx.execute(
            r#"
            UPDATE approval_batch
               SET status = ?1, decided_by = ?2, decided_at = ?3, payload_json = ?4
             WHERE batch_id = ?5 AND status = ?6
            "#,
            params![
                to.as_str(),
                record.decided_by,
                fmt_ts(&at),
                payload,
                batch_id,
                from.as_str()
            ],
        )?;
        if changed == 0 {
            let current = Self::load(&tx, batch_id)?
                .map(|r| r.status)
                .unwrap_or(to);
            return Ok(TransitionOutcome::Conflict(current));
        }

        tx.commit()?;
        Ok(TransitionOutcome::Transitioned(record))
    }

    fn save_outcome(&self, batch_id: &str, outcome: &BatchOutcome) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut record = Self::load(&tx, batch_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "PendingApproval".to_string(),
            id: batch_id.to_string(),
        })?;
        record.outcome = Some(outcome.clone());
        tx.execute(
            "UPDATE approval_batch SET payload_json = ?1 WHERE batch_id = ?2",
            params![serde_json::to_string(&record)?, batch_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn list_by_status(&self, status: ApprovalStatus) -> RepositoryResult<Vec<PendingApproval>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM approval_batch WHERE status = ?1 ORDER BY created_at",
            SELECT_COLUMNS
        );
        Self::query_many(&conn, &sql, &[&status.as_str()])
    }

    fn list_expired_pending(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<PendingApproval>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM approval_batch WHERE status = ?1 AND expires_at <= ?2 ORDER BY created_at",
            SELECT_COLUMNS
        );
        Self::query_many(
            &conn,
            &sql,
            &[&ApprovalStatus::Pending.as_str(), &fmt_ts(&now)],
        )
    }

    fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            DELETE FROM approval_batch
             WHERE status <> ?1
               AND COALESCE(decided_at, expires_at) < ?2
            "#,
            params![ApprovalStatus::Pending.as_str(), fmt_ts(&cutoff)],
        )?;
        Ok(rows)
    }
}

// ==========================================
// InMemoryApprovalStore - 内存实现（测试与单进程部署）
// ==========================================
#[derive(Default)]
pub struct InMemoryApprovalStore {
    records: Mutex<HashMap<String, PendingApproval>>,
}

impl InMemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> RepositoryResult<std::sync::MutexGuard<'_, HashMap<String, PendingApproval>>> {
        self.records
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn sorted(mut records: Vec<PendingApproval>) -> Vec<PendingApproval> {
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }
}

impl ApprovalStore for InMemoryApprovalStore {
    fn put(&self, record: &PendingApproval) -> RepositoryResult<()> {
        let mut records = self.lock()?;
        if records.contains_key(&record.batch_id) {
            return Err(RepositoryError::UniqueConstraintViolation(format!(
                "approval_batch.batch_id={}",
                record.batch_id
            )));
        }
        records.insert(record.batch_id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, batch_id: &str) -> RepositoryResult<Option<PendingApproval>> {
        Ok(self.lock()?.get(batch_id).cloned())
    }

    fn delete(&self, batch_id: &str) -> RepositoryResult<bool> {
        Ok(self.lock()?.remove(batch_id).is_some())
    }

    fn transition(
        &self,
        batch_id: &str,
        from: ApprovalStatus,
        to: ApprovalStatus,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> RepositoryResult<TransitionOutcome> {
        let mut records = self.lock()?;
        let record = match records.get_mut(batch_id) {
            Some(r) => r,
            None => return Ok(TransitionOutcome::NotFound),
        };
        if record.status != from {
            return Ok(TransitionOutcome::Conflict(record.status));
        }
        apply_decision(record, to, actor, at);
        Ok(TransitionOutcome::Transitioned(record.clone()))
    }

    fn save_outcome(&self, batch_id: &str, outcome: &BatchOutcome) -> RepositoryResult<()> {
        let mut records = self.lock()?;
        let record = records
            .get_mut(batch_id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "PendingApproval".to_string(),
                id: batch_id.to_string(),
            })?;
        record.outcome = Some(outcome.clone());
        Ok(())
    }

    fn list_by_status(&self, status: ApprovalStatus) -> RepositoryResult<Vec<PendingApproval>> {
        let records = self.lock()?;
        Ok(Self::sorted(
            records
                .values()
                .filter(|r| r.status == status)
                .cloned()
                .collect(),
        ))
    }

    fn list_expired_pending(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<PendingApproval>> {
        let records = self.lock()?;
        Ok(Self::sorted(
            records
                .values()
                .filter(|r| r.status == ApprovalStatus::Pending && r.is_expired_at(now))
                .cloned()
                .collect(),
        ))
    }

    fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize> {
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|_, r| {
            !r.status.is_terminal() || r.decided_at.unwrap_or(r.expires_at) >= cutoff
        });
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_schema, open_sqlite_connection};
    use crate::domain::approval::{Requester, StockSnapshot};
    use crate::domain::movement::{GlobalParameters, ParsedBatch};
    use crate::domain::types::{BatchFormat, MovementKind};
    use chrono::Duration;

    fn sample(batch_id: &str, created_at: DateTime<Utc>) -> PendingApproval {
        PendingApproval {
            batch_id: batch_id.to_string(),
            batch: ParsedBatch {
                movement_kind: Some(MovementKind::Receipt),
                format: BatchFormat::Single,
                globals: GlobalParameters::default(),
                entries: vec![],
                errors: vec![],
                is_consistent: false,
            },
            annotations: vec![],
            requester: Requester {
                actor_id: "u1".to_string(),
                display_name: "Ann".to_string(),
                conversation_id: "c1".to_string(),
            },
            before_snapshot: StockSnapshot::new(),
            status: ApprovalStatus::Pending,
            created_at,
            expires_at: created_at + Duration::hours(24),
            decided_by: None,
            decided_at: None,
            outcome: None,
        }
    }

    fn stores() -> Vec<Box<dyn ApprovalStore>> {
        let conn = open_sqlite_connection(":memory:").unwrap();
        init_schema(&conn).unwrap();
        vec![
            Box::new(ApprovalBatchRepository::new(Arc::new(Mutex::new(conn)))),
            Box::new(InMemoryApprovalStore::new()),
        ]
    }

    #[test]
    fn test_transition_consumes_once() {
        for store in stores() {
            let now = Utc::now();
            store.put(&sample("batch_a", now)).unwrap();

            let first = store
                .transition("batch_a", ApprovalStatus::Pending, ApprovalStatus::Approved, Some("admin"), now)
                .unwrap();
            match first {
                TransitionOutcome::Transitioned(r) => {
                    assert_eq!(r.status, ApprovalStatus::Approved);
                    assert_eq!(r.decided_by.as_deref(), Some("admin"));
                }
                other => panic!("unexpected {:?}", other),
            }

            let second = store
                .transition("batch_a", ApprovalStatus::Pending, ApprovalStatus::Rejected, Some("admin"), now)
                .unwrap();
            assert_eq!(second, TransitionOutcome::Conflict(ApprovalStatus::Approved));

            let missing = store
                .transition("nope", ApprovalStatus::Pending, ApprovalStatus::Approved, None, now)
                .unwrap();
            assert_eq!(missing, TransitionOutcome::NotFound);

            assert_eq!(
                store.get("batch_a").unwrap().unwrap().status,
                ApprovalStatus::Approved
            );
        }
    }

    #[test]
    fn test_duplicate_id_rejected() {
        for store in stores() {
            let now = Utc::now();
            store.put(&sample("batch_b", now)).unwrap();
            let err = store.put(&sample("batch_b", now)).unwrap_err();
            assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
        }
    }

    #[test]
    fn test_expiry_scan_and_purge() {
        for store in stores() {
            let t0 = Utc::now();
            store.put(&sample("old", t0 - Duration::hours(30))).unwrap();
            store.put(&sample("fresh", t0)).unwrap();

            let expired = store.list_expired_pending(t0).unwrap();
            assert_eq!(expired.len(), 1);
            assert_eq!(expired[0].batch_id, "old");

            store
                .transition("old", ApprovalStatus::Pending, ApprovalStatus::Expired, None, t0)
                .unwrap();
            assert_eq!(store.list_by_status(ApprovalStatus::Pending).unwrap().len(), 1);

            // 清理窗口内保留
            assert_eq!(store.purge_terminal_before(t0 - Duration::hours(1)).unwrap(), 0);
            assert_eq!(store.purge_terminal_before(t0 + Duration::hours(1)).unwrap(), 1);
            assert!(store.get("old").unwrap().is_none());
            assert!(store.get("fresh").unwrap().is_some());
        }
    }
}
