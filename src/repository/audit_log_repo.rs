// ==========================================
// 出入库批量指令 - 审计日志仓储
// ==========================================
// 红线: 只追加，不提供修改/删除
// 导出: CSV (csv crate)
// ==========================================

use crate::domain::audit_log::AuditRecord;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_ts, parse_opt_decimal, parse_ts};
use rusqlite::{params, Connection};
use std::io::Write;
use std::sync::{Arc, Mutex};

const INSERT_SQL: &str = r#"
    INSERT INTO audit_log (
        audit_id, batch_id, action, actor, recorded_at,
        item_name, movement_kind, previous_on_hand, new_on_hand, delta,
        payload_json, detail
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
"#;

const SELECT_COLUMNS: &str = "audit_id, batch_id, action, actor, recorded_at, item_name, \
     movement_kind, previous_on_hand, new_on_hand, delta, payload_json, detail";

struct AuditRow {
    audit_id: String,
    batch_id: String,
    action: String,
    actor: String,
    recorded_at: String,
    item_name: Option<String>,
    movement_kind: Option<String>,
    previous_on_hand: Option<String>,
    new_on_hand: Option<String>,
    delta: Option<String>,
    payload_json: Option<String>,
    detail: Option<String>,
}

impl AuditRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            audit_id: row.get(0)?,
            batch_id: row.get(1)?,
            action: row.get(2)?,
            actor: row.get(3)?,
            recorded_at: row.get(4)?,
            item_name: row.get(5)?,
            movement_kind: row.get(6)?,
            previous_on_hand: row.get(7)?,
            new_on_hand: row.get(8)?,
            delta: row.get(9)?,
            payload_json: row.get(10)?,
            detail: row.get(11)?,
        })
    }

    fn into_record(self) -> RepositoryResult<AuditRecord> {
        let payload_json = match self.payload_json {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        Ok(AuditRecord {
            recorded_at: parse_ts("recorded_at", &self.recorded_at)?,
            previous_on_hand: parse_opt_decimal("previous_on_hand", self.previous_on_hand)?,
            new_on_hand: parse_opt_decimal("new_on_hand", self.new_on_hand)?,
            delta: parse_opt_decimal("delta", self.delta)?,
            audit_id: self.audit_id,
            batch_id: self.batch_id,
            action: self.action,
            actor: self.actor,
            item_name: self.item_name,
            movement_kind: self.movement_kind,
            payload_json,
            detail: self.detail,
        })
    }
}

// ==========================================
// AuditLogRepository - 审计日志仓储
// ==========================================
pub struct AuditLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AuditLogRepository {
    /// 创建新的审计日志仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入单条审计记录
    pub fn insert(&self, record: &AuditRecord) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_with(&conn, record)?;
        Ok(record.audit_id.clone())
    }

    /// 批量插入审计记录（单事务）
    pub fn batch_insert(&self, records: &[AuditRecord]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for record in records {
            Self::insert_with(&tx, record)?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    fn insert_with(conn: &Connection, record: &AuditRecord) -> RepositoryResult<()> {
        conn.execute(
            INSERT_SQL,
            params![
                record.audit_id,
                record.batch_id,
                record.action,
                record.actor,
                fmt_ts(&record.recorded_at),
                record.item_name,
                record.movement_kind,
                record.previous_on_hand.map(|d| d.to_string()),
                record.new_on_hand.map(|d| d.to_string()),
                record.delta.map(|d| d.to_string()),
                record.payload_json.as_ref().map(|v| v.to_string()),
                record.detail,
            ],
        )?;
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 查询批次的全部审计记录（按时间顺序）
    pub fn list_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<AuditRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM audit_log WHERE batch_id = ?1 ORDER BY recorded_at, rowid",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![batch_id], AuditRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(AuditRow::into_record).collect()
    }

    /// 查询最近的审计记录
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<AuditRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM audit_log ORDER BY recorded_at DESC, rowid DESC LIMIT ?1",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], AuditRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(AuditRow::into_record).collect()
    }

    // ==========================================
    // 导出
    // ==========================================

    /// 导出审计记录为 CSV
    ///
    /// # 参数
    /// - `records`: 待导出记录
    /// - `writer`: 输出目标
    ///
    /// # 返回
    /// - `Ok(rows)`: 写出的数据行数（不含表头）
    pub fn export_csv<W: Write>(records: &[AuditRecord], writer: W) -> RepositoryResult<usize> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        let to_err = |e: csv::Error| RepositoryError::InternalError(format!("CSV 导出失败: {}", e));

        csv_writer
            .write_record([
                "recorded_at",
                "batch_id",
                "action",
                "actor",
                "item_name",
                "movement_kind",
                "previous_on_hand",
                "new_on_hand",
                "delta",
                "detail",
            ])
            .map_err(to_err)?;

        for r in records {
            let opt_dec = |d: Option<rust_decimal::Decimal>| d.map(|v| v.to_string()).unwrap_or_default();
            csv_writer
                .write_record([
                    fmt_ts(&r.recorded_at),
                    r.batch_id.clone(),
                    r.action.clone(),
                    r.actor.clone(),
                    r.item_name.clone().unwrap_or_default(),
                    r.movement_kind.clone().unwrap_or_default(),
                    opt_dec(r.previous_on_hand),
                    opt_dec(r.new_on_hand),
                    opt_dec(r.delta),
                    r.detail.clone().unwrap_or_default(),
                ])
                .map_err(to_err)?;
        }

        csv_writer
            .flush()
            .map_err(|e| RepositoryError::InternalError(format!("CSV 导出失败: {}", e)))?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_schema, open_sqlite_connection};
    use crate::domain::audit_log::AuditAction;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn repo() -> AuditLogRepository {
        let conn = open_sqlite_connection(":memory:").unwrap();
        init_schema(&conn).unwrap();
        AuditLogRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_batch_insert_and_list() {
        let repo = repo();
        let now = Utc::now();
        let records = vec![
            AuditRecord::new("batch_1", AuditAction::MovementApplied, "admin", now)
                .with_item_change("cement", "Receipt", Decimal::ZERO, Decimal::new(50, 0)),
            AuditRecord::new("batch_1", AuditAction::BatchExecuted, "admin", now)
                .with_payload(serde_json::json!({"successful": 1})),
            AuditRecord::new("batch_2", AuditAction::BatchRejected, "admin", now),
        ];
        assert_eq!(repo.batch_insert(&records).unwrap(), 3);

        let listed = repo.list_by_batch("batch_1").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].delta, Some(Decimal::new(50, 0)));
        assert_eq!(listed[1].payload_json, Some(serde_json::json!({"successful": 1})));
        assert_eq!(repo.list_recent(10).unwrap().len(), 3);
    }

    #[test]
    fn test_export_csv() {
        let now = Utc::now();
        let records = vec![AuditRecord::new("batch_1", AuditAction::MovementApplied, "admin", now)
            .with_item_change("sand, washed", "Issue", Decimal::new(10, 0), Decimal::new(7, 0))];

        let mut buf = Vec::new();
        let rows = AuditLogRepository::export_csv(&records, &mut buf).unwrap();
        assert_eq!(rows, 1);

        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("recorded_at,batch_id"));
        let row = lines.next().unwrap();
        assert!(row.contains("\"sand, washed\""));
        assert!(row.contains(",-3,"));
    }
}
