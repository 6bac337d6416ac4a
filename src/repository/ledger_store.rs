// ==========================================
// 出入库批量指令 - 台账存储接口
// ==========================================
// 职责: 定义执行引擎与查重引擎所需的台账访问接口
// 红线: 接口只做数据读写，不含业务规则
// 实现者: SqliteLedgerStore（组合物料仓储与审计仓储）
// ==========================================

use crate::domain::approval::{StockLevel, StockSnapshot};
use crate::domain::audit_log::AuditRecord;
use crate::domain::item::{CatalogItem, NewCatalogItem};
use crate::repository::audit_log_repo::AuditLogRepository;
use crate::repository::error::RepositoryResult;
use crate::repository::item_repo::CatalogItemRepository;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

// ==========================================
// LedgerStore Trait
// ==========================================
pub trait LedgerStore: Send + Sync {
    /// 按名称查询物料（忽略大小写与多余空白）
    fn get_item_by_name(&self, name: &str) -> RepositoryResult<Option<CatalogItem>>;

    /// 查询全部物料
    fn list_all_items(&self) -> RepositoryResult<Vec<CatalogItem>>;

    /// 新建物料，同名已存在返回 UniqueConstraintViolation
    fn create_item(&self, item: &NewCatalogItem) -> RepositoryResult<CatalogItem>;

    /// 条件写入（乐观锁）
    ///
    /// # 返回
    /// - Err(OptimisticLockFailure): revision 已变化，调用方应重读后重试
    fn apply_delta(
        &self,
        name: &str,
        delta: Decimal,
        expected_revision: i64,
    ) -> RepositoryResult<CatalogItem>;

    /// 无条件原子增减（补偿用）
    fn increment_on_hand(&self, name: &str, delta: Decimal) -> RepositoryResult<CatalogItem>;

    /// 删除库存为零的物料（补偿新建用）
    ///
    /// # 返回
    /// - Ok(false): 其他批次已写入库存，物料保留
    fn remove_item_if_empty(&self, name: &str) -> RepositoryResult<bool>;

    /// 追加审计记录
    fn append_audit(&self, records: &[AuditRecord]) -> RepositoryResult<usize>;

    /// 读取指定物料的库存快照
    ///
    /// 快照键为调用方给出的名称；不存在的物料记为 StockLevel::absent()
    fn snapshot(&self, names: &[String]) -> RepositoryResult<StockSnapshot> {
        let mut snapshot = StockSnapshot::new();
        for name in names {
            let level = match self.get_item_by_name(name)? {
                Some(item) => StockLevel::present(item.on_hand),
                None => StockLevel::absent(),
            };
            snapshot.insert(name.clone(), level);
        }
        Ok(snapshot)
    }
}

// ==========================================
// SqliteLedgerStore - SQLite 实现
// ==========================================
pub struct SqliteLedgerStore {
    items: CatalogItemRepository,
    audit: AuditLogRepository,
}

impl SqliteLedgerStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            items: CatalogItemRepository::new(conn.clone()),
            audit: AuditLogRepository::new(conn),
        }
    }

    /// 审计仓储（查询与导出用）
    pub fn audit_log(&self) -> &AuditLogRepository {
        &self.audit
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn get_item_by_name(&self, name: &str) -> RepositoryResult<Option<CatalogItem>> {
        self.items.find_by_name(name)
    }

    fn list_all_items(&self) -> RepositoryResult<Vec<CatalogItem>> {
        self.items.list_all()
    }

    fn create_item(&self, item: &NewCatalogItem) -> RepositoryResult<CatalogItem> {
        self.items.insert(item)
    }

    fn apply_delta(
        &self,
        name: &str,
        delta: Decimal,
        expected_revision: i64,
    ) -> RepositoryResult<CatalogItem> {
        self.items
            .update_on_hand_if_revision(name, delta, expected_revision)
    }

    fn increment_on_hand(&self, name: &str, delta: Decimal) -> RepositoryResult<CatalogItem> {
        self.items.increment_on_hand(name, delta)
    }

    fn remove_item_if_empty(&self, name: &str) -> RepositoryResult<bool> {
        self.items.delete_if_empty(name)
    }

    fn append_audit(&self, records: &[AuditRecord]) -> RepositoryResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.audit.batch_insert(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_schema, open_sqlite_connection};
    use crate::domain::types::Unit;

    #[test]
    fn test_snapshot_marks_absent_items() {
        let conn = open_sqlite_connection(":memory:").unwrap();
        init_schema(&conn).unwrap();
        let store = SqliteLedgerStore::new(Arc::new(Mutex::new(conn)));

        let item = store
            .create_item(&NewCatalogItem {
                name: "Cement".to_string(),
                category: "Construction Materials".to_string(),
                unit: Unit::Bag,
            })
            .unwrap();
        store.apply_delta("Cement", Decimal::new(20, 0), item.revision).unwrap();

        let snap = store
            .snapshot(&["Cement".to_string(), "Rebar".to_string()])
            .unwrap();
        assert_eq!(snap.get("Cement"), Some(&StockLevel::present(Decimal::new(20, 0))));
        assert_eq!(snap.get("Rebar"), Some(&StockLevel::absent()));
    }
}
