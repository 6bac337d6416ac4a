// ==========================================
// 出入库批量指令 - 物料台账仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
// 并发: 所有数量写入均校验 revision (乐观锁)，写入后 revision + 1
// ==========================================

use crate::domain::item::{name_key, CatalogItem, NewCatalogItem};
use crate::domain::types::Unit;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_ts, parse_decimal, parse_ts};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str =
    "item_id, name, category, unit, on_hand, revision, created_at, updated_at";

/// 数据库原始行 (字符串形态，出闭包后再解析)
struct ItemRow {
    item_id: String,
    name: String,
    category: String,
    unit: String,
    on_hand: String,
    revision: i64,
    created_at: String,
    updated_at: String,
}

impl ItemRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            item_id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            unit: row.get(3)?,
            on_hand: row.get(4)?,
            revision: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_item(self) -> RepositoryResult<CatalogItem> {
        let unit = Unit::from_str(&self.unit).ok_or_else(|| RepositoryError::FieldValueError {
            field: "unit".to_string(),
            message: format!("未知单位 '{}' (item={})", self.unit, self.name),
        })?;
        Ok(CatalogItem {
            on_hand: parse_decimal("on_hand", &self.on_hand)?,
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            item_id: self.item_id,
            name: self.name,
            category: self.category,
            unit,
            revision: self.revision,
        })
    }
}

// ==========================================
// CatalogItemRepository - 物料台账仓储
// ==========================================
pub struct CatalogItemRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CatalogItemRepository {
    /// 创建新的台账仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn load_in_tx(tx: &Transaction<'_>, key: &str) -> RepositoryResult<Option<CatalogItem>> {
        let sql = format!("SELECT {} FROM catalog_item WHERE name_key = ?1", SELECT_COLUMNS);
        let row = tx
            .query_row(&sql, params![key], ItemRow::from_row)
            .optional()?;
        row.map(ItemRow::into_item).transpose()
    }

    fn not_found(name: &str) -> RepositoryError {
        RepositoryError::NotFound {
            entity: "CatalogItem".to_string(),
            id: name.to_string(),
        }
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按名称查询（忽略大小写与多余空白）
    pub fn find_by_name(&self, name: &str) -> RepositoryResult<Option<CatalogItem>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM catalog_item WHERE name_key = ?1", SELECT_COLUMNS);
        let row = conn
            .query_row(&sql, params![name_key(name)], ItemRow::from_row)
            .optional()?;
        row.map(ItemRow::into_item).transpose()
    }

    /// 查询全部物料（按名称排序）
    pub fn list_all(&self) -> RepositoryResult<Vec<CatalogItem>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM catalog_item ORDER BY name_key", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], ItemRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ItemRow::into_item).collect()
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 新建物料 (on_hand = 0, revision = 1)
    ///
    /// # 返回
    /// - Err(UniqueConstraintViolation): 同名物料已存在
    pub fn insert(&self, item: &NewCatalogItem) -> RepositoryResult<CatalogItem> {
        let conn = self.get_conn()?;
        let now = Utc::now();
        let created = CatalogItem {
            item_id: uuid::Uuid::new_v4().to_string(),
            name: item.name.trim().to_string(),
            category: item.category.clone(),
            unit: item.unit,
            on_hand: Decimal::ZERO,
            revision: 1,
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            r#"
            INSERT INTO catalog_item (
                item_id, name, name_key, category, unit, on_hand, revision, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                created.item_id,
                created.name,
                name_key(&created.name),
                created.category,
                created.unit.as_str(),
                created.on_hand.to_string(),
                created.revision,
                fmt_ts(&created.created_at),
                fmt_ts(&created.updated_at),
            ],
        )?;

        Ok(created)
    }

    /// 条件写入: 仅当 revision 等于 expected_revision 时修改在库数量
    ///
    /// # 参数
    /// - `name`: 物料名
    /// - `delta`: 带符号变化量
    /// - `expected_revision`: 调用方读取时的 revision
    ///
    /// # 返回
    /// - `Ok(item)`: 写入后的物料
    /// - `Err(OptimisticLockFailure)`: 期间被其他写入修改
    /// - `Err(NotFound)`: 物料不存在
    pub fn update_on_hand_if_revision(
        &self,
        name: &str,
        delta: Decimal,
        expected_revision: i64,
    ) -> RepositoryResult<CatalogItem> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let key = name_key(name);

        let current = Self::load_in_tx(&tx, &key)?.ok_or_else(|| Self::not_found(name))?;
        if current.revision != expected_revision {
            return Err(RepositoryError::OptimisticLockFailure {
                entity_id: current.name,
                expected: expected_revision,
                actual: current.revision,
            });
        }

        let new_on_hand = current.on_hand + delta;
        let changed = tx.execute(
            r#"
            UPDATE catalog_item
               SET on_hand = ?1, revision = revision + 1, updated_at = ?2
             WHERE name_key = ?3 AND revision = ?4
            "#,
            params![
                new_on_hand.to_string(),
                fmt_ts(&Utc::now()),
                key,
                expected_revision
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::OptimisticLockFailure {
                entity_id: current.name,
                expected: expected_revision,
                actual: -1,
            });
        }

        let updated = Self::load_in_tx(&tx, &key)?.ok_or_else(|| Self::not_found(name))?;
        tx.commit()?;
        Ok(updated)
    }

    /// 原子增减在库数量（不校验调用方 revision，用于补偿回滚）
    pub fn increment_on_hand(&self, name: &str, delta: Decimal) -> RepositoryResult<CatalogItem> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let key = name_key(name);

        let current = Self::load_in_tx(&tx, &key)?.ok_or_else(|| Self::not_found(name))?;
        let new_on_hand = current.on_hand + delta;
        tx.execute(
            r#"
            UPDATE catalog_item
               SET on_hand = ?1, revision = revision + 1, updated_at = ?2
             WHERE name_key = ?3
            "#,
            params![new_on_hand.to_string(), fmt_ts(&Utc::now()), key],
        )?;

        let updated = Self::load_in_tx(&tx, &key)?.ok_or_else(|| Self::not_found(name))?;
        tx.commit()?;
        Ok(updated)
    }

    /// 删除库存为零的物料
    ///
    /// 在同一事务内读取并判断 on_hand，非零时保留该行
    ///
    /// # 返回
    /// - Ok(true): 已删除
    /// - Ok(false): 仍有库存（其他批次已写入），未删除
    /// - Err(NotFound): 不存在
    pub fn delete_if_empty(&self, name: &str) -> RepositoryResult<bool> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let key = name_key(name);

        let current = Self::load_in_tx(&tx, &key)?.ok_or_else(|| Self::not_found(name))?;
        if !current.on_hand.is_zero() {
            return Ok(false);
        }

        let rows = tx.execute(
            "DELETE FROM catalog_item WHERE name_key = ?1 AND revision = ?2",
            params![key, current.revision],
        )?;
        tx.commit()?;
        Ok(rows > 0)
    }
}
