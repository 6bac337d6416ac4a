// ==========================================
// 出入库批量指令 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope，仅使用 global)
// ==========================================

use crate::config::batch_config::BatchConfig;
use crate::db::open_sqlite_connection;
use crate::domain::movement::GlobalField;
use crate::domain::types::ActorRole;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值 (UPSERT)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    /// 读取并解析数值/布尔配置，格式错误时告警并回退默认值
    fn get_parsed_or<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr + Copy,
    {
        match self.get_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    /// 加载流水线参数（默认值 + config_kv 覆写）
    pub fn load_batch_config(&self) -> Result<BatchConfig, Box<dyn Error>> {
        let d = BatchConfig::default();
        let dd = &d.duplicate;

        let required_fields = match self.get_config_value(config_keys::REQUIRED_FIELDS)? {
            Some(raw) => raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .filter_map(|s| {
                    let field = GlobalField::from_key(s);
                    if field.is_none() {
                        tracing::warn!(field = s.trim(), "未知的必填字段，已忽略");
                    }
                    field
                })
                .collect(),
            None => d.required_fields.clone(),
        };

        let mut config = BatchConfig {
            max_batch_size: self.get_parsed_or(config_keys::MAX_BATCH_SIZE, d.max_batch_size)?,
            required_fields,
            large_quantity_warning: self
                .get_parsed_or(config_keys::LARGE_QUANTITY_WARNING, d.large_quantity_warning)?,
            approval_ttl_hours: self.get_parsed_or(config_keys::APPROVAL_TTL_HOURS, d.approval_ttl_hours)?,
            consumed_retention_hours: self
                .get_parsed_or(config_keys::RETENTION_HOURS, d.consumed_retention_hours)?,
            allow_negative_stock: self
                .get_parsed_or(config_keys::ALLOW_NEGATIVE_STOCK, d.allow_negative_stock)?,
            optimistic_retry_limit: self
                .get_parsed_or(config_keys::RETRY_LIMIT, d.optimistic_retry_limit)?,
            duplicate: d.duplicate.clone(),
        };

        config.duplicate.threshold = self.get_parsed_or(config_keys::DUP_THRESHOLD, dd.threshold)?;
        config.duplicate.eligible_floor =
            self.get_parsed_or(config_keys::DUP_ELIGIBLE_FLOOR, dd.eligible_floor)?;
        config.duplicate.overlap_weight =
            self.get_parsed_or(config_keys::DUP_OVERLAP_WEIGHT, dd.overlap_weight)?;
        config.duplicate.prefix_boost = self.get_parsed_or(config_keys::DUP_PREFIX_BOOST, dd.prefix_boost)?;
        config.duplicate.containment_boost =
            self.get_parsed_or(config_keys::DUP_CONTAINMENT_BOOST, dd.containment_boost)?;
        config.duplicate.max_missing_keywords =
            self.get_parsed_or(config_keys::DUP_MAX_MISSING, dd.max_missing_keywords)?;
        config.duplicate.max_candidates =
            self.get_parsed_or(config_keys::DUP_MAX_CANDIDATES, dd.max_candidates)?;

        // 最小值保护
        if config.max_batch_size == 0 {
            tracing::warn!("batch.max_size 不能为 0，使用默认值");
            config.max_batch_size = d.max_batch_size;
        }
        if config.approval_ttl_hours <= 0 {
            tracing::warn!("approval.ttl_hours 必须为正数，使用默认值");
            config.approval_ttl_hours = d.approval_ttl_hours;
        }

        Ok(config)
    }

    /// 读取操作人角色表 (auth.admin_ids / auth.staff_ids，逗号分隔)
    ///
    /// 同一 ID 同时出现在两个列表中时按 Admin 处理
    pub fn get_actor_roles(&self) -> Result<HashMap<String, ActorRole>, Box<dyn Error>> {
        let mut roles = HashMap::new();

        if let Some(raw) = self.get_config_value(config_keys::STAFF_IDS)? {
            for id in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                roles.insert(id.to_string(), ActorRole::Staff);
            }
        }
        if let Some(raw) = self.get_config_value(config_keys::ADMIN_IDS)? {
            for id in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                roles.insert(id.to_string(), ActorRole::Admin);
            }
        }
        Ok(roles)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 校验
    pub const MAX_BATCH_SIZE: &str = "batch.max_size";
    pub const REQUIRED_FIELDS: &str = "batch.required_fields";
    pub const LARGE_QUANTITY_WARNING: &str = "validation.large_quantity_warning";

    // 审批
    pub const APPROVAL_TTL_HOURS: &str = "approval.ttl_hours";
    pub const RETENTION_HOURS: &str = "approval.retention_hours";

    // 执行
    pub const ALLOW_NEGATIVE_STOCK: &str = "execution.allow_negative_stock";
    pub const RETRY_LIMIT: &str = "execution.retry_limit";

    // 查重
    pub const DUP_THRESHOLD: &str = "duplicate.threshold";
    pub const DUP_ELIGIBLE_FLOOR: &str = "duplicate.eligible_floor";
    pub const DUP_OVERLAP_WEIGHT: &str = "duplicate.overlap_weight";
    pub const DUP_PREFIX_BOOST: &str = "duplicate.prefix_boost";
    pub const DUP_CONTAINMENT_BOOST: &str = "duplicate.containment_boost";
    pub const DUP_MAX_MISSING: &str = "duplicate.max_missing_keywords";
    pub const DUP_MAX_CANDIDATES: &str = "duplicate.max_candidates";

    // 权限
    pub const ADMIN_IDS: &str = "auth.admin_ids";
    pub const STAFF_IDS: &str = "auth.staff_ids";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_schema, open_sqlite_connection};

    fn manager() -> ConfigManager {
        let conn = open_sqlite_connection(":memory:").unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = manager().load_batch_config().unwrap();
        assert_eq!(config, BatchConfig::default());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::MAX_BATCH_SIZE, "10").unwrap();
        mgr.set_global_config_value(config_keys::REQUIRED_FIELDS, "project, driver, bogus")
            .unwrap();
        mgr.set_global_config_value(config_keys::DUP_THRESHOLD, "not-a-number").unwrap();
        mgr.set_global_config_value(config_keys::ALLOW_NEGATIVE_STOCK, "true").unwrap();

        let config = mgr.load_batch_config().unwrap();
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(
            config.required_fields,
            vec![GlobalField::Project, GlobalField::Driver]
        );
        assert_eq!(config.duplicate.threshold, 0.7);
        assert!(config.allow_negative_stock);
    }

    #[test]
    fn test_actor_roles() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::ADMIN_IDS, "u1, u2").unwrap();
        mgr.set_global_config_value(config_keys::STAFF_IDS, "u2,u3").unwrap();

        let roles = mgr.get_actor_roles().unwrap();
        assert_eq!(roles.get("u1"), Some(&ActorRole::Admin));
        assert_eq!(roles.get("u2"), Some(&ActorRole::Admin));
        assert_eq!(roles.get("u3"), Some(&ActorRole::Staff));
    }

    #[test]
    fn test_snapshot_contains_values() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::APPROVAL_TTL_HOURS, "12").unwrap();
        let snapshot = mgr.get_config_snapshot().unwrap();
        assert!(snapshot.contains("approval.ttl_hours"));
    }
}
