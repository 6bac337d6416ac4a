// ==========================================
// 出入库批量指令 - 应用状态
// ==========================================
// 职责: 打开数据库、加载配置、装配仓储/引擎/API
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{BatchCommandApi, StaticRoleDirectory};
use crate::app::bot_service::BotService;
use crate::app::gateway::MessagingGateway;
use crate::config::{BatchConfig, ConfigManager};
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::approval::ApprovalCoordinator;
use crate::engine::clock::{Clock, SystemClock};
use crate::parser::{BatchParser, KeywordCategoryClassifier};
use crate::repository::{ApprovalBatchRepository, AuditLogRepository, SqliteLedgerStore};

/// 应用状态
///
/// 持有共享连接上的全部仓储与 API 实例
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 生效的流水线参数
    pub config: BatchConfig,

    /// 批量指令API
    pub batch_api: Arc<BatchCommandApi>,

    /// 配置管理器（运行期覆写）
    pub config_manager: Arc<ConfigManager>,

    /// 台账（测试与运维查询用）
    pub ledger: Arc<SqliteLedgerStore>,
}

impl AppState {
    /// 创建新的AppState实例（系统时钟）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（":memory:" 为内存库）
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_clock(db_path, Arc::new(SystemClock))
    }

    /// 使用指定时钟创建AppState
    pub fn with_clock(db_path: String, clock: Arc<dyn Clock>) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("无法初始化数据库结构: {}", e))?;

        Self::from_connection(db_path, Arc::new(Mutex::new(conn)), clock)
    }

    /// 基于已初始化的共享连接装配
    pub fn from_connection(
        db_path: String,
        conn: Arc<Mutex<Connection>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, String> {
        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let config = config_manager
            .load_batch_config()
            .map_err(|e| format!("无法加载流水线参数: {}", e))?;
        let roles = config_manager
            .get_actor_roles()
            .map_err(|e| format!("无法加载角色配置: {}", e))?;
        tracing::info!(
            max_batch_size = config.max_batch_size,
            approval_ttl_hours = config.approval_ttl_hours,
            actors = roles.len(),
            "配置加载完成"
        );

        // ==========================================
        // 仓储
        // ==========================================
        let ledger = Arc::new(SqliteLedgerStore::new(conn.clone()));
        let approvals = Arc::new(ApprovalBatchRepository::new(conn.clone()));
        let audit_log = Arc::new(AuditLogRepository::new(conn));

        // ==========================================
        // 引擎 / API
        // ==========================================
        let coordinator = Arc::new(ApprovalCoordinator::new(
            approvals,
            ledger.clone(),
            clock,
            config.clone(),
        ));
        let parser = BatchParser::new(Arc::new(KeywordCategoryClassifier::new()));

        let batch_api = Arc::new(BatchCommandApi::new(
            parser,
            config.clone(),
            coordinator,
            Arc::new(StaticRoleDirectory::new(roles)),
            audit_log,
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            config,
            batch_api,
            config_manager,
            ledger,
        })
    }

    /// 构造消息服务
    pub fn bot_service(
        &self,
        gateway: Arc<dyn MessagingGateway>,
        approver_conversation: &str,
    ) -> BotService {
        BotService::new(self.batch_api.clone(), gateway, approver_conversation)
    }
}

/// 获取默认数据库路径
///
/// 优先读取环境变量 STOCK_LEDGER_DB_PATH，否则使用用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("STOCK_LEDGER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./stock_ledger.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("stock-batch-ledger");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("stock_ledger.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_in_memory_state_starts_empty() {
        let state = AppState::new(":memory:".to_string()).unwrap();
        let summary = state.batch_api.pending_summary().unwrap();
        assert_eq!(summary.pending_batches, 0);
        assert_eq!(state.config, BatchConfig::default());
    }
}
