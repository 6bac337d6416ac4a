// ==========================================
// 出入库批量指令 - 应用层
// ==========================================
// 职责: 装配应用状态，连接消息传输与批量指令 API
// ==========================================

pub mod bot_service;
pub mod gateway;
pub mod state;

// 重导出
pub use bot_service::BotService;
pub use gateway::{action_data, ConsoleGateway, GatewayError, GatewayResult, MessagingGateway};
pub use state::{get_default_db_path, AppState};
