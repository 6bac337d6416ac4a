// ==========================================
// 出入库批量指令 - 控制台入口
// ==========================================
// 输入格式（每行一条；行尾为冒号时进入多行模式，空行结束）:
//   <actor_id> <指令或查询>
//   例: admin /in project: Bridge; cement, 50 bags; sand, 3 tons
//   例: admin approve:batch_1700000000_ab12cd34
// ==========================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use stock_batch_ledger::api::RequestContext;
use stock_batch_ledger::app::{get_default_db_path, AppState, ConsoleGateway};
use stock_batch_ledger::logging;

const CONSOLE_CONVERSATION: &str = "console";
const SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} v{}", stock_batch_ledger::APP_NAME, stock_batch_ledger::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path)
        .map_err(anyhow::Error::msg)
        .context("无法初始化AppState")?;

    let gateway = Arc::new(ConsoleGateway::stdout());
    let service = Arc::new(state.bot_service(gateway, CONSOLE_CONVERSATION));
    let sweeper = service.clone().spawn_expiry_sweeper(SWEEP_PERIOD);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = String::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            if !pending.is_empty() {
                dispatch(&service, &pending).await;
                pending.clear();
            }
            continue;
        }
        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(&line);

        // 单行指令立即处理
        if !line.trim_end().ends_with(':') && !pending.contains('\n') {
            dispatch(&service, &pending).await;
            pending.clear();
        }
    }
    if !pending.is_empty() {
        dispatch(&service, &pending).await;
    }

    sweeper.abort();
    Ok(())
}

/// 拆出首个单词作为操作人，其余交给消息服务
async fn dispatch(service: &stock_batch_ledger::app::BotService, input: &str) {
    let Some((actor, text)) = input.trim().split_once(char::is_whitespace) else {
        println!("Usage: <actor_id> <command>");
        return;
    };
    let ctx = RequestContext::new(actor, actor, CONSOLE_CONVERSATION);
    if let Err(e) = service.handle_message(&ctx, text).await {
        tracing::error!(error = %e, "消息处理失败");
    }
}
