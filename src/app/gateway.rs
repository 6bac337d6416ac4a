// ==========================================
// 出入库批量指令 - 消息网关
// ==========================================
// 职责: 定义消息发送接口（文本回复 / 审批请求）
// 实现者: ConsoleGateway（控制台）；其他传输由适配方实现
// ==========================================

use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;
use thiserror::Error;

/// 审批动作前缀
pub const APPROVE_ACTION: &str = "approve";
pub const REJECT_ACTION: &str = "reject";

/// 构造审批回调数据 "<action>:<batch_id>"
pub fn action_data(action: &str, batch_id: &str) -> String {
    format!("{}:{}", action, batch_id)
}

// ==========================================
// GatewayError - 网关错误
// ==========================================
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Conversation not reachable: {0}")]
    Unreachable(String),

    #[error("Message delivery failed: {0}")]
    DeliveryFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

// ==========================================
// MessagingGateway Trait
// ==========================================
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// 发送文本消息
    async fn send_text(&self, conversation_id: &str, text: &str) -> GatewayResult<()>;

    /// 发送审批请求
    ///
    /// # 参数
    /// - conversation_id: 审批人所在会话
    /// - batch_id: 批次 ID
    /// - preview: 批次预览文本
    ///
    /// # 说明
    /// 实现方需提供两个动作，回调数据分别为
    /// `approve:<batch_id>` 与 `reject:<batch_id>`
    async fn send_approval_request(
        &self,
        conversation_id: &str,
        batch_id: &str,
        preview: &str,
    ) -> GatewayResult<()>;
}

// ==========================================
// ConsoleGateway - 控制台网关
// ==========================================
pub struct ConsoleGateway<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleGateway<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleGateway<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write_block(&self, header: &str, body: &str) -> GatewayResult<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|e| GatewayError::DeliveryFailed(format!("output lock poisoned: {}", e)))?;
        writeln!(out, "{}", header)?;
        writeln!(out, "{}", body.trim_end())?;
        out.flush()?;
        Ok(())
    }

    /// 取回输出端（测试用）
    pub fn into_inner(self) -> GatewayResult<W> {
        self.out
            .into_inner()
            .map_err(|e| GatewayError::DeliveryFailed(e.to_string()))
    }
}

#[async_trait]
impl<W: Write + Send> MessagingGateway for ConsoleGateway<W> {
    async fn send_text(&self, conversation_id: &str, text: &str) -> GatewayResult<()> {
        self.write_block(&format!("[{}]", conversation_id), text)
    }

    async fn send_approval_request(
        &self,
        conversation_id: &str,
        batch_id: &str,
        preview: &str,
    ) -> GatewayResult<()> {
        let body = format!(
            "{}\nReply with `{}` or `{}`",
            preview.trim_end(),
            action_data(APPROVE_ACTION, batch_id),
            action_data(REJECT_ACTION, batch_id)
        );
        self.write_block(&format!("[{}] approval requested", conversation_id), &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_console_gateway_lists_actions() {
        let gateway = ConsoleGateway::new(Vec::new());
        gateway
            .send_approval_request("admins", "batch_1_abcd1234", "Receipt of 1 item(s)\n")
            .await
            .unwrap();

        let text = String::from_utf8(gateway.into_inner().unwrap()).unwrap();
        assert!(text.starts_with("[admins] approval requested\n"));
        assert!(text.contains("approve:batch_1_abcd1234"));
        assert!(text.contains("reject:batch_1_abcd1234"));
    }
}
