// ==========================================
// 出入库批量指令 - 消息服务
// ==========================================
// 职责: 将收到的消息/审批回调转交 BatchCommandApi，并把结果发回会话
// 流程:
// - 指令消息 -> 提交 -> 回复请求人 + 向审批会话发送审批请求
// - 审批回调 -> 决策 -> 回复审批人 + 通知请求人
// - 定时扫描 -> 超时批次通知请求人 -> 清理终态批次
// 说明: API 调用为同步 SQLite 读写，统一经 spawn_blocking 执行
// ==========================================

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, ApiResult, BatchCommandApi, RequestContext};
use crate::app::gateway::{GatewayResult, MessagingGateway};
use crate::domain::approval::{ApprovalDecision, PendingApproval, PendingSummary};
use crate::engine::approval::DecisionResult;

/// 查询指令
const PENDING_COMMAND: &str = "/pending";
const STATUS_COMMAND: &str = "/status";
const AUDIT_COMMAND: &str = "/audit";

// ==========================================
// BotService - 消息服务
// ==========================================
pub struct BotService {
    api: Arc<BatchCommandApi>,
    gateway: Arc<dyn MessagingGateway>,
    approver_conversation: String,
}

impl BotService {
    /// 创建新的 BotService 实例
    ///
    /// # 参数
    /// - api: 批量指令 API
    /// - gateway: 消息网关
    /// - approver_conversation: 审批请求发送的会话
    pub fn new(
        api: Arc<BatchCommandApi>,
        gateway: Arc<dyn MessagingGateway>,
        approver_conversation: impl Into<String>,
    ) -> Self {
        Self {
            api,
            gateway,
            approver_conversation: approver_conversation.into(),
        }
    }

    pub fn api(&self) -> &BatchCommandApi {
        &self.api
    }

    /// 在阻塞线程池中调用 API
    async fn call_api<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&BatchCommandApi) -> ApiResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let api = self.api.clone();
        tokio::task::spawn_blocking(move || f(&api))
            .await
            .unwrap_or_else(|e| Err(ApiError::InternalError(format!("worker task failed: {}", e))))
    }

    // ==========================================
    // 消息入口
    // ==========================================

    /// 处理一条文本消息
    ///
    /// # 说明
    /// - 以 approve:/reject: 开头的文本按审批回调处理
    /// - /pending、/status <id>、/audit <id> 为查询指令
    /// - 其余文本按批量指令提交
    pub async fn handle_message(&self, ctx: &RequestContext, text: &str) -> GatewayResult<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        if ApprovalDecision::parse_action(trimmed).is_some() {
            return self.handle_callback(ctx, trimmed).await;
        }

        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (trimmed, ""),
        };
        match head.to_lowercase().as_str() {
            PENDING_COMMAND => self.reply_pending(ctx).await,
            STATUS_COMMAND => self.reply_status(ctx, rest).await,
            AUDIT_COMMAND => self.reply_audit(ctx, rest).await,
            _ => self.submit(ctx, trimmed).await,
        }
    }

    async fn submit(&self, ctx: &RequestContext, text: &str) -> GatewayResult<()> {
        let (text, request) = (text.to_string(), ctx.clone());
        match self
            .call_api(move |api| api.submit_command(&text, &request))
            .await
        {
            Ok(response) => {
                self.gateway
                    .send_text(&ctx.conversation_id, &response.render())
                    .await?;
                self.gateway
                    .send_approval_request(
                        &self.approver_conversation,
                        &response.batch_id,
                        &response.preview,
                    )
                    .await
            }
            Err(e) => self.reply_error(ctx, &e).await,
        }
    }

    /// 处理审批回调 "approve:<id>" / "reject:<id>"
    pub async fn handle_callback(&self, ctx: &RequestContext, data: &str) -> GatewayResult<()> {
        let Some((decision, batch_id)) = ApprovalDecision::parse_action(data) else {
            warn!(data, "无法识别的审批回调");
            return self
                .gateway
                .send_text(&ctx.conversation_id, "Unknown action. Use approve:<batch id> or reject:<batch id>.")
                .await;
        };

        info!(batch_id, actor = %ctx.actor_id, decision = decision.as_str(), "收到审批回调");
        let (id, request) = (batch_id.to_string(), ctx.clone());
        let result = match self
            .call_api(move |api| api.decide(decision, &id, &request))
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.reply_error(ctx, &e).await?;
                // 本次决策触发了超时转换，由此处通知请求人
                if let ApiError::Expired {
                    requester_conversation: Some(conversation),
                    ..
                } = &e
                {
                    self.notify(conversation, &ctx.conversation_id, &expiry_notice(batch_id))
                        .await?;
                }
                return Ok(());
            }
        };

        match result {
            DecisionResult::Approved(outcome) => {
                let report = outcome.render_report();
                self.gateway.send_text(&ctx.conversation_id, &report).await?;
                self.notify_requester(batch_id, &ctx.conversation_id, &report).await
            }
            DecisionResult::Rejected(record) => {
                let text = format!("Batch {} was rejected by {}.", record.batch_id, ctx.display_name);
                self.gateway.send_text(&ctx.conversation_id, &text).await?;
                self.notify(&record.requester.conversation_id, &ctx.conversation_id, &text)
                    .await
            }
        }
    }

    async fn notify_requester(
        &self,
        batch_id: &str,
        decider_conversation: &str,
        text: &str,
    ) -> GatewayResult<()> {
        let id = batch_id.to_string();
        match self.call_api(move |api| api.batch_details(&id)).await {
            Ok(record) => {
                self.notify(&record.requester.conversation_id, decider_conversation, text)
                    .await
            }
            Err(e) => {
                warn!(batch_id, error = %e, "无法定位请求人会话");
                Ok(())
            }
        }
    }

    async fn notify(&self, requester_conversation: &str, decider_conversation: &str, text: &str) -> GatewayResult<()> {
        if requester_conversation == decider_conversation {
            return Ok(());
        }
        self.gateway.send_text(requester_conversation, text).await
    }

    // ==========================================
    // 查询指令
    // ==========================================

    async fn reply_pending(&self, ctx: &RequestContext) -> GatewayResult<()> {
        match self.call_api(|api| api.pending_summary()).await {
            Ok(summary) => {
                self.gateway
                    .send_text(&ctx.conversation_id, &render_summary(&summary))
                    .await
            }
            Err(e) => self.reply_error(ctx, &e).await,
        }
    }

    async fn reply_status(&self, ctx: &RequestContext, batch_id: &str) -> GatewayResult<()> {
        if batch_id.is_empty() {
            return self.reply_error(ctx, &ApiError::InvalidInput("batch id is required".into())).await;
        }
        let id = batch_id.to_string();
        match self.call_api(move |api| api.batch_details(&id)).await {
            Ok(record) => {
                self.gateway
                    .send_text(&ctx.conversation_id, &render_status(&record))
                    .await
            }
            Err(e) => self.reply_error(ctx, &e).await,
        }
    }

    async fn reply_audit(&self, ctx: &RequestContext, batch_id: &str) -> GatewayResult<()> {
        if batch_id.is_empty() {
            return self.reply_error(ctx, &ApiError::InvalidInput("batch id is required".into())).await;
        }
        let id = batch_id.to_string();
        match self.call_api(move |api| api.export_audit_csv(&id)).await {
            Ok(csv) => self.gateway.send_text(&ctx.conversation_id, &csv).await,
            Err(e) => self.reply_error(ctx, &e).await,
        }
    }

    async fn reply_error(&self, ctx: &RequestContext, err: &ApiError) -> GatewayResult<()> {
        debug!(kind = err.kind(), actor = %ctx.actor_id, "请求未完成");
        self.gateway
            .send_text(&ctx.conversation_id, &err.user_message())
            .await
    }

    // ==========================================
    // 超时扫描
    // ==========================================

    /// 执行一次超时扫描
    ///
    /// # 返回
    /// - 本次过期的批次数
    pub async fn sweep_once(&self) -> usize {
        let expired = match self.call_api(|api| api.expire_stale()).await {
            Ok(expired) => expired,
            Err(e) => {
                error!(error = %e, "超时扫描失败");
                return 0;
            }
        };

        let sends = expired.iter().map(|record| {
            let text = expiry_notice(&record.batch_id);
            let conversation = record.requester.conversation_id.clone();
            async move { self.gateway.send_text(&conversation, &text).await }
        });
        for result in join_all(sends).await {
            if let Err(e) = result {
                warn!(error = %e, "过期通知发送失败");
            }
        }

        if let Err(e) = self.call_api(|api| api.purge_consumed()).await {
            error!(error = %e, "终态批次清理失败");
        }
        expired.len()
    }

    /// 启动后台超时扫描任务
    pub fn spawn_expiry_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let expired = self.sweep_once().await;
                if expired > 0 {
                    debug!(expired, "超时扫描完成");
                }
            }
        })
    }
}

// ==========================================
// 文本渲染
// ==========================================

fn expiry_notice(batch_id: &str) -> String {
    format!(
        "Batch {} expired without a decision. Please submit the command again.",
        batch_id
    )
}

fn render_summary(summary: &PendingSummary) -> String {
    if summary.pending_batches == 0 {
        return "No batches are waiting for approval.".to_string();
    }
    let mut out = format!(
        "{} batch(es) pending, {} movement(s): {} receipt(s), {} issue(s), {} adjustment(s)\n",
        summary.pending_batches,
        summary.pending_movements,
        summary.receipts,
        summary.issues,
        summary.adjustments
    );
    if let Some(oldest) = summary.oldest_created_at {
        out.push_str(&format!("Oldest submitted at {}\n", oldest.format("%Y-%m-%d %H:%M UTC")));
    }
    out
}

fn render_status(record: &PendingApproval) -> String {
    let mut out = format!(
        "Batch {}: {} ({} item(s), submitted by {})\n",
        record.batch_id,
        record.status,
        record.movements().len(),
        record.requester.display_name
    );
    if let (Some(by), Some(at)) = (&record.decided_by, record.decided_at) {
        out.push_str(&format!("Decided by {} at {}\n", by, at.format("%Y-%m-%d %H:%M UTC")));
    }
    if let Some(outcome) = &record.outcome {
        out.push_str(&outcome.summary);
        out.push('\n');
    }
    out
}
