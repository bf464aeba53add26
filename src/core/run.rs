//! Run 编排：从创建到终态驱动一次 Run
//!
//! 状态机：queued → in_progress → {requires_action ⇄ in_progress} → {completed | failed | cancelled | expired}。
//! 固定间隔轮询（不做指数退避）；requires_action 时调用 ToolDispatcher 并提交输出。
//! 超时从 Run 创建后开始计时，到点发出一次取消请求后立即返回，不等待远端确认。
//! 本层不向上抛错：任何结果都折叠为 RunOutcome，再由 into_reply 转为给用户的文本。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RunSection;
use crate::core::AssistantError;
use crate::service::{AgentService, RequiredAction, RunRecord, RunStatus, ServiceError};
use crate::tools::ToolDispatcher;

pub const TIMEOUT_REPLY: &str = "Request timed out. Please try again.";
pub const ERROR_REPLY: &str = "Sorry, I encountered an error processing your request.";
pub const INTERRUPTED_REPLY: &str = "Request cancelled.";

/// 时钟抽象：轮询循环的计时与休眠都经过它，测试可配合 Tokio 暂停时间确定性推进
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// 默认时钟：tokio::time
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 单条消息的超时与轮询间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl RunSettings {
    pub fn from_config(section: &RunSection) -> Result<Self, AssistantError> {
        if section.poll_interval_ms == 0 {
            return Err(AssistantError::ConfigError(
                "run.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if section.timeout_secs == 0 {
            return Err(AssistantError::ConfigError(
                "run.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            timeout: Duration::from_secs(section.timeout_secs),
            poll_interval: Duration::from_millis(section.poll_interval_ms),
        })
    }

    /// 轮询次数上限：超时内最多能轮询的次数再留两次余量，时钟不前进时也能终止
    fn max_polls(&self) -> u64 {
        let interval = self.poll_interval.as_millis().max(1);
        (self.timeout.as_millis() / interval) as u64 + 2
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// 一次 Run 的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// 完成，携带线程最新消息的文本
    Completed(String),
    /// 超时，已发出取消请求
    TimedOut,
    /// 以非 completed 的终态结束
    Ended(RunStatus),
    /// 调用方中断（进程退出等），已发出取消请求
    Interrupted,
    /// 远端调用失败等异常
    Failed(String),
}

impl RunOutcome {
    /// 转为展示给用户的文本
    pub fn into_reply(self) -> String {
        match self {
            RunOutcome::Completed(text) => text,
            RunOutcome::TimedOut => TIMEOUT_REPLY.to_string(),
            RunOutcome::Ended(status) => {
                format!("Sorry, I encountered an issue. Run status: {status}")
            }
            RunOutcome::Failed(_) => ERROR_REPLY.to_string(),
            RunOutcome::Interrupted => INTERRUPTED_REPLY.to_string(),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed(_) => f.write_str("completed"),
            RunOutcome::TimedOut => f.write_str("timed out"),
            RunOutcome::Ended(status) => write!(f, "ended with status {status}"),
            RunOutcome::Failed(e) => write!(f, "failed: {e}"),
            RunOutcome::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Run 编排器：进程内共享，不持有会话状态
pub struct RunOrchestrator {
    dispatcher: ToolDispatcher,
    settings: RunSettings,
    clock: Arc<dyn Clock>,
}

impl RunOrchestrator {
    pub fn new(dispatcher: ToolDispatcher, settings: RunSettings) -> Self {
        Self {
            dispatcher,
            settings,
            clock: Arc::new(TokioClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 向线程追加用户消息，创建 Run 并轮询到终态。
    ///
    /// 同一线程上不得并发调用：上一个 Run 仍在进行时远端会拒绝新消息。
    pub async fn process_message(
        &self,
        service: &dyn AgentService,
        thread_id: &str,
        agent_id: &str,
        content: &str,
    ) -> RunOutcome {
        self.process_message_until(service, thread_id, agent_id, content, &CancellationToken::new())
            .await
    }

    /// 同 process_message；`interrupt` 被取消时对 Run 发出一次取消并返回 Interrupted
    pub async fn process_message_until(
        &self,
        service: &dyn AgentService,
        thread_id: &str,
        agent_id: &str,
        content: &str,
        interrupt: &CancellationToken,
    ) -> RunOutcome {
        match self
            .drive(service, thread_id, agent_id, content, interrupt)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(thread_id, "Error processing message: {}", e);
                RunOutcome::Failed(e.to_string())
            }
        }
    }

    async fn drive(
        &self,
        service: &dyn AgentService,
        thread_id: &str,
        agent_id: &str,
        content: &str,
        interrupt: &CancellationToken,
    ) -> Result<RunOutcome, ServiceError> {
        service.create_message(thread_id, content).await?;
        let mut run = service.create_run(thread_id, agent_id).await?;
        tracing::info!(run_id = %run.id, thread_id, "Created run");

        let started = self.clock.now();
        let max_polls = self.settings.max_polls();
        let mut polls: u64 = 0;
        // 每个 Run 至多发出一次取消
        let mut cancel_requested = false;

        while run.status.is_active() {
            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= self.settings.timeout || polls >= max_polls {
                tracing::warn!(
                    run_id = %run.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Run timed out after {}s",
                    self.settings.timeout.as_secs()
                );
                self.request_cancel(service, thread_id, &run.id, &mut cancel_requested)
                    .await;
                return Ok(RunOutcome::TimedOut);
            }

            let interrupted = tokio::select! {
                biased;
                _ = interrupt.cancelled() => true,
                _ = self.clock.sleep(self.settings.poll_interval) => false,
            };
            if interrupted {
                tracing::warn!(run_id = %run.id, "Run interrupted before reaching a terminal status");
                self.request_cancel(service, thread_id, &run.id, &mut cancel_requested)
                    .await;
                return Ok(RunOutcome::Interrupted);
            }
            polls += 1;

            run = service.get_run(thread_id, &run.id).await?;
            tracing::debug!(run_id = %run.id, status = %run.status, poll = polls, "Polled run");

            if run.status == RunStatus::RequiresAction {
                self.handle_required_action(service, thread_id, &run, &mut cancel_requested)
                    .await?;
            }
        }

        if run.status == RunStatus::Completed {
            let reply = service.latest_message(thread_id).await?;
            return Ok(match reply {
                Some(message) => {
                    if message.role != "assistant" {
                        tracing::warn!(role = %message.role, "Latest message is not from the assistant");
                    }
                    RunOutcome::Completed(message.text())
                }
                None => RunOutcome::Failed("run completed without any message".to_string()),
            });
        }

        match &run.last_error {
            Some(err) => tracing::error!(
                run_id = %run.id,
                code = %err.code,
                "Run ended with unexpected status: {} ({})",
                run.status,
                err.message
            ),
            None => tracing::error!(run_id = %run.id, "Run ended with unexpected status: {}", run.status),
        }
        Ok(RunOutcome::Ended(run.status))
    }

    /// 处理 requires_action：空批次取消 Run；否则分发工具并提交输出
    async fn handle_required_action(
        &self,
        service: &dyn AgentService,
        thread_id: &str,
        run: &RunRecord,
        cancel_requested: &mut bool,
    ) -> Result<(), ServiceError> {
        let calls = match run.required_action.as_ref().and_then(RequiredAction::tool_calls) {
            Some(calls) => calls,
            None => {
                tracing::warn!(run_id = %run.id, "Unsupported required action, continuing to poll");
                return Ok(());
            }
        };

        if calls.is_empty() {
            if !*cancel_requested {
                tracing::error!(run_id = %run.id, "No tool calls provided - cancelling run");
                service.cancel_run(thread_id, &run.id).await?;
                *cancel_requested = true;
            }
            return Ok(());
        }

        let outputs = self.dispatcher.dispatch(calls).await;
        if outputs.is_empty() {
            tracing::warn!(run_id = %run.id, calls = calls.len(), "No tool outputs to submit");
            return Ok(());
        }
        tracing::info!(run_id = %run.id, calls = calls.len(), outputs = outputs.len(), "Submitting tool outputs");
        service
            .submit_tool_outputs(thread_id, &run.id, &outputs)
            .await?;
        Ok(())
    }

    /// 尽力而为的取消：失败只记日志，不等待远端确认
    async fn request_cancel(
        &self,
        service: &dyn AgentService,
        thread_id: &str,
        run_id: &str,
        cancel_requested: &mut bool,
    ) {
        if *cancel_requested {
            return;
        }
        *cancel_requested = true;
        if let Err(e) = service.cancel_run(thread_id, run_id).await {
            tracing::warn!(run_id, "Cancel request failed: {}", e);
        }
    }
}
