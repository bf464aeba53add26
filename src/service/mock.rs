//! Mock Agent 服务（用于测试，无需远端）
//!
//! 状态保存在内存中并在所有「连接」间共享，行为与远端一致：Agent 跨会话存活，线程各自独立。
//! Run 的状态按脚本逐次推进：每次 get_run 取下一步，脚本耗尽后停留在最后一步；
//! cancel_run 之后该 Run 一律返回 cancelled。所有调用都有计数，便于断言。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::service::{
    AgentRecord, AgentService, CreateAgentRequest, Credential, MessageContent, RequiredAction,
    RunRecord, RunStatus, ServiceConnector, ServiceError, TextContent, ThreadMessage,
    ThreadRecord, ToolCallRequest, ToolOutput,
};

/// 脚本中的一步：普通状态，或一次 requires_action（附带工具调用批次）
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    Status(RunStatus),
    ToolCalls(Vec<ToolCallRequest>),
}

/// 各操作的调用次数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get_agent: usize,
    pub create_agent: usize,
    pub delete_agent: usize,
    pub create_thread: usize,
    pub create_message: usize,
    pub create_run: usize,
    pub get_run: usize,
    pub cancel_run: usize,
    pub submit_tool_outputs: usize,
    pub latest_message: usize,
    pub close: usize,
}

#[derive(Default)]
struct MockState {
    agents: HashMap<String, AgentRecord>,
    script: VecDeque<ScriptedRun>,
    last_step: Option<ScriptedRun>,
    cancelled: HashSet<String>,
    reply: Option<String>,
    user_messages: Vec<String>,
    submitted: Vec<Vec<ToolOutput>>,
    calls: CallCounts,
    fail_create_agent: bool,
    fail_create_thread: bool,
    fail_close: bool,
    fail_delete: bool,
    ignore_cancel: bool,
    create_delay: Duration,
}

/// 脚本化的内存 Agent 服务
#[derive(Default)]
pub struct MockAgentService {
    state: Mutex<MockState>,
    next_id: AtomicUsize,
}

impl MockAgentService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_{n}_{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
    }

    /// 设置 Run 的状态脚本（create_run 之后每次 get_run 依次返回）
    pub fn with_run_script(self, steps: Vec<ScriptedRun>) -> Self {
        self.state().script = steps.into();
        self
    }

    /// Run 完成后线程中最新一条助手消息
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.state().reply = Some(text.into());
        self
    }

    /// create_agent 内部挂起的时长，用于制造并发竞争窗口
    pub fn with_create_delay(self, delay: Duration) -> Self {
        self.state().create_delay = delay;
        self
    }

    pub fn set_fail_create_agent(&self, fail: bool) {
        self.state().fail_create_agent = fail;
    }

    pub fn set_fail_create_thread(&self, fail: bool) {
        self.state().fail_create_thread = fail;
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.state().fail_close = fail;
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.state().fail_delete = fail;
    }

    /// 接受取消请求但 Run 状态不变（模拟远端迟迟不处理取消）
    pub fn set_ignore_cancel(&self, ignore: bool) {
        self.state().ignore_cancel = ignore;
    }

    /// 直接在「远端」删除 Agent（模拟保留期过期等）
    pub fn remove_agent(&self, agent_id: &str) {
        self.state().agents.remove(agent_id);
    }

    pub fn has_agent(&self, agent_id: &str) -> bool {
        self.state().agents.contains_key(agent_id)
    }

    pub fn agent_count(&self) -> usize {
        self.state().agents.len()
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls.clone()
    }

    pub fn submitted(&self) -> Vec<Vec<ToolOutput>> {
        self.state().submitted.clone()
    }

    pub fn user_messages(&self) -> Vec<String> {
        self.state().user_messages.clone()
    }

    fn run_record(thread_id: &str, run_id: &str, agent_id: &str, step: &ScriptedRun) -> RunRecord {
        let (status, required_action) = match step {
            ScriptedRun::Status(status) => (*status, None),
            ScriptedRun::ToolCalls(calls) => (
                RunStatus::RequiresAction,
                Some(RequiredAction::submit_tool_outputs(calls.clone())),
            ),
        };
        RunRecord {
            id: run_id.to_string(),
            thread_id: thread_id.to_string(),
            agent_id: agent_id.to_string(),
            status,
            required_action,
            last_error: None,
        }
    }
}

#[async_trait]
impl AgentService for MockAgentService {
    async fn get_agent(&self, agent_id: &str) -> Result<AgentRecord, ServiceError> {
        let mut state = self.state();
        state.calls.get_agent += 1;
        state
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("agent {agent_id}")))
    }

    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<AgentRecord, ServiceError> {
        let delay = {
            let mut state = self.state();
            state.calls.create_agent += 1;
            if state.fail_create_agent {
                return Err(ServiceError::Http {
                    status: 500,
                    body: "create agent failed".to_string(),
                });
            }
            state.create_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let agent = AgentRecord {
            id: self.next_id("asst"),
            model: request.model.clone(),
            name: request.name.clone(),
            instructions: request.instructions.clone(),
            tools: request.tools.clone(),
        };
        self.state().agents.insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state();
        state.calls.delete_agent += 1;
        if state.fail_delete {
            return Err(ServiceError::Transport("connection reset".to_string()));
        }
        state
            .agents
            .remove(agent_id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("agent {agent_id}")))
    }

    async fn create_thread(&self) -> Result<ThreadRecord, ServiceError> {
        {
            let mut state = self.state();
            state.calls.create_thread += 1;
            if state.fail_create_thread {
                return Err(ServiceError::Http {
                    status: 503,
                    body: "thread service unavailable".to_string(),
                });
            }
        }
        Ok(ThreadRecord {
            id: self.next_id("thread"),
        })
    }

    async fn create_message(&self, _thread_id: &str, content: &str) -> Result<ThreadMessage, ServiceError> {
        {
            let mut state = self.state();
            state.calls.create_message += 1;
            state.user_messages.push(content.to_string());
        }
        Ok(ThreadMessage {
            id: self.next_id("msg"),
            role: "user".to_string(),
            content: vec![MessageContent::Text {
                text: TextContent {
                    value: content.to_string(),
                },
            }],
        })
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<RunRecord, ServiceError> {
        let run_id = self.next_id("run");
        self.state().calls.create_run += 1;
        Ok(Self::run_record(
            thread_id,
            &run_id,
            agent_id,
            &ScriptedRun::Status(RunStatus::Queued),
        ))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunRecord, ServiceError> {
        let mut state = self.state();
        state.calls.get_run += 1;
        if state.cancelled.contains(run_id) {
            return Ok(Self::run_record(
                thread_id,
                run_id,
                "",
                &ScriptedRun::Status(RunStatus::Cancelled),
            ));
        }
        let step = match state.script.pop_front() {
            Some(step) => {
                state.last_step = Some(step.clone());
                step
            }
            None => state
                .last_step
                .clone()
                .unwrap_or(ScriptedRun::Status(RunStatus::Completed)),
        };
        Ok(Self::run_record(thread_id, run_id, "", &step))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<RunRecord, ServiceError> {
        let mut state = self.state();
        state.calls.cancel_run += 1;
        if !state.ignore_cancel {
            state.cancelled.insert(run_id.to_string());
        }
        Ok(Self::run_record(
            thread_id,
            run_id,
            "",
            &ScriptedRun::Status(RunStatus::Cancelling),
        ))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunRecord, ServiceError> {
        let mut state = self.state();
        state.calls.submit_tool_outputs += 1;
        state.submitted.push(outputs.to_vec());
        Ok(Self::run_record(
            thread_id,
            run_id,
            "",
            &ScriptedRun::Status(RunStatus::InProgress),
        ))
    }

    async fn latest_message(&self, _thread_id: &str) -> Result<Option<ThreadMessage>, ServiceError> {
        let mut state = self.state();
        state.calls.latest_message += 1;
        Ok(state.reply.clone().map(|value| ThreadMessage {
            id: "msg_reply".to_string(),
            role: "assistant".to_string(),
            content: vec![MessageContent::Text {
                text: TextContent { value },
            }],
        }))
    }

    async fn close(&self) -> Result<(), ServiceError> {
        let mut state = self.state();
        state.calls.close += 1;
        if state.fail_close {
            return Err(ServiceError::Transport("close failed".to_string()));
        }
        Ok(())
    }
}

/// 每次 connect 都返回同一个共享的 MockAgentService
pub struct MockConnector {
    service: Arc<MockAgentService>,
    connects: AtomicUsize,
    fail: Mutex<bool>,
}

impl MockConnector {
    pub fn new(service: Arc<MockAgentService>) -> Self {
        Self {
            service,
            connects: AtomicUsize::new(0),
            fail: Mutex::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|p| p.into_inner()) = fail;
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceConnector for MockConnector {
    async fn connect(&self, _credential: Arc<Credential>) -> Result<Arc<dyn AgentService>, ServiceError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(ServiceError::Transport("connection refused".to_string()));
        }
        Ok(self.service.clone())
    }
}
