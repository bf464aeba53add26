//! 核心层：错误类型、Run 编排、会话上下文、优雅关闭

pub mod error;
pub mod run;
pub mod session;
pub mod shutdown;

pub use error::{AssistantError, ToolCallError};
pub use run::{
    Clock, RunOrchestrator, RunOutcome, RunSettings, TokioClock, ERROR_REPLY, INTERRUPTED_REPLY,
    TIMEOUT_REPLY,
};
pub use session::{Session, SessionDeps, SessionHandle};
pub use shutdown::{
    finish_session, AgentTeardown, ShutdownCleanup, ShutdownCoordinator, ShutdownManager,
    ShutdownReason,
};
