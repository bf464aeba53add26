//! Agent 供给：进程级注册表与 Agent ID 持久化

pub mod registry;
pub mod store;

pub use registry::{AgentProfile, AgentRegistry};
pub use store::{AgentIdRecord, AgentIdStore, FileAgentIdStore, MemoryAgentIdStore, StoreError};
