//! Stockdesk - 基于远程 Agent 服务的纳斯达克行情助手
//!
//! 模块划分：
//! - **agent**: 进程级 Agent 注册表与 Agent ID 持久化
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **console**: 行式控制台前端
//! - **core**: 错误类型、Run 编排、会话上下文、优雅关闭
//! - **observability**: 日志初始化
//! - **service**: 远程 Agent 服务抽象、HTTP 实现、Mock 与凭据
//! - **tools**: 工具注册表、调用分发与行情工具

pub mod agent;
pub mod config;
pub mod console;
pub mod core;
pub mod observability;
pub mod service;
pub mod tools;
