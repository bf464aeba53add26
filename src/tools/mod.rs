//! 工具层：Tool 接口、注册表、调用分发与行情工具

pub mod dispatcher;
pub mod registry;
pub mod schema;
pub mod stock;

pub use dispatcher::{FailedCallPolicy, ToolDispatcher};
pub use registry::{Tool, ToolRegistry};
pub use schema::parameters_schema;
pub use stock::{stock_registry, HistoricalEodTool, NewsTool, QuoteTool, StockDataApi};
