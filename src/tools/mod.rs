//! 工具箱：注册表、带超时与审计的执行器、Python 代码执行

pub mod code_execution;
pub mod executor;
pub mod registry;
pub mod schema;

pub use code_execution::{LocalCommandLineExecutor, PythonCodeExecutionTool};
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolEntry, ToolRegistry};
pub use schema::tool_call_schema_json;
