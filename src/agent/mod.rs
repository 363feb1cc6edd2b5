mod builder;
mod executor;
pub mod prompt;
mod template;
mod tools;

pub use builder::{AgentOptions, BuildError, build_csv_agent, build_dataframe_agent};
pub use executor::{
    Agent, AgentStep, EarlyStopping, ExecutionPolicy, FORCE_STOPPED_ANSWER, OutputParseError,
    parse_step,
};
pub use template::{PromptTemplate, TemplateError};
pub use tools::{
    AgentTool, PYTHON_TOOL_NAME, PythonReplTool, SEARCH_TOOL_NAME, SearchTool, ToolSet,
};
