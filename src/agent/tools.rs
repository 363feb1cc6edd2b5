use std::sync::Arc;

use anyhow::Result;

use super::builder::BuildError;
use crate::dataset::Dataset;
use crate::python::{PythonSession, ReplOutcome};
use crate::search::SerpApiClient;

pub const PYTHON_TOOL_NAME: &str = "python_repl_ast";
pub const SEARCH_TOOL_NAME: &str = "search";

const PYTHON_TOOL_DESCRIPTION: &str = "A Python shell. Use this to execute python commands. Input should be a valid python command. When using this tool, sometimes output is abbreviated - make sure it does not look abbreviated before using it in your answer.";
const SEARCH_TOOL_DESCRIPTION: &str = "search google";

/// Expression evaluation against the interpreter session holding the
/// dataframe. Exceptions raised by the submitted code come back as the
/// observation text, so the model can read and react to them.
#[derive(Debug)]
pub struct PythonReplTool {
    session: Arc<PythonSession>,
}

impl PythonReplTool {
    pub fn new(dataset: &Dataset) -> Self {
        Self {
            session: Arc::clone(dataset.session()),
        }
    }

    fn invoke(&self, input: &str) -> Result<String> {
        match self.session.run_ast(input)? {
            ReplOutcome::Completed { value, stdout } => {
                let mut observation = stdout;
                observation.push_str(&value);
                Ok(observation)
            }
            ReplOutcome::Failed { exception, .. } => {
                Ok(format!("{}: {}", exception.exc_type, exception.message))
            }
        }
    }
}

/// Web search through the SerpAPI backend.
#[derive(Debug)]
pub struct SearchTool {
    client: SerpApiClient,
}

impl SearchTool {
    pub fn new(client: SerpApiClient) -> Self {
        Self { client }
    }

    async fn invoke(&self, input: &str) -> Result<String> {
        Ok(self.client.run(input).await?)
    }
}

/// The closed set of tools an agent can carry. This is a fixed list, not a
/// plugin registry.
#[derive(Debug)]
pub enum AgentTool {
    PythonRepl(PythonReplTool),
    Search(SearchTool),
}

impl AgentTool {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PythonRepl(_) => PYTHON_TOOL_NAME,
            Self::Search(_) => SEARCH_TOOL_NAME,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::PythonRepl(_) => PYTHON_TOOL_DESCRIPTION,
            Self::Search(_) => SEARCH_TOOL_DESCRIPTION,
        }
    }

    pub async fn invoke(&self, input: &str) -> Result<String> {
        match self {
            Self::PythonRepl(tool) => tool.invoke(input),
            Self::Search(tool) => tool.invoke(input).await,
        }
    }
}

/// Tool list in registration order. Tool identity is its name, so duplicate
/// names are rejected at construction.
#[derive(Debug)]
pub struct ToolSet {
    tools: Vec<AgentTool>,
}

impl ToolSet {
    pub fn new(tools: Vec<AgentTool>) -> Result<Self, BuildError> {
        for (index, tool) in tools.iter().enumerate() {
            if tools[..index].iter().any(|seen| seen.name() == tool.name()) {
                return Err(BuildError::DuplicateToolName {
                    name: tool.name().to_string(),
                });
            }
        }
        Ok(Self { tools })
    }

    /// The fixed pair every agent gets: the dataframe REPL and web search.
    pub fn standard(dataset: &Dataset, search: SerpApiClient) -> Self {
        Self {
            tools: vec![
                AgentTool::PythonRepl(PythonReplTool::new(dataset)),
                AgentTool::Search(SearchTool::new(search)),
            ],
        }
    }

    pub fn find(&self, name: &str) -> Option<&AgentTool> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    /// One `name: description` line per tool, in registration order.
    pub fn listing_block(&self) -> String {
        self.tools
            .iter()
            .map(|tool| format!("{}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn names_joined(&self) -> String {
        self.tools
            .iter()
            .map(AgentTool::name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
