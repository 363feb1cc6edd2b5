use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use super::executor::{Agent, ExecutionPolicy};
use super::prompt;
use super::template::TemplateError;
use super::tools::ToolSet;
use crate::dataset::{CsvOptions, Dataset};
use crate::llm::LlmProvider;
use crate::python::{DataframeCheck, PythonSession};
use crate::search::SerpApiClient;
use crate::trace::SessionTrace;

/// Construction-time validation failures. Anything past these is a runtime
/// error from one of the delegated services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    NotTabular { type_name: String },
    PandasMissing,
    ConflictingSuffixOptions,
    MissingInputVariables,
    DuplicateToolName { name: String },
    Template(TemplateError),
    Dataset(String),
    Preview(String),
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotTabular { type_name } => {
                write!(f, "Expected pandas object, got {type_name}")
            }
            Self::PandasMissing => {
                write!(
                    f,
                    "pandas package not found, please install with `pip install pandas`"
                )
            }
            Self::ConflictingSuffixOptions => {
                write!(
                    f,
                    "If an explicit suffix is specified, the dataset preview flag must not be"
                )
            }
            Self::MissingInputVariables => {
                write!(f, "An explicit suffix requires an explicit variable list")
            }
            Self::DuplicateToolName { name } => {
                write!(f, "duplicate tool name: {name}")
            }
            Self::Template(err) => write!(f, "invalid prompt template: {err}"),
            Self::Dataset(msg) => write!(f, "dataset check failed: {msg}"),
            Self::Preview(msg) => write!(f, "dataset preview failed: {msg}"),
        }
    }
}

impl Error for BuildError {}

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub input_variables: Option<Vec<String>>,
    pub include_preview: Option<bool>,
    pub policy: ExecutionPolicy,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            suffix: None,
            input_variables: None,
            include_preview: Some(true),
            policy: ExecutionPolicy::default(),
        }
    }
}

/// Builds an agent over an already-loaded dataframe: validates the dataset,
/// assembles the prompt, binds the preview, and fixes the tool pair. No
/// network or LLM call happens here.
pub fn build_dataframe_agent<P: LlmProvider>(
    provider: P,
    dataset: &Dataset,
    search: SerpApiClient,
    options: &AgentOptions,
    trace: Option<SessionTrace>,
) -> Result<Agent<P>, BuildError> {
    match dataset
        .check()
        .map_err(|err| BuildError::Dataset(err.to_string()))?
    {
        DataframeCheck::Tabular => {}
        DataframeCheck::NotTabular { type_name } => {
            return Err(BuildError::NotTabular { type_name });
        }
        DataframeCheck::PandasMissing => return Err(BuildError::PandasMissing),
    }

    let tools = ToolSet::standard(dataset, search);
    let prefix = options.prefix.as_deref().unwrap_or(prompt::PREFIX);
    let mut template = prompt::create_prompt(
        prefix,
        options.suffix.as_deref(),
        options.input_variables.as_deref(),
        options.include_preview,
        &tools,
    )?;

    if template.requires(prompt::VAR_PREVIEW) {
        let preview = dataset
            .preview()
            .map_err(|err| BuildError::Preview(err.to_string()))?;
        template = template
            .partial(prompt::VAR_PREVIEW, &preview)
            .map_err(BuildError::Template)?;
    }

    Ok(Agent::new(template, provider, tools, options.policy, trace))
}

/// Loads the CSV into the interpreter, then builds the dataframe agent over
/// it.
pub fn build_csv_agent<P: LlmProvider>(
    provider: P,
    session: Arc<PythonSession>,
    path: &Path,
    csv_options: &CsvOptions,
    search: SerpApiClient,
    options: &AgentOptions,
    trace: Option<SessionTrace>,
) -> Result<Agent<P>> {
    let dataset = Dataset::from_csv(session, path, csv_options)?;
    Ok(build_dataframe_agent(provider, &dataset, search, options, trace)?)
}
