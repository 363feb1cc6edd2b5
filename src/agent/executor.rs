use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use anyhow::Result;
use regex::Regex;

use super::prompt::{VAR_INPUT, VAR_SCRATCHPAD};
use super::template::PromptTemplate;
use super::tools::ToolSet;
use crate::llm::{CompletionInput, LlmProvider};
use crate::trace::{SessionTrace, TraceKind};

/// Best-effort answer returned when the loop is stopped by a limit under the
/// `force` method.
pub const FORCE_STOPPED_ANSWER: &str = "Agent stopped due to iteration limit or time limit.";

const FINAL_ANSWER_MARKER: &str = "Final Answer:";
const OBSERVATION_STOP: &str = "\nObservation:";
const GENERATE_FINAL_NUDGE: &str =
    "\n\nI now need to return a final answer based on the previous steps:";

static ACTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
        .expect("valid action pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParseError(pub String);

impl Display for OutputParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Could not parse LLM output: `{}`", self.0)
    }
}

impl Error for OutputParseError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    FinalAnswer(String),
    ToolCall { name: String, input: String },
}

/// Reads one raw completion into the next step. A final answer wins over an
/// action when both are present.
pub fn parse_step(text: &str) -> Result<AgentStep, OutputParseError> {
    if let Some(index) = text.find(FINAL_ANSWER_MARKER) {
        let answer = text[index + FINAL_ANSWER_MARKER.len()..].trim();
        return Ok(AgentStep::FinalAnswer(answer.to_string()));
    }

    let captures = ACTION_PATTERN
        .captures(text)
        .ok_or_else(|| OutputParseError(text.to_string()))?;
    Ok(AgentStep::ToolCall {
        name: captures[1].trim().trim_matches('"').to_string(),
        input: captures[2].trim().trim_matches('"').to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EarlyStopping {
    /// Stop and return the best-effort canned answer.
    #[default]
    Force,
    /// Stop and ask the model for a final answer without tool access.
    Generate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub max_iterations: usize,
    pub max_execution_time: Option<Duration>,
    pub early_stopping: EarlyStopping,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_execution_time: None,
            early_stopping: EarlyStopping::default(),
        }
    }
}

/// A built agent: prompt template with the preview already bound, an LLM
/// handle, the fixed tool pair, and the execution policy. Immutable once
/// built; one `run` call per query.
#[derive(Debug)]
pub struct Agent<P> {
    template: PromptTemplate,
    provider: P,
    tools: ToolSet,
    policy: ExecutionPolicy,
    trace: Option<SessionTrace>,
}

impl<P: LlmProvider> Agent<P> {
    pub(crate) fn new(
        template: PromptTemplate,
        provider: P,
        tools: ToolSet,
        policy: ExecutionPolicy,
        trace: Option<SessionTrace>,
    ) -> Self {
        Self {
            template,
            provider,
            tools,
            policy,
            trace,
        }
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Runs the reasoning loop for one query until a final answer, a parse
    /// or service error, or an execution limit.
    pub async fn run(&self, query: &str) -> Result<String> {
        self.log(TraceKind::Query, query);
        let started = Instant::now();
        let mut scratchpad = String::new();
        let mut iterations = 0;

        while self.should_continue(iterations, started) {
            iterations += 1;

            let text = self
                .complete(query, &scratchpad, &[OBSERVATION_STOP.to_string()])
                .await?;
            self.log(TraceKind::Llm, &text);

            match parse_step(&text)? {
                AgentStep::FinalAnswer(answer) => {
                    self.log(TraceKind::Answer, &answer);
                    return Ok(answer);
                }
                AgentStep::ToolCall { name, input } => {
                    self.log(TraceKind::ToolIn, &format!("{name}: {input}"));
                    let observation = match self.tools.find(&name) {
                        Some(tool) => tool.invoke(&input).await?,
                        None => format!("{name} is not a valid tool, try another one."),
                    };
                    self.log(TraceKind::ToolOut, &observation);

                    scratchpad.push_str(&text);
                    scratchpad.push_str("\nObservation: ");
                    scratchpad.push_str(&observation);
                    scratchpad.push_str("\nThought: ");
                }
            }
        }

        let answer = self.stop_early(query, &scratchpad).await?;
        self.log(TraceKind::Answer, &answer);
        Ok(answer)
    }

    fn should_continue(&self, iterations: usize, started: Instant) -> bool {
        if iterations >= self.policy.max_iterations {
            return false;
        }
        match self.policy.max_execution_time {
            Some(limit) => started.elapsed() < limit,
            None => true,
        }
    }

    async fn stop_early(&self, query: &str, scratchpad: &str) -> Result<String> {
        match self.policy.early_stopping {
            EarlyStopping::Force => Ok(FORCE_STOPPED_ANSWER.to_string()),
            EarlyStopping::Generate => {
                let mut final_pad = scratchpad.to_string();
                final_pad.push_str(GENERATE_FINAL_NUDGE);
                let text = self.complete(query, &final_pad, &[]).await?;
                self.log(TraceKind::Llm, &text);
                match parse_step(&text) {
                    Ok(AgentStep::FinalAnswer(answer)) => Ok(answer),
                    _ => Ok(text),
                }
            }
        }
    }

    async fn complete(&self, query: &str, scratchpad: &str, stop: &[String]) -> Result<String> {
        let prompt = self
            .template
            .render(&[(VAR_INPUT, query), (VAR_SCRATCHPAD, scratchpad)])?;
        let output = self
            .provider
            .complete(CompletionInput {
                prompt,
                stop: stop.to_vec(),
            })
            .await?;
        Ok(output.text)
    }

    fn log(&self, kind: TraceKind, text: &str) {
        if let Some(trace) = &self.trace {
            trace.log(kind, text);
        }
    }
}
