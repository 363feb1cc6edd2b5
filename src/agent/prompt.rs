use super::builder::BuildError;
use super::template::PromptTemplate;
use super::tools::ToolSet;

pub const VAR_PREVIEW: &str = "df";
pub const VAR_INPUT: &str = "input";
pub const VAR_SCRATCHPAD: &str = "agent_scratchpad";

pub const PREFIX: &str = "\nYou are working with a pandas dataframe in Python. The name of the dataframe is `df`.\nYou should use the tools below to answer the question posed of you:";

pub const SUFFIX_WITH_PREVIEW: &str = "\nThis is the result of `print(df.head())`:\n{df}\n\nBegin!\nQuestion: {input}\n{agent_scratchpad}";

pub const SUFFIX_NO_PREVIEW: &str = "\nBegin!\nQuestion: {input}\n{agent_scratchpad}";

pub const FORMAT_INSTRUCTIONS: &str = "Use the following format:\n\nQuestion: the input question you must answer\nThought: you should always think about what to do\nAction: the action to take, should be one of [{tool_names}]\nAction Input: the input to the action\nObservation: the result of the action\n... (this Thought/Action/Action Input/Observation can repeat N times)\nThought: I now know the final answer\nFinal Answer: the final answer to the original input question";

/// Instructions prepended to the user question so the model answers with one
/// of the chart/list directives. The directives are never parsed here; they
/// are instructions to the model, consumed by whatever renders the answer.
pub const RENDER_DIRECTIVES: &str = r#"If the query asks for a list of items, respond in this format where words are placed in quotes and numbers are not:
"LIST ["item_1", "item_2", number_1, number_2, etc]"

If the query asks for a line graph between two variables, respond in this format where x and y don't change:
"LINE data={[{x: value_1, y: value_2}, {x: value_3, y: value_4}, etc]}"

If the query asks for a scatter plot between two variables, respond in this format where x and y don't change and size is defaulted to 1,
but if there is a third variable, change the size variable to that value:
"SCATTER data={[{x: value_1, y: value_2, size: 1}, {x: value_3, y: value_4, size: 1}, etc]}"

If the query asks to plot a bar graph, respond in this format where x and y don't change:
"BAR1 data={[{x: "category_1", y: value_1}, {x: "category_2", y: value_2}, etc]}
BAR2 data={[{x: "category_1", y: value_1}, {x: "category_2", y: value_2}, etc]}"
If the query asks to plot a bar graph with multiple categories across two variables, repeat the above format for those categories.

If the query asks to plot a pie chart, respond in this format:
"PIE data={[{angle: value_1}, {angle: value_2}, etc]}"
where each angle is its respective percent of 2 pi radians

Otherwise, answer as needed.

The following is the question: "#;

pub fn wrap_query(user_input: &str) -> String {
    format!("{RENDER_DIRECTIVES}{user_input}")
}

/// Assembles the agent prompt: prefix, tool listing, format instructions and
/// suffix joined by blank lines.
///
/// An explicit suffix requires an explicit variable list and excludes the
/// preview flag; otherwise the flag (default on) picks between the suffix
/// with the `{df}` preview block and the one without.
pub fn create_prompt(
    prefix: &str,
    suffix: Option<&str>,
    input_variables: Option<&[String]>,
    include_preview: Option<bool>,
    tools: &ToolSet,
) -> Result<PromptTemplate, BuildError> {
    let (suffix_text, variables): (&str, Vec<String>) = match (suffix, include_preview) {
        (Some(_), Some(_)) => return Err(BuildError::ConflictingSuffixOptions),
        (Some(text), None) => {
            let Some(variables) = input_variables else {
                return Err(BuildError::MissingInputVariables);
            };
            (text, variables.to_vec())
        }
        (None, flag) => {
            if flag.unwrap_or(true) {
                (
                    SUFFIX_WITH_PREVIEW,
                    vec![
                        VAR_PREVIEW.to_string(),
                        VAR_INPUT.to_string(),
                        VAR_SCRATCHPAD.to_string(),
                    ],
                )
            } else {
                (
                    SUFFIX_NO_PREVIEW,
                    vec![VAR_INPUT.to_string(), VAR_SCRATCHPAD.to_string()],
                )
            }
        }
    };

    let listing = tools.listing_block();
    let format_instructions = FORMAT_INSTRUCTIONS.replace("{tool_names}", &tools.names_joined());
    let template = [prefix, listing.as_str(), format_instructions.as_str(), suffix_text].join("\n\n");
    let variable_refs: Vec<&str> = variables.iter().map(String::as_str).collect();

    PromptTemplate::new(template, &variable_refs).map_err(BuildError::Template)
}
