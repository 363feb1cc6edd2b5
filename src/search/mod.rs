use std::error::Error;
use std::fmt::{Display, Formatter};

use reqwest::Client;
use serde_json::Value;

use crate::trace::SessionTrace;

/// Fixed engine parameters the search tool has always used.
const SEARCH_ENGINE: &str = "bing";
const SEARCH_COUNTRY: &str = "us";
const SEARCH_LANGUAGE: &str = "en";

const NO_RESULT_ANSWER: &str = "No good search result found";
const ERROR_BODY_PREVIEW_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    MissingApiKey,
    HttpStatus { status: u16, body: String },
    Transport(String),
    Parse(String),
    Api(String),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "missing SERPAPI_API_KEY"),
            Self::HttpStatus { status, body } => {
                write!(f, "search request failed with status {status}: {body}")
            }
            Self::Transport(msg) => write!(f, "search transport error: {msg}"),
            Self::Parse(msg) => write!(f, "search parse error: {msg}"),
            Self::Api(msg) => write!(f, "search API error: {msg}"),
        }
    }
}

impl Error for SearchError {}

pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// SerpAPI client behind the `search` tool. Returns a one-line digest of the
/// response rather than the raw payload.
#[derive(Clone, Debug)]
pub struct SerpApiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    trace: Option<SessionTrace>,
}

impl SerpApiClient {
    /// A missing key is not an error here: it surfaces on the first search
    /// call instead.
    pub fn new(client: Client, api_key: Option<String>, base_url: String) -> Self {
        Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: SessionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/search.json", self.base_url)
    }

    pub async fn run(&self, query: &str) -> SearchResult<String> {
        let Some(api_key) = &self.api_key else {
            return Err(SearchError::MissingApiKey);
        };

        let endpoint = self.endpoint();
        if let Some(trace) = &self.trace {
            trace.log_http_request("GET", &endpoint, query);
        }

        let resp = self
            .client
            .get(&endpoint)
            .query(&[
                ("engine", SEARCH_ENGINE),
                ("q", query),
                ("gl", SEARCH_COUNTRY),
                ("hl", SEARCH_LANGUAGE),
                ("api_key", api_key),
            ])
            .send()
            .await
            .map_err(|err| {
                if let Some(trace) = &self.trace {
                    trace.log_http_error(&err.to_string());
                }
                SearchError::Transport(err.to_string())
            })?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|err| SearchError::Transport(err.to_string()))?;
        if let Some(trace) = &self.trace {
            trace.log_http_response(status, &body);
        }

        if !(200..300).contains(&status) {
            let body = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
            return Err(SearchError::HttpStatus { status, body });
        }

        let value = serde_json::from_str::<Value>(&body)
            .map_err(|err| SearchError::Parse(err.to_string()))?;
        digest(&value)
    }
}

/// Reduces a search response to the single snippet the agent reads: API
/// errors first, then the answer box, the knowledge graph, and the first
/// organic result.
fn digest(value: &Value) -> SearchResult<String> {
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(SearchError::Api(error.to_string()));
    }

    let candidates = [
        "/answer_box/answer",
        "/answer_box/snippet",
        "/knowledge_graph/description",
        "/organic_results/0/snippet",
    ];
    for pointer in candidates {
        if let Some(text) = value.pointer(pointer).and_then(Value::as_str) {
            let text = text.trim();
            if !text.is_empty() {
                return Ok(text.to_string());
            }
        }
    }

    Ok(NO_RESULT_ANSWER.to_string())
}
