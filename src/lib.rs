pub mod agent;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod llm;
pub mod python;
pub mod search;
pub mod trace;

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Result, bail};
use reqwest::Client;

use agent::{AgentOptions, ExecutionPolicy, build_csv_agent, prompt};
use cli::CliArgs;
use config::AppConfig;
use dataset::CsvOptions;
use llm::OpenAiProvider;
use python::PythonSession;
use search::SerpApiClient;
use trace::SessionTrace;

pub async fn run(args: CliArgs) -> Result<()> {
    let config = AppConfig::load_from(args.config.as_deref())?;
    let query = query_from(args.query.clone(), std::io::stdin())?;

    let session = Arc::new(PythonSession::initialize()?);
    let session_id = generate_session_id();
    let trace = SessionTrace::create(&session_id)?;

    let client = Client::new();
    let provider = OpenAiProvider::new(
        client.clone(),
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.openai_base_url.clone(),
    )
    .with_trace(trace.clone());
    let search = SerpApiClient::new(
        client,
        config.serpapi_api_key.clone(),
        config.serpapi_base_url.clone(),
    )
    .with_trace(trace.clone());

    let csv_options = CsvOptions {
        delimiter: args.delimiter,
        encoding: args.encoding.clone(),
    };
    let options = AgentOptions {
        include_preview: Some(!args.no_preview),
        policy: ExecutionPolicy {
            max_iterations: args.max_iterations,
            max_execution_time: args.max_execution_time.map(Duration::from_secs),
            ..ExecutionPolicy::default()
        },
        ..AgentOptions::default()
    };
    let agent = build_csv_agent(
        provider,
        session,
        &args.csv,
        &csv_options,
        search,
        &options,
        Some(trace),
    )?;

    let answer = agent.run(&prompt::wrap_query(&query)).await?;
    println!("{answer}");
    Ok(())
}

fn query_from(arg: Option<String>, mut input: impl Read) -> Result<String> {
    if let Some(query) = arg {
        let query = query.trim();
        if query.is_empty() {
            bail!("Failed to read query: the query argument is empty");
        }
        return Ok(query.to_string());
    }

    let mut buffer = String::new();
    input
        .read_to_string(&mut buffer)
        .map_err(|err| anyhow::anyhow!("Failed to read query from standard input: {err}"))?;
    let query = buffer.trim();
    if query.is_empty() {
        bail!("Failed to read query: standard input was empty");
    }
    Ok(query.to_string())
}

fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis());
    format!("{millis:x}-{:x}", std::process::id())
}
