use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone, PartialEq, Eq)]
#[command(name = "csvagent")]
#[command(
    about = "Ask an LLM agent one question about a CSV file",
    long_about = "Ask an LLM agent one question about a CSV file\n\nThe agent loads the CSV into a pandas dataframe and answers one query using\na Python REPL tool and a web search tool. The query is read from the second\npositional argument, or from standard input when omitted.\n\nConfig file loading:\n  - --config <path> (explicit file, overrides default path discovery)\n  - Default probe path when --config is not provided:\n    1. $XDG_CONFIG_HOME/csvagent/config.toml\n    2. ~/.config/csvagent/config.toml"
)]
pub struct CliArgs {
    /// CSV file to load into the dataframe.
    #[arg(value_name = "CSV", default_value = "pokemon.csv")]
    pub csv: PathBuf,

    /// Question to ask; read from standard input when omitted.
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Load config from this file path instead of the default discovery path.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Leave the dataframe preview out of the prompt.
    #[arg(long)]
    pub no_preview: bool,

    /// Maximum reasoning iterations before the agent stops.
    #[arg(long, value_name = "N", default_value_t = 15)]
    pub max_iterations: usize,

    /// Wall-clock limit in seconds for the whole query.
    #[arg(long, value_name = "SECONDS")]
    pub max_execution_time: Option<u64>,

    /// Field delimiter passed through to the CSV reader.
    #[arg(long, value_name = "CHAR")]
    pub delimiter: Option<char>,

    /// Text encoding passed through to the CSV reader.
    #[arg(long, value_name = "ENCODING")]
    pub encoding: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use clap::Parser;
    use std::path::Path;

    #[test]
    fn parse_defaults() {
        let args = CliArgs::try_parse_from(["csvagent"]).expect("should parse");
        assert_eq!(args.csv, Path::new("pokemon.csv"));
        assert_eq!(args.query, None);
        assert_eq!(args.config, None);
        assert!(!args.no_preview);
        assert_eq!(args.max_iterations, 15);
        assert_eq!(args.max_execution_time, None);
        assert_eq!(args.delimiter, None);
        assert_eq!(args.encoding, None);
    }

    #[test]
    fn parse_positional_csv_and_query() {
        let args = CliArgs::try_parse_from(["csvagent", "data.csv", "how many rows?"])
            .expect("should parse");
        assert_eq!(args.csv, Path::new("data.csv"));
        assert_eq!(args.query.as_deref(), Some("how many rows?"));
    }

    #[test]
    fn parse_flags() {
        let args = CliArgs::try_parse_from([
            "csvagent",
            "data.csv",
            "--config",
            "/tmp/custom.toml",
            "--no-preview",
            "--max-iterations",
            "3",
            "--max-execution-time",
            "30",
            "--delimiter",
            ";",
        ])
        .expect("should parse");
        assert_eq!(args.config.as_deref(), Some(Path::new("/tmp/custom.toml")));
        assert!(args.no_preview);
        assert_eq!(args.max_iterations, 3);
        assert_eq!(args.max_execution_time, Some(30));
        assert_eq!(args.delimiter, Some(';'));
    }
}
