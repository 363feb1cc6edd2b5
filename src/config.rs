use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo-instruct";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_SERPAPI_BASE_URL: &str = "https://serpapi.com";

const CONFIG_DIR_NAME: &str = "csvagent";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Process configuration, built once at startup and passed down explicitly.
/// Environment variables override the config file; `.env` fills in whatever
/// the real environment leaves unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub serpapi_api_key: Option<String>,
    pub serpapi_base_url: String,
    /// Path override for a local model. Loaded for parity with the original
    /// deployment but not consumed by the active code path.
    pub local_model_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileConfig {
    openai_api_key: Option<String>,
    openai_model: Option<String>,
    openai_base_url: Option<String>,
    serpapi_api_key: Option<String>,
    serpapi_base_url: Option<String>,
    local_model_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    pub fn load_from(explicit_path: Option<&Path>) -> Result<Self> {
        let raw = match explicit_path {
            Some(path) => {
                if !path.is_file() {
                    bail!("Failed to load config {}: file not found", path.display());
                }
                load_file_config(path)?.unwrap_or_default()
            }
            None => {
                let config_path = discover_config_path()?;
                load_file_config(&config_path)?.unwrap_or_default()
            }
        };

        dotenvy::dotenv().ok();

        Ok(Self {
            openai_api_key: env_non_empty("OPENAI_API_KEY").or_else(|| trimmed(raw.openai_api_key)),
            openai_model: env_non_empty("OPENAI_MODEL")
                .or_else(|| trimmed(raw.openai_model))
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: env_non_empty("OPENAI_BASE_URL")
                .or_else(|| trimmed(raw.openai_base_url))
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            serpapi_api_key: env_non_empty("SERPAPI_API_KEY")
                .or_else(|| trimmed(raw.serpapi_api_key)),
            serpapi_base_url: env_non_empty("SERPAPI_BASE_URL")
                .or_else(|| trimmed(raw.serpapi_base_url))
                .unwrap_or_else(|| DEFAULT_SERPAPI_BASE_URL.to_string()),
            local_model_path: env_non_empty("MODEL_PATH")
                .map(PathBuf::from)
                .or(raw.local_model_path),
        })
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve config path: XDG_CONFIG_HOME is set but empty");
        }

        return Ok(PathBuf::from(trimmed)
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME));
    }

    let home = dirs::home_dir().ok_or_else(|| {
        anyhow!("Failed to resolve config path: HOME directory is unavailable")
    })?;

    Ok(home
        .join(".config")
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

fn load_file_config(config_path: &Path) -> Result<Option<RawFileConfig>> {
    if !config_path.is_file() {
        return Ok(None);
    }

    let config_text = fs::read_to_string(config_path).map_err(|err| {
        anyhow!(
            "Failed to load config {}: unable to read file: {err}",
            config_path.display()
        )
    })?;

    toml::from_str(&config_text)
        .map(Some)
        .map_err(|err| anyhow!("Failed to load config {}: {err}", config_path.display()))
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| trimmed(Some(value)))
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL, DEFAULT_SERPAPI_BASE_URL};
    use serial_test::serial;
    use std::env;
    use std::fs;
    use std::path::{Path, PathBuf};

    fn reset_vars() {
        unsafe {
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("OPENAI_MODEL");
            env::remove_var("OPENAI_BASE_URL");
            env::remove_var("SERPAPI_API_KEY");
            env::remove_var("SERPAPI_BASE_URL");
            env::remove_var("MODEL_PATH");
            env::remove_var("XDG_CONFIG_HOME");
        }
    }

    fn with_cwd<T>(path: &Path, f: impl FnOnce() -> T) -> T {
        let cwd = env::current_dir().expect("current dir");
        env::set_current_dir(path).expect("set current dir");
        let result = f();
        env::set_current_dir(cwd).expect("restore current dir");
        result
    }

    #[test]
    #[serial]
    fn load_uses_defaults_when_unset() {
        let tmp = tempfile::tempdir().expect("tempdir");
        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load().expect("load config"));
        assert_eq!(cfg.openai_api_key, None);
        assert_eq!(cfg.openai_model, DEFAULT_OPENAI_MODEL);
        assert_eq!(cfg.openai_base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(cfg.serpapi_api_key, None);
        assert_eq!(cfg.serpapi_base_url, DEFAULT_SERPAPI_BASE_URL);
        assert_eq!(cfg.local_model_path, None);
    }

    #[test]
    #[serial]
    fn load_env_overrides_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config_dir = tmp.path().join("csvagent");
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(
            config_dir.join("config.toml"),
            r#"
openai_api_key = "file_key"
openai_model = "file_model"
serpapi_api_key = "file_serp_key"
"#,
        )
        .expect("write config");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
            env::set_var("OPENAI_API_KEY", "os_key");
            env::set_var("OPENAI_MODEL", "os_model");
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load().expect("load config"));
        assert_eq!(cfg.openai_api_key.as_deref(), Some("os_key"));
        assert_eq!(cfg.openai_model, "os_model");
        assert_eq!(cfg.serpapi_api_key.as_deref(), Some("file_serp_key"));
    }

    #[test]
    #[serial]
    fn load_does_not_override_existing_os_env_with_dotenv() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(
            tmp.path().join(".env"),
            "OPENAI_API_KEY=dotenv_key\nOPENAI_MODEL=dotenv_model\n",
        )
        .expect("write env file");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
            env::set_var("OPENAI_API_KEY", "os_key");
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load().expect("load config"));
        assert_eq!(cfg.openai_api_key.as_deref(), Some("os_key"));
        assert_eq!(cfg.openai_model, "dotenv_model");
    }

    #[test]
    #[serial]
    fn load_uses_xdg_config_path_when_set() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config_dir = tmp.path().join("csvagent");
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(
            config_dir.join("config.toml"),
            r#"openai_model = "from_file""#,
        )
        .expect("write config");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load().expect("load config"));
        assert_eq!(cfg.openai_model, "from_file");
    }

    #[test]
    #[serial]
    fn load_fails_when_xdg_config_home_is_empty() {
        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", "   ");
        }

        let err = AppConfig::load().expect_err("load should fail");
        assert!(
            err.to_string()
                .contains("Failed to resolve config path: XDG_CONFIG_HOME is set but empty")
        );
    }

    #[test]
    #[serial]
    fn load_fails_on_unknown_root_key() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config_dir = tmp.path().join("csvagent");
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(config_dir.join("config.toml"), "unknown_key = 1").expect("write config");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let err = with_cwd(tmp.path(), || AppConfig::load().expect_err("load should fail"));
        assert!(err.to_string().contains("Failed to load config"));
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    #[serial]
    fn load_from_explicit_path_reads_that_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config_path = tmp.path().join("custom.toml");
        fs::write(&config_path, r#"openai_model = "explicit_model""#).expect("write config");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let cfg = with_cwd(tmp.path(), || {
            AppConfig::load_from(Some(&config_path)).expect("load config")
        });
        assert_eq!(cfg.openai_model, "explicit_model");
    }

    #[test]
    #[serial]
    fn load_from_missing_explicit_path_fails() {
        let tmp = tempfile::tempdir().expect("tempdir");
        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let missing = tmp.path().join("nope.toml");
        let err = AppConfig::load_from(Some(&missing)).expect_err("load should fail");
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    #[serial]
    fn model_path_env_is_carried_but_optional() {
        let tmp = tempfile::tempdir().expect("tempdir");
        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
            env::set_var("MODEL_PATH", "/models/ggml-gpt4all.bin");
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load().expect("load config"));
        assert_eq!(
            cfg.local_model_path,
            Some(PathBuf::from("/models/ggml-gpt4all.bin"))
        );
    }
}
