use anyhow::{Result, anyhow, bail};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;

const TRACE_DIR_NAME: &str = "csvagent/traces";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// The user query entering the agent.
    Query,
    /// The final answer leaving the agent.
    Answer,
    /// A raw model completion.
    Llm,
    ToolIn,
    ToolOut,
    HttpReq,
    HttpRes,
    HttpErr,
}

impl TraceKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Query => "agent.in",
            Self::Answer => "agent.out",
            Self::Llm => "llm.out",
            Self::ToolIn => "tool.in",
            Self::ToolOut => "tool.out",
            Self::HttpReq => "http.req",
            Self::HttpRes => "http.res",
            Self::HttpErr => "http.err",
        }
    }
}

/// Append-only session log. Every run gets one file; writes never fail the
/// program, they degrade to a single stderr warning.
#[derive(Clone, Debug)]
pub struct SessionTrace {
    inner: Arc<TraceInner>,
}

#[derive(Debug)]
struct TraceInner {
    writer: Mutex<BufWriter<File>>,
    file_path: PathBuf,
    write_failed: AtomicBool,
}

impl SessionTrace {
    pub fn create(session_id: &str) -> Result<Self> {
        let trace_dir = resolve_trace_dir_from_env()?;
        Self::create_in_dir(session_id, &trace_dir)
    }

    fn create_in_dir(session_id: &str, trace_dir: &Path) -> Result<Self> {
        fs::create_dir_all(trace_dir).map_err(|err| {
            anyhow!(
                "Failed to create trace directory {}: {err}",
                trace_dir.display()
            )
        })?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_secs());
        let file_name = format!("session-{session_id}-{timestamp}.log");
        let file_path = trace_dir.join(&file_name);
        let file = create_trace_file(&file_path)
            .map_err(|err| anyhow!("Failed to create trace file {}: {err}", file_path.display()))?;

        Ok(Self {
            inner: Arc::new(TraceInner {
                writer: Mutex::new(BufWriter::new(file)),
                file_path,
                write_failed: AtomicBool::new(false),
            }),
        })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn create_in_temp_dir(session_id: &str, trace_dir: &Path) -> Result<Self> {
        Self::create_in_dir(session_id, trace_dir)
    }

    pub fn file_path(&self) -> &Path {
        &self.inner.file_path
    }

    pub fn log(&self, kind: TraceKind, text: &str) {
        self.log_lines(kind, text);
    }

    pub fn log_http_request(&self, method: &str, url: &str, body: &str) {
        self.log_single(TraceKind::HttpReq, &format!("{method} {url}"));
        self.log_lines(TraceKind::HttpReq, body);
    }

    pub fn log_http_response(&self, status: u16, body: &str) {
        self.log_single(TraceKind::HttpRes, &format!("HTTP {status}"));
        self.log_lines(TraceKind::HttpRes, body);
    }

    pub fn log_http_error(&self, message: &str) {
        self.log_single(TraceKind::HttpErr, message);
    }

    fn log_lines(&self, kind: TraceKind, text: &str) {
        if text.is_empty() {
            self.log_single(kind, "<empty>");
            return;
        }

        for line in text.lines() {
            self.log_single(kind, line);
        }
    }

    fn log_single(&self, kind: TraceKind, text: &str) {
        let timestamp = current_timestamp();
        self.write_raw(&format!("[{timestamp}] [{:<9}] {text}\n", kind.as_str()));
    }

    fn write_raw(&self, text: &str) {
        let Ok(mut writer) = self.inner.writer.lock() else {
            self.report_write_failure("failed to acquire trace writer lock");
            return;
        };

        if writer.write_all(text.as_bytes()).is_err() || writer.flush().is_err() {
            self.report_write_failure("failed to write to trace file");
        }
    }

    fn report_write_failure(&self, message: &str) {
        if !self.inner.write_failed.swap(true, Ordering::Relaxed) {
            eprintln!("csvagent trace warning: {message}");
        }
    }
}

#[cfg(unix)]
fn create_trace_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_trace_file(path: &Path) -> std::io::Result<File> {
    File::create(path)
}

fn current_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.millisecond()
    )
}

pub fn resolve_trace_dir_from_env() -> Result<PathBuf> {
    let xdg_state = env::var("XDG_STATE_HOME").ok();
    let home = dirs::home_dir();
    resolve_trace_dir(xdg_state.as_deref(), home.as_deref())
}

fn resolve_trace_dir(xdg_state_home: Option<&str>, home_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(xdg) = xdg_state_home {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve trace path: XDG_STATE_HOME is set but empty");
        }
        return Ok(PathBuf::from(trimmed).join(TRACE_DIR_NAME));
    }

    let home = home_dir
        .ok_or_else(|| anyhow!("Failed to resolve trace path: HOME directory is unavailable"))?;
    Ok(home.join(".local/state").join(TRACE_DIR_NAME))
}
