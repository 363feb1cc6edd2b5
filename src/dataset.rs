use anyhow::{Result, anyhow};
use std::path::Path;
use std::sync::Arc;

use crate::python::{CsvShape, DataframeCheck, PythonSession};

/// Global name the dataframe is bound to inside the interpreter. The REPL
/// tool and the prompt both refer to it by this name.
pub const DATAFRAME_GLOBAL: &str = "df";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: Option<char>,
    pub encoding: Option<String>,
}

/// Handle over a dataframe living inside the interpreter session. The frame
/// itself is never copied out; the handle carries only the global name.
pub struct Dataset {
    session: Arc<PythonSession>,
    name: String,
    shape: Option<CsvShape>,
}

impl Dataset {
    pub fn from_csv(
        session: Arc<PythonSession>,
        path: &Path,
        options: &CsvOptions,
    ) -> Result<Self> {
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("Failed to load CSV: path is not valid UTF-8"))?;
        let delimiter = options.delimiter.map(|c| c.to_string());
        let shape = session.load_csv(
            DATAFRAME_GLOBAL,
            path,
            delimiter.as_deref(),
            options.encoding.as_deref(),
        )?;

        Ok(Self {
            session,
            name: DATAFRAME_GLOBAL.to_string(),
            shape: Some(shape),
        })
    }

    /// Wraps an interpreter global that is expected to hold a dataframe.
    /// Nothing is validated here; the agent builder checks tabularity before
    /// anything else happens.
    pub fn from_global(session: Arc<PythonSession>, name: impl Into<String>) -> Self {
        Self {
            session,
            name: name.into(),
            shape: None,
        }
    }

    pub fn session(&self) -> &Arc<PythonSession> {
        &self.session
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> Option<CsvShape> {
        self.shape
    }

    pub fn check(&self) -> Result<DataframeCheck> {
        self.session.dataframe_check(&self.name)
    }

    /// Markdown rendering of the head rows, interpolated into the prompt.
    pub fn preview(&self) -> Result<String> {
        self.session.head_markdown(&self.name)
    }
}
