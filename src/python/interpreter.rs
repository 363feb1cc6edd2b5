use anyhow::{Result, anyhow};
use pyo3::prelude::*;
use pyo3::types::{PyAnyMethods, PyDict, PyDictMethods, PyModule, PyModuleMethods};
use std::ffi::CString;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub exc_type: String,
    pub message: String,
    pub traceback: String,
}

/// Shape of a freshly loaded CSV, as reported by pandas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvShape {
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataframeCheck {
    Tabular,
    NotTabular { type_name: String },
    PandasMissing,
}

/// Result of one REPL execution. Exceptions raised by the submitted code are
/// a normal outcome here, not an error: the agent receives them as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplOutcome {
    Completed {
        value: String,
        stdout: String,
    },
    Failed {
        stdout: String,
        exception: ExceptionInfo,
    },
}

/// Embedded CPython session scoped to `__main__`. Globals persist for the
/// lifetime of the session, so the loaded dataframe stays visible to every
/// subsequent REPL call.
#[derive(Debug)]
pub struct PythonSession {
    main_module: Py<PyModule>,
}

impl PythonSession {
    pub fn initialize() -> Result<Self> {
        Python::attach(|py| -> Result<Self> {
            let main_module = PyModule::import(py, "__main__")?;
            Self::install_runtime_helpers(py, &main_module)?;
            Self::health_check(py, &main_module)?;

            Ok(Self {
                main_module: main_module.unbind(),
            })
        })
    }

    pub fn load_csv(
        &self,
        name: &str,
        path: &str,
        delimiter: Option<&str>,
        encoding: Option<&str>,
    ) -> Result<CsvShape> {
        Python::attach(|py| -> Result<CsvShape> {
            let main = self.main_module.bind(py);
            let result = Self::call_runtime_helper(
                main,
                "_csvagent_load_csv",
                (name, path, delimiter, encoding),
            )?;
            if Self::result_ok(&result)? {
                Ok(CsvShape {
                    rows: Self::dict_usize(&result, "rows")?,
                    columns: Self::dict_usize(&result, "columns")?,
                })
            } else {
                let exception = Self::dict_exception(&result)?;
                anyhow::bail!("Failed to load {path}:\n{}", exception.traceback)
            }
        })
    }

    pub fn dataframe_check(&self, name: &str) -> Result<DataframeCheck> {
        Python::attach(|py| -> Result<DataframeCheck> {
            let main = self.main_module.bind(py);
            let result = Self::call_runtime_helper(main, "_csvagent_dataframe_check", (name,))?;
            if Self::result_ok(&result)? {
                if Self::dict_bool(&result, "is_dataframe")? {
                    Ok(DataframeCheck::Tabular)
                } else {
                    Ok(DataframeCheck::NotTabular {
                        type_name: Self::dict_string(&result, "type_name")?,
                    })
                }
            } else {
                let exception = Self::dict_exception(&result)?;
                match exception.exc_type.as_str() {
                    "ImportError" | "ModuleNotFoundError" => Ok(DataframeCheck::PandasMissing),
                    _ => anyhow::bail!("{}", exception.traceback),
                }
            }
        })
    }

    pub fn head_markdown(&self, name: &str) -> Result<String> {
        Python::attach(|py| -> Result<String> {
            let main = self.main_module.bind(py);
            let result = Self::call_runtime_helper(main, "_csvagent_head_markdown", (name,))?;
            if Self::result_ok(&result)? {
                Self::dict_string(&result, "markdown")
            } else {
                let exception = Self::dict_exception(&result)?;
                anyhow::bail!("{}", exception.traceback)
            }
        })
    }

    pub fn run_ast(&self, code: &str) -> Result<ReplOutcome> {
        Python::attach(|py| -> Result<ReplOutcome> {
            let main = self.main_module.bind(py);
            let result = Self::call_runtime_helper(main, "_csvagent_run_ast", (code,))?;
            if Self::result_ok(&result)? {
                Ok(ReplOutcome::Completed {
                    value: Self::dict_string(&result, "value")?,
                    stdout: Self::dict_string(&result, "stdout")?,
                })
            } else {
                Ok(ReplOutcome::Failed {
                    stdout: Self::dict_string(&result, "stdout")?,
                    exception: Self::dict_exception(&result)?,
                })
            }
        })
    }

    pub fn is_healthy(&self) -> bool {
        Python::attach(|py| {
            let main = self.main_module.bind(py);
            Self::health_check(py, main).is_ok()
        })
    }

    fn health_check(py: Python<'_>, main_module: &Bound<'_, PyModule>) -> PyResult<()> {
        let globals = main_module.dict();
        let _ = py.eval(c"1 + 1", Some(&globals), Some(&globals))?;
        Ok(())
    }

    fn install_runtime_helpers(py: Python<'_>, main_module: &Bound<'_, PyModule>) -> Result<()> {
        let globals = main_module.dict();
        let helper_code = CString::new(include_str!("runtime_helpers.py"))?;
        py.run(helper_code.as_c_str(), Some(&globals), Some(&globals))?;
        Ok(())
    }

    fn call_runtime_helper<'py, A>(
        main_module: &Bound<'py, PyModule>,
        helper_name: &str,
        args: A,
    ) -> Result<Bound<'py, pyo3::types::PyAny>>
    where
        A: pyo3::call::PyCallArgs<'py>,
    {
        let helper = main_module.getattr(helper_name)?;
        let result = helper.call1(args)?;
        Ok(result)
    }

    fn result_ok(result: &Bound<'_, pyo3::types::PyAny>) -> Result<bool> {
        let dict = Self::cast_dict(result)?;
        Ok(dict
            .get_item("ok")?
            .ok_or_else(|| anyhow!("missing ok in helper result"))?
            .extract()?)
    }

    fn dict_string(result: &Bound<'_, pyo3::types::PyAny>, key: &str) -> Result<String> {
        let dict = Self::cast_dict(result)?;
        Ok(dict
            .get_item(key)?
            .ok_or_else(|| anyhow!("missing {key} in helper result"))?
            .extract()?)
    }

    fn dict_bool(result: &Bound<'_, pyo3::types::PyAny>, key: &str) -> Result<bool> {
        let dict = Self::cast_dict(result)?;
        Ok(dict
            .get_item(key)?
            .ok_or_else(|| anyhow!("missing {key} in helper result"))?
            .extract()?)
    }

    fn dict_usize(result: &Bound<'_, pyo3::types::PyAny>, key: &str) -> Result<usize> {
        let dict = Self::cast_dict(result)?;
        Ok(dict
            .get_item(key)?
            .ok_or_else(|| anyhow!("missing {key} in helper result"))?
            .extract()?)
    }

    fn dict_exception(result: &Bound<'_, pyo3::types::PyAny>) -> Result<ExceptionInfo> {
        let dict = Self::cast_dict(result)?;
        let exception = dict
            .get_item("exception")?
            .ok_or_else(|| anyhow!("missing exception in helper result"))?;
        let dict = Self::cast_dict(&exception)?;
        Ok(ExceptionInfo {
            exc_type: dict
                .get_item("exc_type")?
                .ok_or_else(|| anyhow!("missing exc_type"))?
                .extract()?,
            message: dict
                .get_item("message")?
                .ok_or_else(|| anyhow!("missing message"))?
                .extract()?,
            traceback: dict
                .get_item("traceback")?
                .ok_or_else(|| anyhow!("missing traceback"))?
                .extract()?,
        })
    }

    fn cast_dict<'a>(value: &'a Bound<'a, pyo3::types::PyAny>) -> Result<&'a Bound<'a, PyDict>> {
        value
            .cast::<PyDict>()
            .map_err(|err| anyhow!(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{DataframeCheck, PythonSession, ReplOutcome};

    fn pandas_available(session: &PythonSession) -> bool {
        matches!(
            session.run_ast("import pandas"),
            Ok(ReplOutcome::Completed { .. })
        )
    }

    #[test]
    fn run_ast_evaluates_trailing_expression() {
        let session = PythonSession::initialize().expect("python session");
        let outcome = session.run_ast("40 + 2").expect("run");
        assert_eq!(
            outcome,
            ReplOutcome::Completed {
                value: "42".to_string(),
                stdout: String::new(),
            }
        );
    }

    #[test]
    fn run_ast_persists_globals_across_calls() {
        let session = PythonSession::initialize().expect("python session");
        session.run_ast("x = 41").expect("assign");
        let outcome = session.run_ast("x + 1").expect("read back");
        assert!(matches!(
            outcome,
            ReplOutcome::Completed { ref value, .. } if value == "42"
        ));
    }

    #[test]
    fn run_ast_runs_statements_before_final_expression() {
        let session = PythonSession::initialize().expect("python session");
        let outcome = session
            .run_ast("total = 0\nfor i in range(4):\n    total += i\ntotal")
            .expect("run");
        assert!(matches!(
            outcome,
            ReplOutcome::Completed { ref value, .. } if value == "6"
        ));
    }

    #[test]
    fn run_ast_returns_empty_value_for_pure_statements() {
        let session = PythonSession::initialize().expect("python session");
        let outcome = session.run_ast("y = 5").expect("run");
        assert!(matches!(
            outcome,
            ReplOutcome::Completed { ref value, .. } if value.is_empty()
        ));
    }

    #[test]
    fn run_ast_captures_stdout() {
        let session = PythonSession::initialize().expect("python session");
        let outcome = session.run_ast("print('hello')").expect("run");
        assert_eq!(
            outcome,
            ReplOutcome::Completed {
                value: String::new(),
                stdout: "hello\n".to_string(),
            }
        );
    }

    #[test]
    fn run_ast_renders_strings_without_quotes() {
        let session = PythonSession::initialize().expect("python session");
        let outcome = session.run_ast("'abc'").expect("run");
        assert!(matches!(
            outcome,
            ReplOutcome::Completed { ref value, .. } if value == "abc"
        ));
    }

    #[test]
    fn run_ast_reports_exceptions_as_failed_outcome() {
        let session = PythonSession::initialize().expect("python session");
        let outcome = session.run_ast("1 / 0").expect("run");
        let ReplOutcome::Failed { exception, .. } = outcome else {
            panic!("expected failed outcome");
        };
        assert_eq!(exception.exc_type, "ZeroDivisionError");
        assert!(exception.message.contains("division by zero"));
        assert!(exception.traceback.contains("Traceback"));
    }

    #[test]
    fn run_ast_reports_syntax_errors_as_failed_outcome() {
        let session = PythonSession::initialize().expect("python session");
        let outcome = session.run_ast("if True").expect("run");
        assert!(matches!(
            outcome,
            ReplOutcome::Failed { ref exception, .. } if exception.exc_type == "SyntaxError"
        ));
    }

    #[test]
    fn run_ast_keeps_stdout_written_before_a_failure() {
        let session = PythonSession::initialize().expect("python session");
        let outcome = session.run_ast("print('before')\n1 / 0").expect("run");
        assert!(matches!(
            outcome,
            ReplOutcome::Failed { ref stdout, .. } if stdout == "before\n"
        ));
    }

    #[test]
    fn dataframe_check_reports_non_tabular_type_name() {
        let session = PythonSession::initialize().expect("python session");
        if !pandas_available(&session) {
            return;
        }

        session.run_ast("thing = 5").expect("seed global");
        let check = session.dataframe_check("thing").expect("check");
        assert_eq!(
            check,
            DataframeCheck::NotTabular {
                type_name: "int".to_string()
            }
        );
    }

    #[test]
    fn load_csv_binds_dataframe_and_reports_shape() {
        let session = PythonSession::initialize().expect("python session");
        if !pandas_available(&session) {
            return;
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("sample.csv");
        fs::write(&csv_path, "A,B\n1,x\n2,y\n3,z\n").expect("write csv");

        let shape = session
            .load_csv("df", csv_path.to_str().expect("utf8 path"), None, None)
            .expect("load csv");
        assert_eq!(shape.rows, 3);
        assert_eq!(shape.columns, 2);
        assert_eq!(
            session.dataframe_check("df").expect("check"),
            DataframeCheck::Tabular
        );
    }

    #[test]
    fn load_csv_honors_delimiter_override() {
        let session = PythonSession::initialize().expect("python session");
        if !pandas_available(&session) {
            return;
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("semicolons.csv");
        fs::write(&csv_path, "A;B\n1;x\n2;y\n").expect("write csv");

        let shape = session
            .load_csv("df", csv_path.to_str().expect("utf8 path"), Some(";"), None)
            .expect("load csv");
        assert_eq!(shape.columns, 2);
    }

    #[test]
    fn load_csv_fails_with_traceback_for_missing_file() {
        let session = PythonSession::initialize().expect("python session");
        if !pandas_available(&session) {
            return;
        }

        let err = session
            .load_csv("df", "/nonexistent/definitely-missing.csv", None, None)
            .expect_err("missing file should fail");
        assert!(err.to_string().contains("Failed to load"));
    }

    #[test]
    fn head_markdown_renders_preview_rows() {
        let session = PythonSession::initialize().expect("python session");
        if !pandas_available(&session) {
            return;
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("preview.csv");
        fs::write(&csv_path, "A,B\n1,x\n2,y\n3,z\n").expect("write csv");
        session
            .load_csv("df", csv_path.to_str().expect("utf8 path"), None, None)
            .expect("load csv");

        let markdown = session.head_markdown("df").expect("head markdown");
        assert!(markdown.contains('A'));
        assert!(markdown.contains('x'));
    }

    #[test]
    fn repl_sees_dataframe_loaded_by_name() {
        let session = PythonSession::initialize().expect("python session");
        if !pandas_available(&session) {
            return;
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("values.csv");
        fs::write(&csv_path, "A,B\n1,x\n2,y\n3,z\n").expect("write csv");
        session
            .load_csv("df", csv_path.to_str().expect("utf8 path"), None, None)
            .expect("load csv");

        let outcome = session.run_ast("df['A'].tolist()").expect("run");
        assert!(matches!(
            outcome,
            ReplOutcome::Completed { ref value, .. } if value == "[1, 2, 3]"
        ));
    }

    #[test]
    fn session_stays_healthy_after_failures() {
        let session = PythonSession::initialize().expect("python session");
        session.run_ast("1 / 0").expect("run failure");
        assert!(session.is_healthy());
    }
}
