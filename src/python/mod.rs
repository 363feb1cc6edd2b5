mod interpreter;

pub use interpreter::{
    CsvShape, DataframeCheck, ExceptionInfo, PythonSession, ReplOutcome,
};
