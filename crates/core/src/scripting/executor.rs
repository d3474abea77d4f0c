//! Request, result and output types shared by the runner and the service.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Wire encoding for a streamed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lines passed through unchanged.
    #[default]
    Plain,
    /// One `{"line": ...}` JSON object per line.
    Jsonl,
    /// One `data: {"line": ...}` server-sent event per line.
    Sse,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Plain => "text/plain; charset=utf-8",
            Self::Jsonl => "application/x-ndjson",
            Self::Sse => "text/event-stream",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "jsonl" => Ok(Self::Jsonl),
            "sse" => Ok(Self::Sse),
            other => Err(format!(
                "invalid format: {other} (expected \"plain\", \"jsonl\" or \"sse\")"
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Jsonl => "jsonl",
            Self::Sse => "sse",
        })
    }
}

/// One execution request as received from the transport.
///
/// `format` is only consulted when `stream` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub key: String,
    pub args: Vec<String>,
    pub include_source: bool,
    pub stream: bool,
    pub format: OutputFormat,
}

impl ExecutionRequest {
    pub fn blocking(key: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            key: key.into(),
            args,
            ..Self::default()
        }
    }

    pub fn streaming(key: impl Into<String>, args: Vec<String>, format: OutputFormat) -> Self {
        Self {
            key: key.into(),
            args,
            stream: true,
            format,
            ..Self::default()
        }
    }
}

/// Raw output of a blocking-collect run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedOutput {
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Outcome of a blocking run. A non-zero `returncode` is a normal result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Allow-list key that was run.
    pub script: String,
    pub path: PathBuf,
    pub args: Vec<String>,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    /// Script file contents, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.returncode == 0
    }
}

/// One line of merged process output, always terminated by `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    line: String,
}

impl OutputEvent {
    /// Build an event from raw bytes read up to (and including) a newline.
    ///
    /// Invalid UTF-8 is replaced with U+FFFD; a missing terminator is added.
    pub fn from_bytes(raw: &[u8]) -> Self {
        let mut line = String::from_utf8_lossy(raw).into_owned();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        Self { line }
    }

    /// The line including its trailing newline.
    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// The line without `\n` (and without a preceding `\r`).
    pub fn content(&self) -> &str {
        let trimmed = self.line.strip_suffix('\n').unwrap_or(&self.line);
        trimmed.strip_suffix('\r').unwrap_or(trimmed)
    }
}
