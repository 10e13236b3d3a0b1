//! Wire types of the sandbox HTTP API.

use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::executor::{ExecutionRequest, InputMode};
use crate::language::Language;
use crate::result::ExecutionResult;

/// Body of every `execute*` endpoint. All fields are optional on the wire so
/// that missing ones surface as 400s rather than deserialization failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCodeRequest {
    /// `JAVA`, `PYTHON` or `JAVASCRIPT`.
    pub language: Option<String>,
    /// Source text.
    pub code: Option<String>,
    /// Inputs handed to the program.
    pub inputs: Option<Vec<String>>,
    /// `PARAMS` (default) or `FILE`.
    pub input_type: Option<String>,
    /// Number of runs.
    pub execution_count: Option<i64>,
    /// Output every run is judged against.
    pub expected_output: Option<String>,
}

impl ExecuteCodeRequest {
    /// Validates the wire request. `forced` overrides the body's language.
    pub fn into_execution_request(self, forced: Option<Language>) -> Result<ExecutionRequest, ApiError> {
        let language = match (forced, self.language.as_deref()) {
            (Some(language), _) => language,
            (None, None) => return Err(ApiError::BadRequest("language is required".to_string())),
            (None, Some(name)) => name
                .parse::<Language>()
                .map_err(|e| ApiError::Unsupported(e.to_string()))?,
        };

        let code = self
            .code
            .ok_or_else(|| ApiError::BadRequest("code is required".to_string()))?;

        let input_mode = match self.input_type.as_deref().map(str::to_ascii_uppercase).as_deref() {
            None | Some("PARAMS") => InputMode::Args,
            Some("FILE") => InputMode::TestFile,
            Some(other) => {
                return Err(ApiError::BadRequest(format!(
                    "inputType must be PARAMS or FILE, got '{other}'"
                )))
            }
        };

        let mut request = ExecutionRequest::new(language, code)
            .with_inputs(self.inputs.unwrap_or_default(), input_mode)
            .with_repeat(self.execution_count.unwrap_or(1));
        if let Some(expected) = self.expected_output {
            request = request.with_expected(expected);
        }
        Ok(request)
    }
}

/// Overall verdict on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    /// Every run succeeded (and matched, when judged).
    Succeed,
    /// Anything else.
    Failed,
}

/// Summary numbers of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeInfo {
    /// Verdict text or error message.
    pub message: String,
    /// Peak memory across runs, in KB.
    pub memory: u64,
    /// Mean run duration, in ms.
    pub time: u64,
}

/// Response of every `execute*` endpoint, including errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCodeResponse {
    /// Overall verdict.
    pub status: ResponseStatus,
    /// Output of each run, in run order.
    pub output: Vec<String>,
    /// Verdict message and resource usage.
    pub judge_info: JudgeInfo,
}

impl ExecuteCodeResponse {
    /// A FAILED response with no runs.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Failed,
            output: Vec::new(),
            judge_info: JudgeInfo {
                message: message.into(),
                memory: 0,
                time: 0,
            },
        }
    }

    /// Renders an aggregate result. `judged` is true when the request
    /// carried an expected output.
    pub fn from_result(result: &ExecutionResult, judged: bool) -> Self {
        let accepted = result.success() && (!judged || result.output_matched());

        let message = match result.first_failure() {
            Some(run) if run.diagnostic.is_empty() => run.status.to_string(),
            Some(run) => format!("{}: {}", run.status, run.diagnostic),
            None if !judged => "Succeeded".to_string(),
            None if result.output_matched() => "Accepted".to_string(),
            None => "Wrong Answer".to_string(),
        };

        Self {
            status: if accepted {
                ResponseStatus::Succeed
            } else {
                ResponseStatus::Failed
            },
            output: result
                .per_run_metrics()
                .iter()
                .map(|run| run.output.clone())
                .collect(),
            judge_info: JudgeInfo {
                message,
                memory: result.max_memory_bytes() / 1024,
                time: result.avg_duration_millis(),
            },
        }
    }
}
