use serde::{Deserialize, Serialize};

use crate::language::Language;

/// How request inputs reach the program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputMode {
    /// Inputs are passed as command-line arguments.
    #[default]
    Args,
    /// Inputs are written, one per line, to `input.txt` and fed on stdin.
    TestFile,
}

/// Logical input to one executor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Language the code is written in.
    pub language: Language,
    /// Source text; must not be blank.
    pub code: String,
    /// Ordered inputs, possibly empty.
    pub inputs: Vec<String>,
    /// How `inputs` are delivered.
    pub input_mode: InputMode,
    /// Number of runs. Values below 1 are treated as 1.
    pub repeat_count: i64,
    /// Output every run is judged against, if any.
    pub expected_output: Option<String>,
}

impl ExecutionRequest {
    /// A single-run request with no inputs.
    pub fn new(language: Language, code: impl Into<String>) -> Self {
        Self {
            language,
            code: code.into(),
            inputs: Vec::new(),
            input_mode: InputMode::Args,
            repeat_count: 1,
            expected_output: None,
        }
    }

    /// Sets the inputs and how they are delivered.
    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<String>, mode: InputMode) -> Self {
        self.inputs = inputs;
        self.input_mode = mode;
        self
    }

    /// Sets the number of runs.
    #[must_use]
    pub fn with_repeat(mut self, count: i64) -> Self {
        self.repeat_count = count;
        self
    }

    /// Sets the output to judge against.
    #[must_use]
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = Some(expected.into());
        self
    }

    /// Run count clamped to at least 1.
    pub fn effective_repeat(&self) -> usize {
        usize::try_from(self.repeat_count.max(1)).unwrap_or(1)
    }
}
