//! Run classification and output comparison.

use std::time::Duration;

use crate::language::LanguageProfile;
use crate::result::RunStatus;
use crate::sandbox::ExecOutput;

/// Exit status of a process killed with SIGKILL (128 + 9).
const SIGKILL_EXIT: i64 = 137;

/// Exit status `timeout(1)` uses when it had to stop the command.
const TIMEOUT_EXIT: i64 = 124;

/// Classifies a finished run.
///
/// `elapsed` is compared against `bound` because the in-container backstop
/// kills with SIGKILL, which is otherwise indistinguishable from the OOM killer.
/// Compile signatures only apply to interpreted languages: a compiled
/// program reaching this point has already passed its compile step.
pub fn classify(
    profile: &LanguageProfile,
    output: &ExecOutput,
    elapsed: Duration,
    bound: Duration,
) -> RunStatus {
    match output.exit_code {
        Some(0) => RunStatus::Succeeded,
        Some(TIMEOUT_EXIT | SIGKILL_EXIT) if elapsed >= bound => RunStatus::Timeout,
        Some(SIGKILL_EXIT) => RunStatus::RuntimeError,
        _ if profile.compile.is_none() && profile.is_compile_error(&output.stderr) => {
            RunStatus::CompilationError
        }
        _ if profile.is_runtime_error(&output.stderr) => RunStatus::RuntimeError,
        _ => RunStatus::Failed,
    }
}

/// Normalises line endings and surrounding whitespace.
pub fn normalize_output(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}

/// Returns true if `actual` matches `expected` after normalisation.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

/// Cuts `text` to at most `max_bytes`, on a character boundary.
pub fn truncate_output(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    fn out(code: i64, stderr: &str) -> ExecOutput {
        ExecOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(code),
        }
    }

    const BOUND: Duration = Duration::from_secs(2);

    #[test]
    fn test_exit_zero_succeeds() {
        let profile = Language::Python.profile();
        let status = classify(&profile, &out(0, "warning"), Duration::ZERO, BOUND);
        assert_eq!(status, RunStatus::Succeeded);
    }

    #[test]
    fn test_sigkill_after_bound_is_timeout() {
        let profile = Language::Python.profile();
        assert_eq!(
            classify(&profile, &out(137, ""), BOUND, BOUND),
            RunStatus::Timeout
        );
        assert_eq!(
            classify(&profile, &out(137, ""), Duration::from_millis(300), BOUND),
            RunStatus::RuntimeError
        );
    }

    #[test]
    fn test_signatures_drive_classification() {
        let python = Language::Python.profile();
        assert_eq!(
            classify(&python, &out(1, "SyntaxError: invalid syntax"), Duration::ZERO, BOUND),
            RunStatus::CompilationError
        );
        assert_eq!(
            classify(
                &python,
                &out(1, "Traceback (most recent call last):\nValueError"),
                Duration::ZERO,
                BOUND
            ),
            RunStatus::RuntimeError
        );
        assert_eq!(
            classify(&python, &out(3, ""), Duration::ZERO, BOUND),
            RunStatus::Failed
        );
    }

    #[test]
    fn test_compiled_program_output_is_never_a_compile_error() {
        let java = Language::Java.profile();
        let stderr = "Exception in thread \"main\" java.lang.IllegalStateException: \
                      parse error: bad token\n\tat Main.main(Main.java:3)";
        assert_eq!(
            classify(&java, &out(1, stderr), Duration::ZERO, BOUND),
            RunStatus::RuntimeError
        );
        assert_eq!(
            classify(&java, &out(2, "error: input rejected"), Duration::ZERO, BOUND),
            RunStatus::Failed
        );
    }

    #[test]
    fn test_missing_exit_code_is_failed() {
        let profile = Language::JavaScript.profile();
        let output = ExecOutput::default();
        assert_eq!(
            classify(&profile, &output, Duration::ZERO, BOUND),
            RunStatus::Failed
        );
    }

    #[test]
    fn test_outputs_match_ignores_line_endings_and_padding() {
        assert!(outputs_match("Hello\r\nWorld\r\n", "Hello\nWorld"));
        assert!(outputs_match("  3\n", "3"));
        assert!(!outputs_match("3", "4"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_output("hello".to_string(), 10), "hello");
        assert_eq!(truncate_output("hello".to_string(), 3), "hel");
        // 'é' is two bytes; cutting in the middle backs off
        assert_eq!(truncate_output("aé".to_string(), 2), "a");
    }
}
