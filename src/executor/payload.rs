//! Materialises a request into files plus the shell command that runs them.

use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

use super::request::{ExecutionRequest, InputMode};
use crate::language::LanguageProfile;

/// Name of the file test inputs are written to.
pub const INPUT_FILE: &str = "input.txt";

/// Writes the source (and test-input file, if any) into a fresh directory under `root`.
///
/// The directory is deleted when the returned handle drops.
pub fn write_payload(
    root: &Path,
    profile: &LanguageProfile,
    request: &ExecutionRequest,
) -> std::io::Result<TempDir> {
    fs::create_dir_all(root)?;
    let dir = tempfile::Builder::new().prefix("payload-").tempdir_in(root)?;

    fs::write(dir.path().join(profile.source_file), &request.code)?;

    if request.input_mode == InputMode::TestFile {
        let mut content = request.inputs.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        fs::write(dir.path().join(INPUT_FILE), content)?;
    }

    Ok(dir)
}

/// Wraps a shell line so the container itself kills it after `bound`.
///
/// The host-side timeout fires first; this is the backstop for a host that
/// loses track of the exec.
fn with_backstop(line: &str, bound: Duration) -> Vec<String> {
    let secs = bound.as_secs() + 1;
    vec![
        "timeout".to_string(),
        "-s".to_string(),
        "KILL".to_string(),
        secs.to_string(),
        "sh".to_string(),
        "-c".to_string(),
        line.to_string(),
    ]
}

/// Command that compiles the payload, if the language needs it.
pub fn compile_command(profile: &LanguageProfile, bound: Duration) -> Option<Vec<String>> {
    profile.compile.map(|line| with_backstop(line, bound))
}

/// Command that runs the payload once.
pub fn run_command(
    profile: &LanguageProfile,
    request: &ExecutionRequest,
    bound: Duration,
) -> Vec<String> {
    let mut line = profile.run.to_string();

    match request.input_mode {
        InputMode::Args if !request.inputs.is_empty() => {
            line.push(' ');
            line.push_str(&shell_words::join(&request.inputs));
        }
        InputMode::Args => {}
        InputMode::TestFile => {
            line.push_str(" < ");
            line.push_str(INPUT_FILE);
        }
    }

    with_backstop(&line, bound)
}
