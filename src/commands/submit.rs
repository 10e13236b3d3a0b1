//! `ojsandbox submit`: send a source file to a running sandbox.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use ojsandbox::api::{ExecuteCodeRequest, ExecuteCodeResponse, ResponseStatus, AUTH_HEADER};
use ojsandbox::config::Config;
use ojsandbox::language::Language;

/// Arguments of `ojsandbox submit`.
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Source file to execute
    pub file: PathBuf,

    /// Language (inferred from the file extension if omitted)
    #[arg(short, long)]
    pub language: Option<Language>,

    /// Program input; repeat for several
    #[arg(short, long = "input")]
    pub inputs: Vec<String>,

    /// Deliver inputs through input.txt on stdin instead of as arguments
    #[arg(long)]
    pub file_input: bool,

    /// Number of runs
    #[arg(short = 'n', long, default_value = "1")]
    pub count: i64,

    /// Expected output to judge against
    #[arg(short, long)]
    pub expected: Option<String>,

    /// Sandbox base URL (default: derived from the configured bind address)
    #[arg(long)]
    pub server: Option<String>,

    /// Shared secret (default: from config)
    #[arg(long, env = "OJSANDBOX_AUTH_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
}

/// Submits the file and prints the verdict. Fails if the verdict is FAILED.
pub async fn run(args: SubmitArgs, config: &Config) -> Result<()> {
    let code = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read source file: {}", args.file.display()))?;
    let request = build_request(&args, code)?;

    let base = args
        .server
        .clone()
        .unwrap_or_else(|| default_server_url(&config.server.bind));
    let url = format!("{}/api/sandbox/execute", base.trim_end_matches('/'));
    let secret = args
        .secret
        .clone()
        .unwrap_or_else(|| config.server.auth_secret.clone());

    let response = reqwest::Client::new()
        .post(&url)
        .header(AUTH_HEADER, secret)
        .json(&request)
        .send()
        .await
        .with_context(|| format!("Failed to reach sandbox at {url}"))?;

    let http_status = response.status();
    let verdict: ExecuteCodeResponse = response
        .json()
        .await
        .with_context(|| format!("Unexpected response from sandbox (HTTP {http_status})"))?;

    print!("{}", render(&verdict));

    if verdict.status == ResponseStatus::Failed {
        anyhow::bail!("Submission failed: {}", verdict.judge_info.message);
    }
    Ok(())
}

/// Builds the wire request for `args` and the file's contents.
pub fn build_request(args: &SubmitArgs, code: String) -> Result<ExecuteCodeRequest> {
    let language = match args.language {
        Some(language) => language,
        None => language_from_path(&args.file).with_context(|| {
            format!(
                "Cannot infer language from {}; pass --language",
                args.file.display()
            )
        })?,
    };

    Ok(ExecuteCodeRequest {
        language: Some(language.wire_name().to_string()),
        code: Some(code),
        inputs: Some(args.inputs.clone()),
        input_type: Some(if args.file_input { "FILE" } else { "PARAMS" }.to_string()),
        execution_count: Some(args.count),
        expected_output: args.expected.clone(),
    })
}

/// Infers the language from a source file extension.
pub fn language_from_path(path: &Path) -> Option<Language> {
    match path.extension()?.to_str()? {
        "java" => Some(Language::Java),
        "py" => Some(Language::Python),
        "js" | "mjs" | "cjs" => Some(Language::JavaScript),
        _ => None,
    }
}

/// Client URL for a server bound to `bind`.
fn default_server_url(bind: &str) -> String {
    let port = bind.rsplit(':').next().unwrap_or("8090");
    format!("http://127.0.0.1:{port}")
}

/// Human-readable verdict.
pub fn render(response: &ExecuteCodeResponse) -> String {
    let status = match response.status {
        ResponseStatus::Succeed => "SUCCEED".green().bold(),
        ResponseStatus::Failed => "FAILED".red().bold(),
    };

    let mut out = format!(
        "{} {}\n{} {} ms  {} {} KB\n",
        status,
        response.judge_info.message,
        "time".dimmed(),
        response.judge_info.time,
        "memory".dimmed(),
        response.judge_info.memory
    );

    for (i, output) in response.output.iter().enumerate() {
        out.push_str(&format!("{}\n", format!("--- run {} ---", i + 1).cyan()));
        if !output.is_empty() {
            out.push_str(output);
            out.push('\n');
        }
    }
    out
}
