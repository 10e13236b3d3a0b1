//! Supported languages and their execution profiles.
//!
//! A [`LanguageProfile`] is the only per-language piece of the executor: the
//! source file name, optional compile step, run command and the stderr
//! signatures used to classify failures.

use serde::{Deserialize, Serialize};

/// Languages the sandbox can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    /// Java, compiled with `javac` then run on the JVM.
    Java,
    /// Python 3.
    Python,
    /// JavaScript on Node.js.
    #[serde(alias = "JS")]
    JavaScript,
}

impl Language {
    /// Every supported language, in a stable order.
    pub const ALL: [Language; 3] = [Language::Java, Language::Python, Language::JavaScript];

    /// Upper-case wire name (`JAVA`, `PYTHON`, `JAVASCRIPT`).
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Java => "JAVA",
            Self::Python => "PYTHON",
            Self::JavaScript => "JAVASCRIPT",
        }
    }

    /// Execution profile for this language.
    pub fn profile(self) -> LanguageProfile {
        match self {
            Self::Java => LanguageProfile {
                source_file: "Main.java",
                compile: Some("javac -encoding utf-8 Main.java"),
                run: "java -Xmx256m -Dfile.encoding=UTF-8 -cp . Main",
                compile_error_signatures: &["error:"],
                runtime_error_signatures: &["Exception in thread", "Error: Could not find or load"],
            },
            Self::Python => LanguageProfile {
                source_file: "main.py",
                compile: None,
                run: "python3 -u main.py",
                compile_error_signatures: &["SyntaxError", "IndentationError", "TabError"],
                runtime_error_signatures: &["Traceback (most recent call last)"],
            },
            Self::JavaScript => LanguageProfile {
                source_file: "main.js",
                compile: None,
                run: "node main.js",
                compile_error_signatures: &["SyntaxError"],
                runtime_error_signatures: &["Error:", "    at "],
            },
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Java => write!(f, "java"),
            Self::Python => write!(f, "python"),
            Self::JavaScript => write!(f, "javascript"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "java" => Ok(Self::Java),
            "python" | "python3" => Ok(Self::Python),
            "javascript" | "js" | "node" => Ok(Self::JavaScript),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

/// Error returned when parsing an unsupported language name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language: '{0}'. Supported: java, python, javascript")]
pub struct UnknownLanguage(pub String);

/// Per-language execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    /// File the submitted code is written to.
    pub source_file: &'static str,
    /// Compile command run once per request, if the language needs one.
    pub compile: Option<&'static str>,
    /// Command that runs the program; inputs are appended to it.
    pub run: &'static str,
    /// Stderr fragments that mark a compilation or syntax error.
    pub compile_error_signatures: &'static [&'static str],
    /// Stderr fragments that mark an uncaught runtime error.
    pub runtime_error_signatures: &'static [&'static str],
}

impl LanguageProfile {
    /// Returns true if `stderr` looks like a compile-time failure.
    pub fn is_compile_error(&self, stderr: &str) -> bool {
        self.compile_error_signatures
            .iter()
            .any(|sig| stderr.contains(sig))
    }

    /// Returns true if `stderr` looks like an uncaught runtime error.
    pub fn is_runtime_error(&self, stderr: &str) -> bool {
        self.runtime_error_signatures
            .iter()
            .any(|sig| stderr.contains(sig))
    }
}
