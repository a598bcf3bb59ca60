use std::fmt;

use serde::{Deserialize, Serialize};

/// Exit code reported for a process that was killed by its run deadline.
/// Valid Unix exit codes are 0..=255, so the sentinel can never collide.
pub const EXIT_TIMED_OUT: i32 = -1;

/// Exit code reported when the runtime executable could not be spawned at
/// all (missing interpreter, permission denied). Distinguished from a user
/// program exiting 1 by `CaseState::Error`.
pub const EXIT_SPAWN_FAILED: i32 = 1;

/// Languages with a registered toolchain adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    C,
    Python,
    Java,
    Javascript,
    Ruby,
    Csharp,
}

impl Language {
    pub const ALL: [Language; 7] = [
        Language::Cpp,
        Language::C,
        Language::Python,
        Language::Java,
        Language::Javascript,
        Language::Ruby,
        Language::Csharp,
    ];

    /// Resolve a request's language name. The wire names are fixed; there
    /// are no aliases.
    pub fn parse(name: &str) -> Option<Language> {
        match name {
            "cpp" => Some(Language::Cpp),
            "c" => Some(Language::C),
            "python" => Some(Language::Python),
            "java" => Some(Language::Java),
            "javascript" => Some(Language::Javascript),
            "ruby" => Some(Language::Ruby),
            "csharp" => Some(Language::Csharp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Python => "python",
            Language::Java => "java",
            Language::Javascript => "javascript",
            Language::Ruby => "ruby",
            Language::Csharp => "csharp",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work: source code plus the ordered test cases to grade it
/// against. Immutable after deserialization; owned by exactly one
/// orchestrator call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub language: String,
    pub code: String,
    #[serde(rename = "testCases", default)]
    pub test_cases: Vec<TestCase>,
}

/// An (input, expected output) pair. The input is fed verbatim to the
/// running process as the totality of its standard input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub output: String,
}

/// Per-case classification derived from exit status and output comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Passed,
    Failed,
    Error,
    TimedOut,
}

/// Whether the runtime process was started at all. `Error` means the spawn
/// itself failed; a program that started and then crashed is still
/// `Execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseState {
    Execute,
    Error,
}

/// The record produced for one test case run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub input: String,
    pub state: CaseState,
    pub verdict: Verdict,
    pub out: String,
    pub err: Vec<String>,
    pub exit_code: i32,
    pub run_time: u64,
    #[serde(rename = "memoryUsageInMB")]
    pub memory_usage_in_mb: String,
}

/// The sole object returned across the system boundary: compile outcome
/// plus the ordered per-case results. `results` is empty when compilation
/// failed (or the case list was empty).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub compile_exit_code: i32,
    pub compile_time: u64,
    pub compile_message: Vec<String>,
    pub results: Vec<CaseResult>,
    #[serde(rename = "memoryUsageInMB")]
    pub memory_usage_in_mb: String,
}

/// Structured error object for requests that never reach the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn unsupported_language() -> Self {
        Self {
            error: "Unsupported language".to_string(),
        }
    }
}
