use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that cross the engine boundary.
///
/// Everything else (compile failures, spawn failures, timeouts, wrong
/// answers) is folded into the submission report and never surfaces as an
/// error. A caller that gets `Err` back has no report at all.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request named a language with no registered toolchain adapter.
    /// No workspace is allocated for these.
    #[error("unsupported language `{0}`")]
    UnsupportedLanguage(String),

    /// The submission's scratch directory could not be allocated or its
    /// source could not be written into it.
    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}
