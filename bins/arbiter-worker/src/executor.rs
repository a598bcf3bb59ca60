// Submission orchestration.
//
//   Received -> Compiling -> CompileFailed (terminal)
//                         -> CompileSucceeded -> Evaluating -> Reported
//
// Glue layer over workspace + toolchain + engine + evaluator: it resolves
// the adapter, allocates the scratch area, drives the compile phase, runs
// every test case and assembles the report. All toolchain and process
// failures are folded into the report; only an unsupported language or a
// failed workspace setup surface as errors, and no partial report is ever
// observable.

use tracing::info;
use uuid::Uuid;

use arbiter_common::error::Result;
use arbiter_common::types::{Submission, SubmissionReport};

use crate::config::EngineConfig;
use crate::evaluator::{self, EvaluationOutcome};
use crate::toolchain::{self, ToolchainAdapter};
use crate::workspace::Workspace;

/// Judge one submission end to end.
///
/// Allocates and tears down exactly one workspace per call, on every exit
/// path: `Workspace` cleans up on drop, so even an error return or a panic
/// while judging cannot leak the scratch directory.
#[tracing::instrument(
    skip(submission, config),
    fields(language = %submission.language, test_count = submission.test_cases.len())
)]
pub async fn run_submission(
    submission: &Submission,
    config: &EngineConfig,
) -> Result<SubmissionReport> {
    // Fails fast, before any workspace exists.
    let adapter = toolchain::adapter_for(&submission.language)?;

    let id = Uuid::new_v4();
    let workspace = Workspace::create(id)?;
    info!(submission_id = %id, language = %adapter.language(), "submission received");

    let outcome = judge(adapter.as_ref(), &workspace, submission, config).await;
    workspace.release();

    if let Ok(report) = &outcome {
        info!(
            submission_id = %id,
            compile_exit_code = report.compile_exit_code,
            cases = report.results.len(),
            "submission reported"
        );
    }
    outcome
}

async fn judge(
    adapter: &dyn ToolchainAdapter,
    workspace: &Workspace,
    submission: &Submission,
    config: &EngineConfig,
) -> Result<SubmissionReport> {
    adapter.materialize(&submission.code, workspace)?;

    let compile = toolchain::compile(adapter, workspace, config.compile_timeout).await;

    // A compile failure short-circuits evaluation entirely: the report
    // carries the diagnostics and an empty result list.
    let Some(recipe) = compile.recipe.clone() else {
        info!(exit_code = compile.exit_code, "compilation failed, skipping test cases");
        return Ok(evaluator::aggregate(&compile, EvaluationOutcome::default()));
    };

    let evaluation = evaluator::run_cases(
        &recipe,
        &submission.test_cases,
        workspace,
        config.run_timeout,
    )
    .await;

    Ok(evaluator::aggregate(&compile, evaluation))
}
