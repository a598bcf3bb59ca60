// Verdict classification and report aggregation.
//
// Compares raw run output against expected output and assigns the per-case
// verdict. Knows nothing about toolchains or process spawning:
// (run output, test case) -> CaseResult is a pure function, so grading is
// deterministic regardless of how the code was executed.
//
// Normalization applied to both sides before comparison:
// - line endings unified (\r\n and bare \r -> \n)
// - leading and trailing whitespace trimmed
// Internal whitespace and case are preserved exactly.

use std::time::Duration;

use tracing::debug;

use arbiter_common::types::{CaseResult, CaseState, SubmissionReport, TestCase, Verdict};

use crate::engine::{self, ExitKind, RunOutput};
use crate::toolchain::{CompileOutcome, InvocationRecipe};
use crate::workspace::Workspace;

/// The ordered case results plus the raw peak memory observed across them,
/// kept separate so the submission-level figure can be aggregated before
/// everything is rendered to wire strings.
#[derive(Debug, Default)]
pub struct EvaluationOutcome {
    pub results: Vec<CaseResult>,
    pub peak_rss_kb: Option<u64>,
}

fn normalize_output(output: &str) -> String {
    output
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .trim()
        .to_string()
}

pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

/// Classify one finished run against its test case.
///
/// Precedence: spawn failure > timeout > non-zero exit > output comparison.
/// A program that crashed is Failed no matter what it printed first.
pub fn evaluate_case(output: &RunOutput, case: &TestCase) -> CaseResult {
    let (state, verdict) = match &output.exit {
        ExitKind::SpawnFailed(_) => (CaseState::Error, Verdict::Error),
        ExitKind::TimedOut => (CaseState::Execute, Verdict::TimedOut),
        ExitKind::Code(code) if *code != 0 => (CaseState::Execute, Verdict::Failed),
        ExitKind::Code(_) => {
            let verdict = if outputs_match(&output.stdout, &case.output) {
                Verdict::Passed
            } else {
                Verdict::Failed
            };
            (CaseState::Execute, verdict)
        }
    };

    CaseResult {
        input: case.input.clone(),
        state,
        verdict,
        out: output.stdout.clone(),
        err: output.stderr_lines.clone(),
        exit_code: output.exit.code(),
        run_time: output.duration_ms,
        memory_usage_in_mb: memory_mb(output.peak_rss_kb),
    }
}

/// Drive the runner over the ordered case list.
///
/// Every case always runs: no reordering, no early termination on first
/// failure. A hanging case is bounded only by its own deadline, and its
/// timeout does not abort the cases after it.
pub async fn run_cases(
    recipe: &InvocationRecipe,
    cases: &[TestCase],
    workspace: &Workspace,
    timeout: Duration,
) -> EvaluationOutcome {
    let mut outcome = EvaluationOutcome::default();
    for (index, case) in cases.iter().enumerate() {
        debug!(case = index + 1, total = cases.len(), "running test case");
        let output = engine::run_command(recipe, &case.input, workspace.path(), timeout).await;
        if let Some(sample) = output.peak_rss_kb {
            outcome.peak_rss_kb = Some(outcome.peak_rss_kb.map_or(sample, |peak| peak.max(sample)));
        }
        let result = evaluate_case(&output, case);
        debug!(
            case = index + 1,
            verdict = ?result.verdict,
            exit_code = result.exit_code,
            run_time_ms = result.run_time,
            "case finished"
        );
        outcome.results.push(result);
    }
    outcome
}

/// Assemble the final report. The top-level memory figure is the maximum
/// best-effort peak observed across the compile step and all runs.
pub fn aggregate(compile: &CompileOutcome, evaluation: EvaluationOutcome) -> SubmissionReport {
    let peak = [compile.peak_rss_kb, evaluation.peak_rss_kb]
        .into_iter()
        .flatten()
        .max();

    SubmissionReport {
        compile_exit_code: compile.exit_code,
        compile_time: compile.elapsed_ms,
        compile_message: compile.messages.clone(),
        results: evaluation.results,
        memory_usage_in_mb: memory_mb(peak),
    }
}

/// Render a peak RSS figure in megabytes, or the explicit unknown marker.
/// Never a fabricated zero.
pub fn memory_mb(peak_rss_kb: Option<u64>) -> String {
    match peak_rss_kb {
        Some(kb) => format!("{:.2}", kb as f64 / 1024.0),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_common::types::{EXIT_SPAWN_FAILED, EXIT_TIMED_OUT};
    use uuid::Uuid;

    fn make_case(input: &str, expected: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            output: expected.to_string(),
        }
    }

    fn make_output(stdout: &str, exit: ExitKind) -> RunOutput {
        RunOutput {
            stdout: stdout.to_string(),
            stderr_lines: vec![],
            exit,
            duration_ms: 5,
            peak_rss_kb: Some(2048),
        }
    }

    #[test]
    fn exact_match_passes() {
        let result = evaluate_case(&make_output("3", ExitKind::Code(0)), &make_case("1 2", "3"));
        assert_eq!(result.verdict, Verdict::Passed);
        assert_eq!(result.state, CaseState::Execute);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed_on_both_sides() {
        let result = evaluate_case(
            &make_output("3\n", ExitKind::Code(0)),
            &make_case("1 2", "  3  "),
        );
        assert_eq!(result.verdict, Verdict::Passed);
    }

    #[test]
    fn crlf_line_endings_compare_equal() {
        let result = evaluate_case(
            &make_output("1\r\n2\r\n", ExitKind::Code(0)),
            &make_case("", "1\n2"),
        );
        assert_eq!(result.verdict, Verdict::Passed);
    }

    #[test]
    fn internal_whitespace_is_never_trimmed() {
        let result = evaluate_case(
            &make_output("3  4", ExitKind::Code(0)),
            &make_case("", "3 4"),
        );
        assert_eq!(result.verdict, Verdict::Failed);
    }

    #[test]
    fn mismatch_fails() {
        let result = evaluate_case(&make_output("4", ExitKind::Code(0)), &make_case("1 2", "3"));
        assert_eq!(result.verdict, Verdict::Failed);
    }

    #[test]
    fn case_is_significant() {
        let result = evaluate_case(
            &make_output("hello", ExitKind::Code(0)),
            &make_case("", "Hello"),
        );
        assert_eq!(result.verdict, Verdict::Failed);
    }

    #[test]
    fn nonzero_exit_fails_even_with_matching_output() {
        let result = evaluate_case(&make_output("3", ExitKind::Code(1)), &make_case("1 2", "3"));
        assert_eq!(result.verdict, Verdict::Failed);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.state, CaseState::Execute);
    }

    #[test]
    fn timeout_takes_precedence_over_comparison() {
        let result = evaluate_case(&make_output("3", ExitKind::TimedOut), &make_case("1 2", "3"));
        assert_eq!(result.verdict, Verdict::TimedOut);
        assert_eq!(result.exit_code, EXIT_TIMED_OUT);
    }

    #[test]
    fn spawn_failure_is_an_error_state() {
        let output = make_output("", ExitKind::SpawnFailed("no such file".to_string()));
        let result = evaluate_case(&output, &make_case("1 2", "3"));
        assert_eq!(result.verdict, Verdict::Error);
        assert_eq!(result.state, CaseState::Error);
        assert_eq!(result.exit_code, EXIT_SPAWN_FAILED);
    }

    #[test]
    fn input_is_echoed_into_the_result() {
        let result = evaluate_case(&make_output("3", ExitKind::Code(0)), &make_case("1 2", "3"));
        assert_eq!(result.input, "1 2");
    }

    #[test]
    fn memory_rendering() {
        assert_eq!(memory_mb(Some(2048)), "2.00");
        assert_eq!(memory_mb(Some(1536)), "1.50");
        assert_eq!(memory_mb(None), "unknown");
    }

    #[test]
    fn aggregate_takes_the_max_peak() {
        let compile = CompileOutcome {
            exit_code: 0,
            elapsed_ms: 100,
            messages: vec![],
            recipe: Some(InvocationRecipe {
                program: "x".to_string(),
                args: vec![],
            }),
            peak_rss_kb: Some(1024),
        };
        let evaluation = EvaluationOutcome {
            results: vec![],
            peak_rss_kb: Some(4096),
        };
        let report = aggregate(&compile, evaluation);
        assert_eq!(report.memory_usage_in_mb, "4.00");
        assert_eq!(report.compile_exit_code, 0);
    }

    #[test]
    fn aggregate_without_samples_reports_unknown() {
        let compile = CompileOutcome {
            exit_code: 0,
            elapsed_ms: 0,
            messages: vec![],
            recipe: None,
            peak_rss_kb: None,
        };
        let report = aggregate(&compile, EvaluationOutcome::default());
        assert_eq!(report.memory_usage_in_mb, "unknown");
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn cases_run_in_order_and_all_run() {
        let workspace = Workspace::create(Uuid::new_v4()).unwrap();
        let recipe = InvocationRecipe {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), "cat".to_string()],
        };
        let cases = vec![
            make_case("first", "first"),
            make_case("second", "wrong"),
            make_case("third", "third"),
        ];

        let outcome = run_cases(&recipe, &cases, &workspace, Duration::from_secs(5)).await;

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results[0].input, "first");
        assert_eq!(outcome.results[0].verdict, Verdict::Passed);
        assert_eq!(outcome.results[1].verdict, Verdict::Failed);
        assert_eq!(outcome.results[2].verdict, Verdict::Passed);
    }

    #[tokio::test]
    async fn timeout_on_one_case_does_not_abort_the_next() {
        let workspace = Workspace::create(Uuid::new_v4()).unwrap();
        // Hangs only when fed "hang"; echoes its input otherwise.
        let recipe = InvocationRecipe {
            program: "/bin/sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"read line; if [ "$line" = hang ]; then sleep 30; else echo "$line"; fi"#
                    .to_string(),
            ],
        };
        let cases = vec![make_case("hang\n", "never"), make_case("ok\n", "ok")];

        let outcome = run_cases(&recipe, &cases, &workspace, Duration::from_millis(300)).await;

        assert_eq!(outcome.results[0].verdict, Verdict::TimedOut);
        assert_eq!(outcome.results[1].verdict, Verdict::Passed);
    }
}
