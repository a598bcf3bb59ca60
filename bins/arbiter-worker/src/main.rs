mod config;
mod engine;
mod evaluator;
mod executor;
mod toolchain;
mod workspace;

use std::time::Instant;

use anyhow::Result;
use futures_util::{stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use arbiter_common::error::EngineError;
use arbiter_common::types::{ErrorResponse, Language, Submission};

use crate::config::EngineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays a clean report channel.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Arbiter worker booting...");

    let config = EngineConfig::from_env();
    info!(
        run_timeout_ms = config.run_timeout.as_millis() as u64,
        compile_timeout_ms = config.compile_timeout.as_millis() as u64,
        pool_size = config.pool_size,
        "engine configured"
    );

    probe_toolchains();

    // stdin carries one submission request per line; one report is emitted
    // on stdout per request, in input order. buffered(n) bounds how many
    // submissions run at once while still overlapping their subprocess
    // waits, so one slow submission cannot stall the others.
    let lines = BufReader::new(tokio::io::stdin()).lines();
    let line_stream = stream::unfold(lines, |mut lines| async {
        match lines.next_line().await {
            Ok(Some(line)) => Some((line, lines)),
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "failed to read stdin");
                None
            }
        }
    });

    let config_ref = &config;
    let mut responses = std::pin::pin!(line_stream
        .filter(|line| {
            let keep = !line.trim().is_empty();
            async move { keep }
        })
        .map(|line| process_line(line, config_ref))
        .buffered(config.pool_size));

    let mut stdout = tokio::io::stdout();
    while let Some(response) = responses.next().await {
        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    info!("stdin closed, worker shutdown complete");
    Ok(())
}

/// Judge one request line and render the response line. Never fails the
/// worker: malformed requests and engine errors become structured error
/// objects, and the loop moves on.
async fn process_line(line: String, config: &EngineConfig) -> String {
    let submission: Submission = match serde_json::from_str(&line) {
        Ok(submission) => submission,
        Err(e) => {
            warn!(error = %e, "skipping malformed submission line");
            return render(&ErrorResponse {
                error: format!("Malformed request: {e}"),
            });
        }
    };

    let started = Instant::now();
    match executor::run_submission(&submission, config).await {
        Ok(report) => {
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                compile_exit_code = report.compile_exit_code,
                cases = report.results.len(),
                "submission judged"
            );
            render(&report)
        }
        Err(EngineError::UnsupportedLanguage(language)) => {
            warn!(language = %language, "unsupported language");
            render(&ErrorResponse::unsupported_language())
        }
        Err(e) => {
            error!(error = %e, "submission failed before a report could be produced");
            render(&ErrorResponse {
                error: e.to_string(),
            })
        }
    }
}

fn render<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        error!(error = %e, "failed to serialize response");
        r#"{"error":"Internal serialization failure"}"#.to_string()
    })
}

/// Log which language toolchains are actually present on PATH. A missing
/// toolchain is not fatal: submissions for it come back as compile or
/// spawn failures instead.
fn probe_toolchains() {
    for language in Language::ALL {
        let adapter = toolchain::adapter_of(language);
        for binary in adapter.required_binaries() {
            match which::which(binary) {
                Ok(path) => {
                    debug!(language = %language, binary, path = %path.display(), "toolchain found")
                }
                Err(_) => warn!(language = %language, binary, "toolchain binary not found on PATH"),
            }
        }
    }
}
