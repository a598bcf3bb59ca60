// Engine tunables for the arbiter worker
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Timeouts and concurrency bounds for the execution engine.
///
/// Compilation gets its own, more generous deadline than test execution: a
/// cold `javac` or `dotnet build` is slow in ways user code is not.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock deadline for one test case run.
    pub run_timeout: Duration,
    /// Wall-clock deadline for the compile/prepare phase.
    pub compile_timeout: Duration,
    /// How many submissions the worker processes concurrently.
    pub pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_millis(DEFAULT_RUN_TIMEOUT_MS),
            compile_timeout: Duration::from_millis(DEFAULT_COMPILE_TIMEOUT_MS),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl EngineConfig {
    /// Read tunables from the environment, falling back to defaults on
    /// anything missing or unparseable.
    pub fn from_env() -> Self {
        Self {
            run_timeout: Duration::from_millis(env_u64(
                "ARBITER_RUN_TIMEOUT_MS",
                DEFAULT_RUN_TIMEOUT_MS,
            )),
            compile_timeout: Duration::from_millis(env_u64(
                "ARBITER_COMPILE_TIMEOUT_MS",
                DEFAULT_COMPILE_TIMEOUT_MS,
            )),
            pool_size: env_u64("ARBITER_POOL_SIZE", DEFAULT_POOL_SIZE as u64).max(1) as usize,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparseable value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.run_timeout, Duration::from_millis(5_000));
        assert_eq!(config.compile_timeout, Duration::from_millis(10_000));
        assert_eq!(config.pool_size, 4);
    }

    #[test]
    fn env_u64_falls_back_on_garbage() {
        std::env::set_var("ARBITER_TEST_ENV_U64", "not-a-number");
        assert_eq!(env_u64("ARBITER_TEST_ENV_U64", 7), 7);
        std::env::remove_var("ARBITER_TEST_ENV_U64");
        assert_eq!(env_u64("ARBITER_TEST_ENV_U64", 7), 7);
    }
}
